//! retention-runner: headless batch runner for the retention pipeline.
//!
//! Usage:
//!   retention-runner --input raw_lines.json --out ./artifacts
//!   retention-runner --demo-seed 42 --demo-customers 260 --out ./artifacts
//!   retention-runner --demo-seed 42 --emit-raw demo_raw.json
//!
//! Flags:
//!   --data-dir <dir>               policy.json + product_family_rules.json (default ./data)
//!   --input <file>                 JSON array of raw export lines
//!   --demo-seed <u64>              generate synthetic input instead of reading --input
//!   --demo-customers <n>           customers per cohort month for the demo (default 260)
//!   --emit-raw <file>              write the demo input and exit
//!   --out <dir>                    artifact directory (default ./artifacts)
//!   --force-strict-validity        apply the strict validity rule unconditionally
//!   --max-observed-month <YYYY-MM> override the observation watermark

use anyhow::{anyhow, Context, Result};
use retention_core::{
    config::{PipelineConfig, RunOptions},
    error::RetentionError,
    pipeline::{PipelineOutput, RetentionPipeline},
    store::{read_raw_lines, write_raw_lines, ArtifactStore},
    synthetic::{generate_raw_lines, SyntheticConfig},
    types::YearMonth,
};
use std::env;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        let category = e
            .downcast_ref::<RetentionError>()
            .map(RetentionError::category)
            .unwrap_or("RunnerError");
        eprintln!("run aborted [{category}]: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let out_dir = flag_value(&args, "--out").unwrap_or("./artifacts");
    let input = flag_value(&args, "--input");
    let demo_seed = flag_value(&args, "--demo-seed")
        .map(|s| s.parse::<u64>().map_err(|e| anyhow!("--demo-seed '{s}': {e}")))
        .transpose()?;
    let demo_customers = parse_arg(&args, "--demo-customers", 260usize);
    let emit_raw = flag_value(&args, "--emit-raw");
    let max_observed_month = flag_value(&args, "--max-observed-month")
        .map(|s| s.parse::<YearMonth>().map_err(|e| anyhow!("--max-observed-month: {e}")))
        .transpose()?;
    let options = RunOptions {
        force_strict_validity: args.iter().any(|a| a == "--force-strict-validity"),
        max_observed_month,
    };

    let raw = match (demo_seed, input) {
        (Some(seed), _) => {
            let config = SyntheticConfig {
                customers_per_cohort: demo_customers,
                ..SyntheticConfig::with_seed(seed)
            };
            generate_raw_lines(&config)
        }
        (None, Some(path)) => read_raw_lines(path)?,
        (None, None) => return Err(anyhow!("one of --input or --demo-seed is required")),
    };

    if let Some(path) = emit_raw {
        write_raw_lines(path, &raw)?;
        println!("wrote {} raw lines to {path}", raw.len());
        return Ok(());
    }

    println!("Retention pipeline: retention-runner");
    println!("  data_dir:  {data_dir}");
    println!("  input:     {}", input.unwrap_or("(synthetic)"));
    println!("  raw lines: {}", raw.len());
    println!("  out:       {out_dir}");
    println!();

    let config = PipelineConfig::load(data_dir).with_context(|| format!("loading config from {data_dir}"))?;
    let pipeline = RetentionPipeline::new(&config)?;
    let output = pipeline.run(&raw, &options)?;

    let store = ArtifactStore::open(out_dir)?;
    let written = store.write_output(&output)?;
    log::info!("runner: wrote {} artifacts to {out_dir}", written.len());

    print_summary(&output);
    println!();
    println!("  artifacts: {} files in {}", written.len(), store.dir().display());
    Ok(())
}

fn print_summary(output: &PipelineOutput) {
    let r = &output.receipt;
    println!("=== RUN SUMMARY ===");
    println!("  raw rows:           {}", r.raw_row_count);
    println!("  order lines:        {} ({:?})", r.processed_order_lines_rows, r.reconcile_status);
    println!("  orders:             {}", r.processed_orders_rows);
    println!("  customers:          {}", r.processed_customers_rows);
    println!("  max observed month: {}", r.max_observed_month);

    println!();
    println!("=== GATES ===");
    println!(
        "  Gate A: metric={:.4}% threshold={}% strict_applied={}",
        r.gate_a.pct_valid_nonpositive_net, r.gate_a.trigger_threshold_pct, r.gate_a.strict_applied
    );
    println!(
        "  Gate B: gross_non_other={:.2}% customer_non_other={:.2}% customer_nonmerch={:.2}%",
        r.gate_b.gross_non_other_pct, r.gate_b.customer_non_other_pct, r.gate_b.customer_nonmerch_pct
    );
    println!("  Gate C: rows={} material={}", r.gate_c.rows, r.gate_c.material_count);

    println!();
    println!("=== SELECTION ===");
    println!(
        "  eligible={} plot_pool={} fallback={}",
        r.eligible_count, r.plot_pool_count, r.used_fallback
    );
    for c in output.selection.candidates.iter().filter(|c| c.selected_for_plot) {
        println!(
            "  {:<8} {:?}  n0={:<5} m2_logo={:.3}",
            c.cohort_month.label(),
            c.selection_reason,
            c.n0,
            c.m2_logo_retention
        );
    }

    println!();
    println!("=== FAMILY PRIORITY (month 2) ===");
    for p in &output.family_scatter {
        let net = p
            .y_m2_net_retention_proxy
            .map(|y| format!("{y:.3}"))
            .unwrap_or_else(|| "n/a".into());
        println!(
            "  #{:<2} {:<22} n={:<5} logo={:.3} net={} score={:.3}",
            p.rank_priority, p.first_product_family, p.n_customers, p.x_m2_logo_retention, net, p.priority_score
        );
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag).and_then(|v| v.parse().ok()).unwrap_or(default)
}
