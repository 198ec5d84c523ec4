//! Artifact persistence: flat JSON files in one output directory.
//!
//! RULE: Only store.rs touches the filesystem for run input and output.
//! Pipeline stages return tables; they never read or write files.

use crate::{
    error::{RetentionError, RetentionResult},
    ingest::RawOrderLine,
    pipeline::PipelineOutput,
    receipt::ScopeReceipt,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Receipt file name inside the output directory.
pub const RECEIPT_FILE: &str = "scope_receipt.json";

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (or create) the output directory.
    pub fn open(dir: impl AsRef<Path>) -> RetentionResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Write one table as pretty JSON. Same rows, same bytes.
    pub fn write_table<T: Serialize>(&self, name: &str, rows: &T) -> RetentionResult<PathBuf> {
        let path = self.path_for(name);
        let mut body = serde_json::to_string_pretty(rows)?;
        body.push('\n');
        std::fs::write(&path, body)?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    pub fn write_receipt(&self, receipt: &ScopeReceipt) -> RetentionResult<PathBuf> {
        let path = self.dir.join(RECEIPT_FILE);
        let mut body = serde_json::to_string_pretty(receipt)?;
        body.push('\n');
        std::fs::write(&path, body)?;
        Ok(path)
    }

    pub fn read_receipt(&self) -> RetentionResult<ScopeReceipt> {
        let path = self.dir.join(RECEIPT_FILE);
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write every table of a completed run, then the receipt last.
    pub fn write_output(&self, output: &PipelineOutput) -> RetentionResult<Vec<PathBuf>> {
        let mut written = vec![
            self.write_table("ingest_stats", &output.ingest)?,
            self.write_table("order_lines", &output.order_lines)?,
            self.write_table("products", &output.products)?,
            self.write_table("orders", &output.orders)?,
            self.write_table("gate_a", &output.gate_a)?,
            self.write_table("transactions", &output.transactions)?,
            self.write_table("customers", &output.customers)?,
            self.write_table("customer_month_activity", &output.activity.cells)?,
            self.write_table("cohort_aggregates", &output.cohort_aggregates)?,
            self.write_table("selection_candidates", &output.selection.candidates)?,
            self.write_table("logo_heatmap", &output.logo_heatmap)?,
            self.write_table("net_heatmap", &output.net_heatmap)?,
            self.write_table("coverage", &output.coverage)?,
            self.write_table("confound_m2_family_all_vs_retail", &output.confound)?,
            self.write_table("family_m2", &output.family_m2)?,
            self.write_table("family_scatter", &output.family_scatter)?,
            self.write_table("appendix_top_skus", &output.top_skus)?,
        ];
        written.push(self.write_receipt(&output.receipt)?);
        log::info!("artifacts: {} files in {}", written.len(), self.dir.display());
        Ok(written)
    }
}

/// Read raw export lines from a JSON array of records.
pub fn read_raw_lines(path: impl AsRef<Path>) -> RetentionResult<Vec<RawOrderLine>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        RetentionError::InputContract(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RetentionError::InputContract(format!("unsupported schema in {}: {e}", path.display()))
    })
}

/// Write raw lines in the format `read_raw_lines` accepts.
pub fn write_raw_lines(path: impl AsRef<Path>, lines: &[RawOrderLine]) -> RetentionResult<()> {
    let body = serde_json::to_string(lines)?;
    std::fs::write(path, body)?;
    Ok(())
}
