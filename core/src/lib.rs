//! Customer retention analytics core.
//!
//! Turns raw order-line exports into cohort retention tables: canonical
//! lines, orders under an adaptive validity gate, customers and cohorts, a
//! dense activity grid, right-censored cohort aggregates, a deterministic
//! bottom/mid/top cohort selection and family-level month-2 tables. Every
//! invariant is checked; a failed check aborts the run.

pub mod activity_grid;
pub mod censor;
pub mod classifier;
pub mod cohort;
pub mod config;
pub mod confound;
pub mod coverage;
pub mod eligibility;
pub mod error;
pub mod family_report;
pub mod heatmap;
pub mod ingest;
pub mod invariants;
pub mod normalize;
pub mod order_lines;
pub mod pipeline;
pub mod receipt;
pub mod rng;
pub mod selection;
pub mod store;
pub mod synthetic;
pub mod transactions;
pub mod types;
pub mod validity_gate;

pub use config::{PipelineConfig, PolicyConfig, RunOptions};
pub use error::{RetentionError, RetentionResult};
pub use pipeline::{PipelineOutput, RetentionPipeline};
