pub mod engine;
pub mod payload;

pub use engine::{ReconciliationEngine, ReportOutcome};
pub use payload::TelemetryReport;
