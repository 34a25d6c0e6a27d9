pub mod fingerprint;
pub mod orchestrator;
pub mod queries;

pub use orchestrator::{AnalysisOrchestrator, OrchestratorConfig};
pub use queries::{
    analysis_gaps, benchmark, company_history, compare, export_analyses, render_csv,
    trend_from_latest, CSV_COLUMNS,
};
