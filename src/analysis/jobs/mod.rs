mod food_symptom_v1;
mod runner;
mod store;
mod types;

pub use runner::AnalysisJobService;
pub use store::JobStore;
pub use types::*;
