//! Application layer: one analysis run end to end

pub mod analyze;

pub use analyze::{run_program, AnalysisResult, ProgramAnalyzer};
