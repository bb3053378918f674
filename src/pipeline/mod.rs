// Pipeline execution and monitoring module
// Orchestrates the heartbeat-to-diagnosis evaluation

pub mod evaluate;
pub mod trace;

pub use evaluate::{Evaluation, EvaluationOutcome, EvaluationSource, Evaluator, PipelineError};
pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceWriter};
