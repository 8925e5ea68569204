//! Automated evaluation for saved prompt versions.
//!
//! [`accuracy::blend_accuracy`] folds a fresh judge score and thumbs
//! feedback into the running 0-100 accuracy of a version/model pair.
//! [`judge::JudgeEvaluator`] obtains that judge score from an LLM.

pub mod accuracy;
pub mod judge;

pub use accuracy::blend_accuracy;
pub use judge::{JudgeEvaluation, JudgeEvaluator, JudgeScores};
