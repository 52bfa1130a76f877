//! Generation pipeline: retry, novelty check, and the stores behind it.
//!
//! [`Orchestrator::generate_safe`] sequences the model call, the output
//! validator, and the similarity check against [`History`]. [`SeenCache`]
//! keeps a scheduled job from answering the same external item twice.

pub mod history;
pub mod orchestrator;
pub mod seen;
pub mod similarity;

pub use history::{History, HistoryEntry};
pub use orchestrator::{AttemptFailure, GenerationOutcome, Orchestrator, build_request};
pub use seen::{SeenCache, SeenMap};
pub use similarity::{jaccard, max_similarity};
