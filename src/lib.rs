//! Post Guard: safety pipeline around a text-generating bot.
//!
//! Inbound text is screened by [`safety`], replies are metered by
//! [`budget`], and every generation is checked by [`output`] and sequenced by
//! [`pipeline`] before anything is published.

pub mod budget;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod safety;
pub mod stats;
pub mod store;
pub mod text;

pub use config::GuardConfig;
pub use error::Error;
pub use stats::{Stats, StatsSnapshot};
