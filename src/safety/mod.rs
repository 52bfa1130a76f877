//! Inbound safety layer.
//!
//! Untrusted text is risk-scored and cleaned by [`InputSanitizer`], then
//! embedded only inside the boundary markers from [`boundary`]. The
//! [`InboundGate`] adds the interaction budget on top.

pub mod boundary;
pub mod gate;
pub mod rules;
pub mod sanitizer;

pub use boundary::{DEFENSIVE_PROMPT, harden_system_prompt, wrap_untrusted};
pub use gate::{GateDecision, InboundGate, InboundText};
pub use rules::{PatternClass, Rule, RuleSet};
pub use sanitizer::{InputDecision, InputSanitizer, RiskAssessment};
