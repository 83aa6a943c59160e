//! adaptest-core — Ability estimation and adaptive question selection.
//!
//! This crate holds the computerized adaptive testing algorithms (scale
//! conversion, ability estimation, difficulty stepping, attempt replay,
//! stopping rules and question selection), the data model they operate on,
//! and the engine that drives an attempt through the collaborator traits.

pub mod engine;
pub mod error;
pub mod estimator;
pub mod model;
pub mod parser;
pub mod replay;
pub mod report;
pub mod scale;
pub mod selector;
pub mod stepper;
pub mod stopping;
pub mod traits;

pub use error::{AttemptError, ConfigError, DomainError, InsufficientEvidence};
pub use estimator::{estimate_measure, estimate_standard_error, AbilityEstimate, AttemptTotals};
pub use replay::current_difficulty_level;
pub use scale::{linear_to_logit, logit_to_linear, logit_to_percent, percent_to_logit};
pub use selector::{AvailabilityMap, QuestionSelector, Selection};
pub use stepper::compute_next_difficulty;
pub use stopping::{StopDecision, StoppingPolicy};
