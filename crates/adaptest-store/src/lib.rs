//! adaptest-store — Collaborator implementations for adaptest.
//!
//! In-memory versions of the `AttemptStore`, `QuestionPool` and
//! `SessionCache` traits, a TOML question-pool loader and the tool
//! configuration, so the engine can run without an external database.

pub mod config;
pub mod error;
pub mod memory;
pub mod pool;

pub use config::{load_config, load_config_from, AdaptestConfig};
pub use error::StoreError;
pub use memory::{InMemoryAttemptStore, InMemoryQuestionPool, InMemorySessionCache};
pub use pool::{load_pool, PoolQuestion};
