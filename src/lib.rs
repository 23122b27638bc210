//! Job matching and application tracking: a SQLite job store, a
//! deterministic compatibility scorer, the application status state
//! machine and resume tailoring.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod profile;
pub mod scorer;
pub mod sources;
pub mod tailor;
pub mod tracker;
pub mod vocabulary;

pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use scorer::CompatibilityScorer;
