// Public modules
pub mod error;
pub mod inline;
pub mod migrations;
pub mod paths;
pub mod runner;
pub mod supervisor;
pub mod upgrade;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
