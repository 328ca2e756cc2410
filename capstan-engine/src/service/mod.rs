//! Service module
//!
//! Business logic layer of the engine: credential handling, input
//! resolution, and build dispatch. Services orchestrate between repositories
//! and the executor client.

pub mod builder;
pub mod inputs;
pub mod team;

// Re-export for convenience
pub use inputs as input_service;
pub use team as team_service;
