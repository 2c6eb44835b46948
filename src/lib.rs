// starch Library - Public API for integration tests and external use

// Core modules (foundational)
pub mod cli;
pub mod config;
pub mod error;
pub mod models;

// Domain modules (archive layout and assembly)
pub mod engine;
pub mod tarball;

// Data modules (source enumeration)
pub mod listing;
pub mod manifest;

// Integration modules (object store)
pub mod store;

// Application modules (commands)
pub mod commands;

// Re-export commonly used types for easier access
pub use config::RunConfig;
pub use engine::context::RunContext;
pub use engine::orchestrate::run;
pub use error::{StarchError, StarchResult};
pub use models::{Entry, Group, ObjectRef, Piece, Plan, StoreLimits, MIB};
pub use store::{MemoryStore, ObjectStore, S3Store};
