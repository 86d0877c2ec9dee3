//! Session adapter for an external power-system simulation engine.
//!
//! The engine is an opaque, stateful collaborator reached through the
//! [`DssEngine`] traits. [`Session`] turns its command/property protocol into
//! typed operations (compile, solve, query) and keeps the engine's
//! activate-then-query ordering explicit. Backends:
//!
//! - [`BridgeEngine`]: a real engine behind an external bridge process
//! - [`FixtureEngine`]: pre-solved circuits from YAML, for tests and offline runs

pub mod bridge;
pub mod commands;
pub mod cursors;
pub mod doctor;
pub mod fixture;
pub mod models;
pub mod request;
pub mod script;
pub mod session;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use bridge::BridgeEngine;
pub use commands::{CommandError, CommandRegistry};
pub use cursors::Cursors;
pub use fixture::{CircuitFixture, FixtureEngine};
pub use models::ModelLocator;
pub use session::Session;
pub use traits::{DssEngine, EngineError, EngineResult, EngineUnavailable};
pub use types::{BusPair, CommandResult, ErrorCode, LineTable, MagAngle, PowerPair, Status};
