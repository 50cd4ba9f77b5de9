//! Lognit client core.
//!
//! Backend-agnostic pieces of the client: the message and session model,
//! the error taxonomy, the listener/printer seams and the cluster buffer
//! that merges historic results from every node before streaming live ones.

pub mod buffer;
pub mod config;
pub mod error;
pub mod listener;
pub mod model;
pub mod permits;
pub mod printer;
pub mod telemetry;

pub use buffer::{BufferMode, ClusterBuffer};
pub use config::{ClientConfig, ConfigLoader};
pub use error::ServerError;
pub use listener::RestListener;
pub use model::{Cookie, Message, MessageBatch, SessionState};
pub use printer::{ConsolePrinter, MessagePrinter};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
