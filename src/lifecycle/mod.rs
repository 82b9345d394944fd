//! Node wiring and logging setup.
//!
//! - [`NodeSystem`] starts the registry actor and wires shared services
//! - [`setup_tracing`] installs the log subscriber

pub mod node_system;
pub mod tracing;

pub use self::node_system::*;
pub use self::tracing::*;
