//! # Server Registry
//!
//! The authoritative set of servers managed by this node.
//!
//! The map is owned by a single [`ManagerActor`] task and only changes through
//! messages, so lookups and removals never race each other. The rest of the
//! daemon holds a cloneable [`ManagerClient`].
//!
//! ```ignore
//! let (actor, client) = ManagerActor::new(32);
//! tokio::spawn(actor.run());
//!
//! client.add(server.clone()).await?;
//! let found = client.get(server.id()).await?;
//! client.remove(Box::new(move |s| s.id() == id)).await?;
//! ```

pub mod actor;
pub mod client;
pub mod error;
pub mod message;

pub use actor::ManagerActor;
pub use client::ManagerClient;
pub use error::RegistryError;
pub use message::{ManagerRequest, ServerFilter};
