//! # Node Agent
//!
//! A node-local agent that runs many independent server processes on behalf
//! of a remote control plane, and starts, stops, restarts, kills and deletes
//! them on request.
//!
//! ## Architecture Notes
//!
//! ### 1. One lock per server
//! Every server owns a [`PowerLock`](power::PowerLock). Start, stop and
//! restart hold it for their whole duration; kill does not wait for it, so a
//! stuck server can always be killed. Servers never contend with each other.
//!
//! ### 2. Pre-boot before every boot
//! Start and restart run the pre-boot pipeline ([`power::preboot`]) before
//! the environment is touched: sync with the control plane, re-check
//! suspension, push settings, check disk space, regenerate configuration
//! files and fix file ownership.
//!
//! ### 3. Ordered teardown
//! Deletion ([`teardown`]) cancels background work, the event bus, sessions
//! and downloads, destroys the environment, then deregisters the server while
//! its files are still being removed.
//!
//! ### 4. Collaborators behind traits
//! The runtime ([`environment::Environment`]), control plane
//! ([`remote::RemoteClient`]), storage ([`filesystem::Filesystem`]) and
//! installer ([`install::Installer`]) are traits. The crate ships a local
//! implementation of each for the binary, and scripted ones in [`mock`].
//!
//! ### 5. Observability
//! `tracing` everywhere with the server id as a structured field. See
//! [`lifecycle::tracing`].
//!
//! ## Module Tour
//!
//! - [`server`]: the [`Server`](server::Server) handle, its definition, events and sessions
//! - [`power`]: power actions, the power lock and the pre-boot pipeline
//! - [`teardown`]: the deletion cascade
//! - [`registry`]: the actor owning the set of managed servers
//! - [`api`]: request validation and background dispatch
//! - [`lifecycle`]: node wiring and logging setup
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod api;
pub mod config;
pub mod configfiles;
pub mod environment;
pub mod filesystem;
pub mod install;
pub mod lifecycle;
pub mod mock;
pub mod power;
pub mod registry;
pub mod remote;
pub mod server;
pub mod teardown;
pub mod tokens;
pub mod transfers;
