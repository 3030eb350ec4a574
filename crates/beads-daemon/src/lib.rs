//! Per-workspace daemon and RPC protocol for the beads system.
//!
//! The daemon owns the store handle, the flush manager, and the in-memory
//! mutation journal, and mediates concurrent CLI invocations over a
//! UNIX-domain socket. The client implements the same [`Storage`] trait as
//! the direct backends, so command code is mode-agnostic.
//!
//! [`Storage`]: beads_storage::Storage

pub mod client;
pub mod journal;
pub mod lifecycle;
pub mod protocol;
pub mod server;

#[cfg(unix)]
pub use client::DaemonClient;
pub use journal::{MutationEvent, MutationJournal};
pub use lifecycle::{DaemonPaths, LifecycleError, PidGuard, pid_alive};
pub use protocol::{Request, Response};
#[cfg(unix)]
pub use server::{Daemon, ServeError};
