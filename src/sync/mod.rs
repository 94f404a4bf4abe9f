//! Cache/Remote Synchronization
//!
//! Offline-first persistence: the durable local cache is the source of
//! truth, the remote document store is replicated to on a best-effort
//! basis. See `repository` for the outcome and conflict rules.

pub mod remote;
pub mod repository;

pub use remote::{HttpRemoteStore, RemoteStore, SharedRemote};
pub use repository::{SyncOutcome, SyncRepository};
