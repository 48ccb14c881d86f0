//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the backup engine depends on, whose
//! implementations live in adapter code.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Remote backup target (existence checks, mkdir, transfers, listing)

pub mod remote_store;

pub use remote_store::{IRemoteStore, RemoteEntry};
