//! Photobooth Core - Domain types and port definitions for the backup engine
//!
//! This crate contains the pieces shared by the sync engine, the daemon and the CLI:
//! - **Domain types** - `Operation`, `OperationKind`, `RelativePath`, `RemotePath`
//! - **Port definitions** - `IRemoteStore`, the capability surface of the remote backup target
//! - **Configuration** - YAML configuration with defaults, validation and a builder
//!
//! # Architecture
//!
//! The domain module is pure and performs no I/O. Ports define the trait
//! interfaces that adapter code (see `photobooth-sync`) implements.

pub mod config;
pub mod domain;
pub mod ports;
