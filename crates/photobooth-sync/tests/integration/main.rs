//! Integration tests for photobooth-sync
//!
//! Drive the durable queue, the sync worker and the reconciliation steps
//! against an in-memory remote store that records every call and can be
//! scripted to fail.

mod common;

mod test_reconcile;
mod test_worker;
