//! docvault - logical backup and restore for document-oriented databases
//!
//! `dump` streams collections (and optionally the replication log) from a
//! server into a directory tree or a multiplexed archive; `restore` plans
//! that output back into per-namespace intents and rebuilds collections,
//! indexes, users and roles, then replays the oplog for a point-in-time
//! consistent snapshot.

pub mod archive;
pub mod bsonio;
pub mod catalog;
pub mod cli;
pub mod dump;
pub mod intents;
pub mod metadata;
pub mod observability;
pub mod oplog;
pub mod restore;
pub mod server;
