//! Consumer-facing services.

mod snapshots;

pub use snapshots::{LiveSnapshotFeed, SnapshotUpdate};
