/// Checkpoint identifiers are opaque strings (UUID v7 text by default).
pub type CheckpointId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
