/// Media library entries are keyed by a hex digest of their origin URL.
/// See [`crate::hashing::content_id`].
pub type ContentId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
