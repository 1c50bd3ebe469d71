pub mod booking;
pub mod job;
pub mod slot;
pub mod user;

/// Decode failure for the textual status/role columns.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ParseEnumError(pub String);
