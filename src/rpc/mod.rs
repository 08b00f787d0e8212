//! External operations exposed to the transport layer.
//!
//! Each operation takes already-decoded values, serializes on the
//! project's lock, and returns a snapshot of the updated record.

pub mod align;
pub mod context;
pub mod finish;
pub mod initialise;
pub mod poll;
pub mod predict;
pub mod status;
pub mod terminate;

pub use context::ServiceContext;

use crate::{AppError, Result};

/// Reject identifiers that cannot be used as a path segment or key part.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `value` is empty, `.` or `..`, or
/// contains a path separator.
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(AppError::InvalidInput(format!(
            "{field} '{value}' is not a valid identifier"
        )));
    }
    if value.contains(['/', '\\']) {
        return Err(AppError::InvalidInput(format!(
            "{field} '{value}' must not contain a path separator"
        )));
    }
    Ok(())
}
