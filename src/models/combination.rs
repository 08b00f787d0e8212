//! Combination key codec.
//!
//! A combination key names one (experiment, run) pair inside a project
//! record. It indexes both `in_progress` and `results`, so the mapping
//! must stay bijective: identifiers containing [`SEPARATOR`] are rejected
//! when the key is built.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::{AppError, Result};

/// Character joining the experiment and run identifiers.
pub const SEPARATOR: char = '/';

/// Opaque identifier for one (experiment, run) pair within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CombinationKey(String);

impl CombinationKey {
    /// Compose a key from an experiment and run identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if either identifier is empty or
    /// contains [`SEPARATOR`].
    pub fn encode(expt_id: &str, run_id: &str) -> Result<Self> {
        for (field, value) in [("expt_id", expt_id), ("run_id", run_id)] {
            if value.is_empty() {
                return Err(AppError::InvalidInput(format!("{field} must not be empty")));
            }
            if value.contains(SEPARATOR) {
                return Err(AppError::InvalidInput(format!(
                    "{field} '{value}' must not contain '{SEPARATOR}'"
                )));
            }
        }
        Ok(Self(format!("{expt_id}{SEPARATOR}{run_id}")))
    }

    /// Parse a raw key previously produced by [`CombinationKey::encode`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` unless the key contains exactly one
    /// separator.
    pub fn parse(raw: &str) -> Result<Self> {
        decode(raw)?;
        Ok(Self(raw.to_owned()))
    }

    /// Split the key back into `(expt_id, run_id)`.
    #[must_use]
    pub fn decode(&self) -> (&str, &str) {
        self.0.split_once(SEPARATOR).unwrap_or((self.0.as_str(), ""))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CombinationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CombinationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compose an (experiment, run) pair into a combination key string.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if either identifier is empty or
/// contains [`SEPARATOR`].
pub fn encode(expt_id: &str, run_id: &str) -> Result<String> {
    CombinationKey::encode(expt_id, run_id).map(|key| key.0)
}

/// Decompose a combination key string into `(expt_id, run_id)`.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if the key does not contain exactly one
/// separator.
pub fn decode(key: &str) -> Result<(String, String)> {
    let (expt_id, run_id) = key.split_once(SEPARATOR).ok_or_else(|| {
        AppError::InvalidInput(format!("combination key '{key}' has no separator"))
    })?;
    if run_id.contains(SEPARATOR) {
        return Err(AppError::InvalidInput(format!(
            "combination key '{key}' has more than one separator"
        )));
    }
    Ok((expt_id.to_owned(), run_id.to_owned()))
}
