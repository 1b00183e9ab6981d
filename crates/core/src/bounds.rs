//! Balance bounds stored as account labels.
//!
//! Bounds are not a fixed schema field: an account's minimum and maximum live
//! in its labels under a pair of configurable keys. A missing key leaves that
//! side unbounded. Oracle accounts are exempt regardless of their labels.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::labels::{Labels, VALUE_MAX, VALUE_MIN};

/// The pair of label keys holding an account's inclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundLabels {
    pub min_key: String,
    pub max_key: String,
}

impl Default for BoundLabels {
    fn default() -> Self {
        Self {
            min_key: VALUE_MIN.to_string(),
            max_key: VALUE_MAX.to_string(),
        }
    }
}

impl BoundLabels {
    pub fn new(min_key: impl Into<String>, max_key: impl Into<String>) -> Self {
        Self {
            min_key: min_key.into(),
            max_key: max_key.into(),
        }
    }

    /// Read the bounds of an account from its labels.
    ///
    /// Oracle accounts always yield [`Bounds::UNBOUNDED`].
    pub fn bounds_of(&self, labels: &Labels) -> DomainResult<Bounds> {
        if labels.oracle_name().is_some() {
            return Ok(Bounds::UNBOUNDED);
        }

        Ok(Bounds {
            min: parse_bound(labels, &self.min_key)?,
            max: parse_bound(labels, &self.max_key)?,
        })
    }

    /// Write `bounds` into `labels` for each side the labels do not set yet.
    pub fn fill_defaults(&self, labels: &mut Labels, bounds: Bounds) {
        if let Some(min) = bounds.min {
            if !labels.contains_key(&self.min_key) {
                labels.insert(self.min_key.clone(), min.to_string());
            }
        }
        if let Some(max) = bounds.max {
            if !labels.contains_key(&self.max_key) {
                labels.insert(self.max_key.clone(), max.to_string());
            }
        }
    }
}

fn parse_bound(labels: &Labels, key: &str) -> DomainResult<Option<i64>> {
    labels
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|e| DomainError::malformed_label(key, format!("{raw:?}: {e}")))
        })
        .transpose()
}

/// Inclusive balance bounds. `None` means unbounded on that side.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Outcome of checking a balance against [`Bounds`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoundCheck {
    Within,
    BelowMin,
    AboveMax,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds {
        min: None,
        max: None,
    };

    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn check(&self, balance: i64) -> BoundCheck {
        if self.min.is_some_and(|min| balance < min) {
            BoundCheck::BelowMin
        } else if self.max.is_some_and(|max| balance > max) {
            BoundCheck::AboveMax
        } else {
            BoundCheck::Within
        }
    }
}
