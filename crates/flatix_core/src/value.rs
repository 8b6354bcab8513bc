//! Typed key values.
//!
//! Key columns hold fixed-width values of one of four element types.
//! Textual comparisons may fold ASCII case; byte and text probes shorter
//! than the element width compare as if zero-padded, which is what makes
//! prefix-truncated keys work.

use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;

/// Element type of a key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float, ordered by total order.
    Float64,
    /// Fixed-width binary, compared byte-wise.
    Bytes {
        /// Element width in bytes.
        width: usize,
    },
    /// Fixed-width text, optionally case-insensitive.
    Text {
        /// Element width in bytes.
        width: usize,
        /// Fold ASCII case during comparison.
        case_insensitive: bool,
    },
}

impl KeyType {
    /// Returns the fixed element width in bytes.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            KeyType::Int64 | KeyType::Float64 => 8,
            KeyType::Bytes { width } | KeyType::Text { width, .. } => *width,
        }
    }

    /// Returns true if comparisons fold ASCII case.
    #[must_use]
    pub fn case_insensitive(&self) -> bool {
        matches!(
            self,
            KeyType::Text {
                case_insensitive: true,
                ..
            }
        )
    }

    pub(crate) fn type_code(&self) -> u32 {
        match self {
            KeyType::Int64 => 0,
            KeyType::Float64 => 1,
            KeyType::Bytes { .. } => 2,
            KeyType::Text { .. } => 3,
        }
    }

    pub(crate) fn from_parts(code: u32, width: usize, case_insensitive: bool) -> CoreResult<Self> {
        match code {
            0 => Ok(KeyType::Int64),
            1 => Ok(KeyType::Float64),
            2 => Ok(KeyType::Bytes { width }),
            3 => Ok(KeyType::Text {
                width,
                case_insensitive,
            }),
            _ => Err(CoreError::corrupt(format!("unknown key type code {code}"))),
        }
    }
}

/// One typed key value: a build-time extraction target and a query-time
/// search probe.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Binary or text payload; compared at the column's element width.
    Bytes(Vec<u8>),
}

impl KeyValue {
    /// Creates an integer value.
    #[must_use]
    pub fn int(v: i64) -> Self {
        KeyValue::Int64(v)
    }

    /// Creates a float value.
    #[must_use]
    pub fn float(v: f64) -> Self {
        KeyValue::Float64(v)
    }

    /// Creates a binary value.
    #[must_use]
    pub fn bytes(v: impl Into<Vec<u8>>) -> Self {
        KeyValue::Bytes(v.into())
    }

    /// Creates a text value.
    #[must_use]
    pub fn text(v: &str) -> Self {
        KeyValue::Bytes(v.as_bytes().to_vec())
    }

    /// Returns true if this value can be stored in a column of `ty`.
    #[must_use]
    pub fn matches_type(&self, ty: &KeyType) -> bool {
        matches!(
            (self, ty),
            (KeyValue::Int64(_), KeyType::Int64)
                | (KeyValue::Float64(_), KeyType::Float64)
                | (KeyValue::Bytes(_), KeyType::Bytes { .. })
                | (KeyValue::Bytes(_), KeyType::Text { .. })
        )
    }

    /// Returns the zero value of the given type, used as an extraction
    /// buffer during builds.
    #[must_use]
    pub fn default_for(ty: &KeyType) -> Self {
        match ty {
            KeyType::Int64 => KeyValue::Int64(0),
            KeyType::Float64 => KeyValue::Float64(0.0),
            KeyType::Bytes { .. } | KeyType::Text { .. } => KeyValue::Bytes(Vec::new()),
        }
    }
}

/// Compares a stored fixed-width slot against a probe, treating the probe
/// as zero-padded or truncated to `width`.
pub(crate) fn compare_padded(
    stored: &[u8],
    probe: &[u8],
    width: usize,
    case_insensitive: bool,
) -> Ordering {
    for i in 0..width {
        let a = stored[i];
        let b = probe.get(i).copied().unwrap_or(0);
        let (a, b) = if case_insensitive {
            (a.to_ascii_lowercase(), b.to_ascii_lowercase())
        } else {
            (a, b)
        };
        match a.cmp(&b) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}
