//! Dynamic SQL values.
//!
//! [`Value`] is what travels between entities, filters and the database:
//! bound parameters, pending column writes and hydrated cells all use it.
//! The variants follow the in-memory types a [`DataType`](crate::DataType)
//! translation can produce.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    /// Exact numeric kept in its textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Microseconds since the Unix epoch
    DateTime(i64),
}

/// Shift an unsigned 64-bit value into the signed range, keeping its order,
/// so it fits a signed BIGINT column.
pub const fn map_u64_to_i64(value: u64) -> i64 {
    (value as i64).wrapping_add(i64::MIN)
}

/// Inverse of [`map_u64_to_i64`].
pub const fn map_i64_to_u64(value: i64) -> u64 {
    value.wrapping_sub(i64::MIN) as u64
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for NULL and for empty text.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Numbers are true when positive; text is true for the usual
    /// affirmative spellings ("true", "yes", "y", "1", "on").
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "y" | "1" | "on"
            )),
            Value::Int(_) | Value::BigInt(_) => self.as_i64().map(|n| n > 0),
            _ => None,
        }
    }

    /// Integral view. Text and decimals parse; doubles do not truncate.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(n) => Some(i64::from(*n)),
            Value::BigInt(n) | Value::DateTime(n) => Some(*n),
            Value::Text(s) | Value::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Unsigned view without any range mapping; negatives yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Text(s) | Value::Decimal(s) => s.trim().parse().ok(),
            other => other.as_i64().and_then(|n| u64::try_from(n).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(n) => Some(f64::from(*n)),
            Value::BigInt(n) => Some(*n as f64),
            Value::Text(s) | Value::Decimal(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes.as_slice())
        } else {
            None
        }
    }

    /// `u64` into a BIGINT, saturating at `i64::MAX` with a warning.
    ///
    /// ```
    /// use sqldao_core::Value;
    ///
    /// assert_eq!(Value::from_u64_clamped(42), Value::BigInt(42));
    /// assert_eq!(Value::from_u64_clamped(u64::MAX), Value::BigInt(i64::MAX));
    /// ```
    #[must_use]
    pub fn from_u64_clamped(v: u64) -> Self {
        Value::BigInt(i64::try_from(v).unwrap_or_else(|_| {
            tracing::warn!(value = v, "unsigned value out of BIGINT range, saturating");
            i64::MAX
        }))
    }

    /// `u64` into a BIGINT through [`map_u64_to_i64`].
    ///
    /// ```
    /// use sqldao_core::Value;
    ///
    /// assert_eq!(Value::from_u64_mapped(0), Value::BigInt(i64::MIN));
    /// ```
    #[must_use]
    pub fn from_u64_mapped(v: u64) -> Self {
        Value::BigInt(map_u64_to_i64(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::BigInt(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Decimal(s) | Value::Text(s) => f.write_str(s),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::DateTime(micros) => write!(f, "@{micros}us"),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant($conv(v))
                }
            }
        )*
    };
}

value_from! {
    bool => Bool via std::convert::identity,
    i8 => Int via i32::from,
    i16 => Int via i32::from,
    i32 => Int via std::convert::identity,
    i64 => BigInt via std::convert::identity,
    u8 => Int via i32::from,
    u16 => Int via i32::from,
    u32 => BigInt via i64::from,
    f32 => Double via f64::from,
    f64 => Double via std::convert::identity,
    String => Text via std::convert::identity,
    Vec<u8> => Bytes via std::convert::identity,
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::from_u64_clamped(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_mapping_preserves_order() {
        assert_eq!(map_u64_to_i64(0), i64::MIN);
        assert_eq!(map_u64_to_i64(u64::MAX), i64::MAX);
        assert!(map_u64_to_i64(10) < map_u64_to_i64(11));
        for v in [0_u64, 1, 42, 1 << 40, u64::MAX - 1, u64::MAX] {
            assert_eq!(map_i64_to_u64(map_u64_to_i64(v)), v);
        }
    }

    #[test]
    fn test_as_bool_affirmatives() {
        assert_eq!(Value::Text("Yes".into()).as_bool(), Some(true));
        assert_eq!(Value::Text("no".into()).as_bool(), Some(false));
        assert_eq!(Value::BigInt(0).as_bool(), Some(false));
        assert_eq!(Value::Int(3).as_bool(), Some(true));
        assert_eq!(Value::Bytes(vec![1]).as_bool(), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_small_integers_widen() {
        assert_eq!(Value::from(7_u8), Value::Int(7));
        assert_eq!(Value::from(-3_i16), Value::Int(-3));
        assert_eq!(Value::from(1.5_f32), Value::Double(1.5));
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(Value::Text(" 17 ".into()).as_i64(), Some(17));
        assert_eq!(Value::Decimal("2.5".into()).as_f64(), Some(2.5));
        assert_eq!(Value::BigInt(-1).as_u64(), None);
        assert_eq!(Value::Int(9).as_u64(), Some(9));
        assert_eq!(Value::DateTime(5).as_i64(), Some(5));
    }

    #[test]
    fn test_null_or_empty() {
        assert!(Value::Null.is_null_or_empty());
        assert!(Value::Text(String::new()).is_null_or_empty());
        assert!(!Value::Int(0).is_null_or_empty());
    }
}
