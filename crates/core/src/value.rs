//! Field values.
//!
//! Equality, ordering and hashing agree with each other, which hash and
//! ordered indexes rely on:
//!
//! - values of different types are never equal; they order by type rank;
//! - `Null` sorts first;
//! - all `NaN`s are equal and sort after every other float, and `-0.0 == 0.0`.

use crate::types::DataType;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A single field of an entity.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Bytes(Vec<u8>),
}

impl Value {
    /// Type of the value; `None` for `Null`, which fits any nullable column.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::DateTime(_) => DataType::DateTime,
            Value::Bytes(_) => DataType::Bytes,
        })
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Either integer type, widened to `i64`.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Int32(v) => Some(i64::from(v)),
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int32(_) => 2,
            Value::Int64(_) => 3,
            Value::Float64(_) => 4,
            Value::String(_) => 5,
            Value::DateTime(_) => 6,
            Value::Bytes(_) => 7,
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Int32(a), Int32(b)) => a.cmp(b),
            (Int64(a), Int64(b)) | (DateTime(a), DateTime(b)) => a.cmp(b),
            (Float64(a), Float64(b)) => cmp_f64(*a, *b),
            (String(a), String(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) | Value::DateTime(v) => v.hash(state),
            Value::Float64(v) => {
                let bits = if v.is_nan() {
                    f64::NAN.to_bits()
                } else if *v == 0.0 {
                    0
                } else {
                    v.to_bits()
                };
                bits.hash(state);
            }
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::DateTime(v) => write!(f, "@{v}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Boolean,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
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
    use alloc::string::ToString;

    #[test]
    fn test_null_has_no_type() {
        assert_eq!(Value::Null.data_type(), None);
        assert_eq!(Value::Int64(1).data_type(), Some(DataType::Int64));
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn test_integer_widening() {
        assert_eq!(Value::Int32(-4).as_integer(), Some(-4));
        assert_eq!(Value::Int64(9).as_integer(), Some(9));
        assert_eq!(Value::Int32(9).as_i64(), None);
        assert_eq!(Value::from("9").as_integer(), None);
    }

    #[test]
    fn test_cross_type_values_are_distinct() {
        assert_ne!(Value::Int32(1), Value::Int64(1));
        assert!(Value::Int32(100) < Value::Int64(1));
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Int64(5) < Value::DateTime(0));
    }

    #[test]
    fn test_float_edge_cases() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert!(Value::Float64(f64::INFINITY) < Value::Float64(f64::NAN));
        assert_eq!(Value::Float64(-0.0), Value::Float64(0.0));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        use core::hash::BuildHasher;
        let state = hashbrown::hash_map::DefaultHashBuilder::default();
        assert_eq!(
            state.hash_one(Value::Float64(-0.0)),
            state.hash_one(Value::Float64(0.0))
        );
        assert_eq!(
            state.hash_one(Value::Float64(f64::NAN)),
            state.hash_one(Value::Float64(-f64::NAN))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int64(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(Value::Bytes(alloc::vec![1, 2]).to_string(), "<2 bytes>");
    }
}
