//! Typed scalar values.
//!
//! A [`Datum`] is what constants in expressions and histogram bucket boundaries are made of.
//! Datums of the same type family can be ordered; most families also have a mapping into `f64`
//! which histogram interpolation relies on.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use strum_macros::{Display as StrumDisplay, EnumString};

use crate::error::{OptError, OptResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, EnumString)]
pub enum DataType {
    Bool,
    Int,
    Double,
    Text,
    Date,
    Timestamp,
    /// A type the statistics engine knows nothing about.
    Opaque,
}

/// Types whose values can be compared with each other for statistics purposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TypeFamily {
    Bool,
    Numeric,
    Text,
    Date,
    Timestamp,
    Opaque,
}

impl DataType {
    fn family(&self) -> TypeFamily {
        match self {
            DataType::Bool => TypeFamily::Bool,
            DataType::Int | DataType::Double => TypeFamily::Numeric,
            DataType::Text => TypeFamily::Text,
            DataType::Date => TypeFamily::Date,
            DataType::Timestamp => TypeFamily::Timestamp,
            DataType::Opaque => TypeFamily::Opaque,
        }
    }

    /// Whether values of this type can be represented by interval constraints.
    pub fn is_constrainable(&self) -> bool {
        !matches!(self, DataType::Opaque)
    }

    /// Whether a column of this type can be compared with `datum` for statistics.
    pub fn stats_comparable_with(&self, datum: &Datum) -> bool {
        self.family() != TypeFamily::Opaque && self.family() == datum.data_type().family()
    }

    /// Whether two column types can be matched in join histograms.
    pub fn stats_comparable(&self, other: &DataType) -> bool {
        self.family() != TypeFamily::Opaque && self.family() == other.family()
    }
}

#[derive(Clone, Debug)]
pub enum Datum {
    Null(DataType),
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    /// Days since epoch.
    Date(i32),
    /// Microseconds since epoch.
    Timestamp(i64),
    Opaque(Vec<u8>),
}

impl Datum {
    pub fn data_type(&self) -> DataType {
        match self {
            Datum::Null(t) => *t,
            Datum::Bool(_) => DataType::Bool,
            Datum::Int(_) => DataType::Int,
            Datum::Double(_) => DataType::Double,
            Datum::Text(_) => DataType::Text,
            Datum::Date(_) => DataType::Date,
            Datum::Timestamp(_) => DataType::Timestamp,
            Datum::Opaque(_) => DataType::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Both datums belong to the same comparable type family.
    pub fn stats_comparable(&self, other: &Datum) -> bool {
        self.data_type().stats_comparable(&other.data_type())
    }

    pub fn has_stats_mapping(&self) -> bool {
        self.stats_mapping().is_some()
    }

    /// Maps the value into the double domain used for interpolation.
    ///
    /// Text maps its first eight bytes as a big-endian integer, which preserves byte order.
    pub fn stats_mapping(&self) -> Option<f64> {
        match self {
            Datum::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Datum::Int(v) => Some(*v as f64),
            Datum::Double(v) => Some(*v),
            Datum::Date(v) => Some(*v as f64),
            Datum::Timestamp(v) => Some(*v as f64),
            Datum::Text(s) => {
                let mut prefix = [0u8; 8];
                for (dst, src) in prefix.iter_mut().zip(s.as_bytes()) {
                    *dst = *src;
                }
                Some(u64::from_be_bytes(prefix) as f64)
            }
            Datum::Null(_) | Datum::Opaque(_) => None,
        }
    }

    /// Orders two non-null datums of one family, `None` when they are not comparable.
    pub fn stats_cmp(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null(_), _) | (_, Datum::Null(_)) => None,
            (Datum::Bool(a), Datum::Bool(b)) => Some(a.cmp(b)),
            (Datum::Int(a), Datum::Int(b)) => Some(a.cmp(b)),
            (Datum::Text(a), Datum::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Datum::Date(a), Datum::Date(b)) => Some(a.cmp(b)),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => Some(a.cmp(b)),
            (Datum::Int(_), Datum::Double(_))
            | (Datum::Double(_), Datum::Int(_))
            | (Datum::Double(_), Datum::Double(_)) => {
                let (a, b) = (self.stats_mapping()?, other.stats_mapping()?);
                a.partial_cmp(&b)
            }
            _ => None,
        }
    }

    /// Like [`Datum::stats_cmp`] but reports incomparable datums as an error.
    pub fn compare(&self, other: &Datum) -> OptResult<Ordering> {
        self.stats_cmp(other).ok_or_else(|| {
            OptError::UnsupportedComparison {
                left: self.data_type().to_string(),
                right: other.data_type().to_string(),
            }
            .into()
        })
    }

    /// The immediate successor for discrete domains.
    pub fn next(&self) -> Option<Datum> {
        match self {
            Datum::Int(v) => v.checked_add(1).map(Datum::Int),
            Datum::Date(v) => v.checked_add(1).map(Datum::Date),
            _ => None,
        }
    }

    /// `self - other` in the mapped domain.
    pub fn distance(&self, other: &Datum) -> Option<f64> {
        Some(self.stats_mapping()? - other.stats_mapping()?)
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null(a), Datum::Null(b)) => a == b,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::Double(a), Datum::Double(b)) => a.to_bits() == b.to_bits(),
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Date(a), Datum::Date(b)) => a == b,
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a == b,
            (Datum::Opaque(a), Datum::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Null(t) => t.hash(state),
            Datum::Bool(b) => b.hash(state),
            Datum::Int(v) => v.hash(state),
            Datum::Double(v) => v.to_bits().hash(state),
            Datum::Text(s) => s.hash(state),
            Datum::Date(v) => v.hash(state),
            Datum::Timestamp(v) => v.hash(state),
            Datum::Opaque(b) => b.hash(state),
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null(_) => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Double(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "'{}'", s),
            Datum::Date(v) => write!(f, "date({})", v),
            Datum::Timestamp(v) => write!(f, "ts({})", v),
            Datum::Opaque(b) => write!(f, "opaque[{}]", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;

    #[test]
    fn test_mixed_numeric_comparison() {
        assert_eq!(
            Some(Ordering::Less),
            Datum::Int(3).stats_cmp(&Datum::Double(3.5))
        );
        assert_eq!(Some(4.5), Datum::Double(7.5).distance(&Datum::Int(3)));
    }

    #[test]
    fn test_incomparable_datums() {
        assert!(Datum::Int(1).stats_cmp(&Datum::Text("a".into())).is_none());
        let err = Datum::Int(1).compare(&Datum::Opaque(vec![1])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::UnsupportedComparison { .. })
        ));
        assert!(!DataType::Opaque.stats_comparable_with(&Datum::Opaque(vec![])));
    }

    #[test]
    fn test_text_mapping_preserves_order() {
        let a = Datum::Text("abc".into()).stats_mapping().unwrap();
        let b = Datum::Text("abd".into()).stats_mapping().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_next_only_for_discrete_types() {
        assert_eq!(Some(Datum::Int(8)), Datum::Int(7).next());
        assert_eq!(None, Datum::Double(7.0).next());
        assert_eq!(None, Datum::Int(i64::MAX).next());
    }
}
