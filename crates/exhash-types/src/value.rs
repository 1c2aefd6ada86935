//! Typed field values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::FieldType;

/// A single field value as read from or written to a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Constant {
    /// Signed integer value.
    Int(i64),
    /// UTF-8 string value.
    Str(String),
}

impl Constant {
    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// String payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Str(s) => Some(s),
        }
    }

    /// Stable label used in error messages and logs.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Str(_) => "varchar",
        }
    }

    /// Whether this value can be stored in a field of type `ty`.
    #[must_use]
    pub fn fits(&self, ty: FieldType) -> bool {
        match (self, ty) {
            (Self::Int(_), FieldType::Int) => true,
            (Self::Str(s), FieldType::Varchar(max)) => s.chars().count() <= max,
            _ => false,
        }
    }

    /// The zero value written into fresh records for a field of type `ty`.
    #[must_use]
    pub fn default_for(ty: FieldType) -> Self {
        match ty {
            FieldType::Int => Self::Int(0),
            FieldType::Varchar(_) => Self::Str(String::new()),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Constant {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Constant {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_strings_only() {
        assert_eq!(Constant::Int(-4).to_string(), "-4");
        assert_eq!(Constant::from("bob").to_string(), "'bob'");
    }

    #[test]
    fn fits_checks_type_and_width() {
        assert!(Constant::Int(1).fits(FieldType::Int));
        assert!(!Constant::Int(1).fits(FieldType::Varchar(4)));
        assert!(Constant::from("abcd").fits(FieldType::Varchar(4)));
        assert!(!Constant::from("abcde").fits(FieldType::Varchar(4)));
    }

    #[test]
    fn int_and_string_never_equal() {
        assert_ne!(Constant::Int(1), Constant::from("1"));
    }

    #[test]
    fn serde_shape_is_externally_tagged() {
        let json = serde_json::to_string(&Constant::Int(7)).unwrap();
        assert_eq!(json, r#"{"Int":7}"#);
    }
}
