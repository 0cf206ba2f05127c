//! DBML dialect selection.

use serde::{Deserialize, Serialize};

/// DBML dialect variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Legacy DBML without table partials
    Dbml,
    /// DBML with `TablePartial` and `~partial` injection
    #[default]
    #[serde(alias = "dbml_v2")]
    DbmlV2,
}

impl Dialect {
    /// Parse dialect from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dbml" | "dbmlv1" => Some(Self::Dbml),
            "dbmlv2" | "dbml_v2" => Some(Self::DbmlV2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dbml => "dbml",
            Self::DbmlV2 => "dbmlv2",
        }
    }

    pub fn supports_partials(self) -> bool {
        matches!(self, Self::DbmlV2)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(Dialect::from_str("DBML"), Some(Dialect::Dbml));
        assert_eq!(Dialect::from_str("dbmlv2"), Some(Dialect::DbmlV2));
        assert_eq!(Dialect::from_str("mysql"), None);
    }

    #[test]
    fn test_partials_only_in_v2() {
        assert!(Dialect::DbmlV2.supports_partials());
        assert!(!Dialect::Dbml.supports_partials());
        assert_eq!(Dialect::default(), Dialect::DbmlV2);
    }
}
