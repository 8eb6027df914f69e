//! Closed enumerations for the three classification axes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Declares a closed, string-coded enumeration.
///
/// Every variant has exactly one code; parsing accepts only those codes
/// (case-insensitive), so nothing outside the enumeration can be produced.
macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All members, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical code written to output files.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        AppError::validation(format!(
                            "'{}' is not a valid {}",
                            wanted,
                            stringify!($name)
                        ))
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

closed_enum!(
    /// Competition grade.
    Grade {
        G1 => "G1",
        G2 => "G2",
        G3 => "G3",
        Pre => "PRE",
        Promotion => "PROM",
        Competition => "COMP",
        Rookie => "ROOKIE",
        Triathlon => "TRI",
    }
);

closed_enum!(
    /// Size category, either a named class or a jump height in centimetres.
    SizeCategory {
        ExtraSmall => "XS",
        Small => "S",
        Medium => "M",
        Intermediate => "I",
        Large => "L",
        Height20 => "20",
        Height30 => "30",
        Height40 => "40",
        Height50 => "50",
        Height60 => "60",
    }
);

closed_enum!(
    /// Age or division marker.
    ExtraCategory {
        Junior12 => "J12",
        Junior15 => "J15",
        Junior19 => "J19",
        Junior => "JUNIOR",
        Senior => "SENIOR",
        Para => "PARA",
        Master => "MASTER",
        Special => "SPECIAL",
    }
);

/// Classification derived from one schedule slot's rounds-string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub grade: Option<Grade>,
    pub category: Option<SizeCategory>,
    pub extra_category: Option<ExtraCategory>,
}

impl Classification {
    /// True once all three axes are resolved.
    pub fn is_complete(&self) -> bool {
        self.grade.is_some() && self.category.is_some() && self.extra_category.is_some()
    }

    /// Output strings for the three axes; unresolved axes are empty.
    pub fn as_strings(&self) -> [String; 3] {
        [
            self.grade.map(|g| g.to_string()).unwrap_or_default(),
            self.category.map(|c| c.to_string()).unwrap_or_default(),
            self.extra_category.map(|e| e.to_string()).unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_case_insensitively() {
        assert_eq!("g2".parse::<Grade>().unwrap(), Grade::G2);
        assert_eq!("xs".parse::<SizeCategory>().unwrap(), SizeCategory::ExtraSmall);
        assert_eq!(" j12 ".parse::<ExtraCategory>().unwrap(), ExtraCategory::Junior12);
    }

    #[test]
    fn rejects_values_outside_enumeration() {
        assert!("G4".parse::<Grade>().is_err());
        assert!("XL".parse::<SizeCategory>().is_err());
        assert!("".parse::<ExtraCategory>().is_err());
    }

    #[test]
    fn incomplete_classification_renders_empty_axes() {
        let c = Classification {
            grade: Some(Grade::Pre),
            ..Classification::default()
        };
        assert!(!c.is_complete());
        assert_eq!(c.as_strings(), ["PRE".to_string(), String::new(), String::new()]);
    }
}
