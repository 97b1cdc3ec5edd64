use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        $(#[$meta])*
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    ValidationStatus {
        Pending => "PENDING",
        Validated => "VALIDATED",
        NeedsSuffix => "NEEDS_SUFFIX",
        Unrecognized => "UNRECOGNIZED",
        Error => "ERROR",
    }
);

impl ValidationStatus {
    /// UNRECOGNIZED and ERROR documents wait in the resolution queue.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unrecognized | Self::Error)
    }

    /// Statuses counted as pending in batch aggregates.
    pub fn counts_as_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::NeedsSuffix)
    }

    /// Statuses counted as invalid in batch aggregates.
    pub fn counts_as_invalid(&self) -> bool {
        matches!(self, Self::Unrecognized | Self::Error)
    }
}

str_enum!(
    #[serde(rename_all = "snake_case")]
    ResolutionMethod {
        Manual => "manual",
        Auto => "auto",
        Ocr => "ocr",
    }
);

str_enum!(
    #[serde(rename_all = "snake_case")]
    CandidateSource {
        Extraction => "extraction",
        Filename => "filename",
        Search => "search",
    }
);
