//! Participant (sub-item) data structures.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Canonical participant field.
///
/// Keys of a [`Participant`]'s field mapping are always one of these, never a
/// raw source label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Bib,
    Handler,
    Dog,
    Breed,
    Age,
    Sex,
    Height,
    License,
    Federation,
    Club,
    PedigreeName,
    Country,
}

impl Field {
    /// All canonical fields, in output column order.
    pub const ALL: [Field; 12] = [
        Field::Bib,
        Field::Handler,
        Field::Dog,
        Field::Breed,
        Field::Age,
        Field::Sex,
        Field::Height,
        Field::License,
        Field::Federation,
        Field::Club,
        Field::PedigreeName,
        Field::Country,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Bib => "bib",
            Field::Handler => "handler",
            Field::Dog => "dog",
            Field::Breed => "breed",
            Field::Age => "age",
            Field::Sex => "sex",
            Field::Height => "height",
            Field::License => "license",
            Field::Federation => "federation",
            Field::Club => "club",
            Field::PedigreeName => "pedigree_name",
            Field::Country => "country",
        }
    }
}

impl FromStr for Field {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| AppError::validation(format!("unknown canonical field '{s}'")))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (day, date, rounds) schedule entry of a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    /// Day label active when the slot was read (may be empty)
    pub day: String,

    /// Date as rendered by the source
    pub date: String,

    /// Free-text rounds/classification string
    pub rounds: String,
}

/// A participant entry as listed for an event, before its detail is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    /// Opaque identifier, stable within one listing render only
    pub id: String,

    /// Detail page, when the source exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A normalized participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,

    #[serde(default)]
    pub fields: BTreeMap<Field, String>,

    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
}

impl Participant {
    /// Value of a canonical field, or "" when absent.
    pub fn get(&self, field: Field) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }
}
