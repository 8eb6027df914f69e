//! Raw document fragments yielded by a page source.

use serde::{Deserialize, Serialize};

/// One item of a participant's detail fragment, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentItem {
    /// A rendered label and the value shown next to it
    Pair { label: String, value: String },

    /// A heading that introduces the following schedule entries
    DayHeader { text: String },
}

impl FragmentItem {
    pub fn pair(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Pair {
            label: label.into(),
            value: value.into(),
        }
    }

    pub fn day(text: impl Into<String>) -> Self {
        Self::DayHeader { text: text.into() }
    }
}

/// A participant's raw detail, as label/value pairs and day headers.
pub type Fragment = Vec<FragmentItem>;
