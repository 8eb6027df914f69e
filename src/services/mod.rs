//! Service layer for the harvester.
//!
//! This module contains the business logic for:
//! - Label normalization (`Normalizer`)
//! - Rounds-string classification (`Classifier`)
//! - Page sources (`PageSource`, `ReplaySource`, `HtmlPageSource`)

mod classifier;
#[cfg(feature = "html")]
mod html;
mod normalizer;
pub mod source;

pub use classifier::Classifier;
#[cfg(feature = "html")]
pub use html::HtmlPageSource;
pub use normalizer::{LabelTarget, Normalizer};
pub use source::{Capture, PageSource, ReplaySource, RetryPolicy, RetryingSource};
