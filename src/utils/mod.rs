//! Utility functions and helpers.

pub mod fs;
pub mod report;
pub mod text;
pub mod url;
