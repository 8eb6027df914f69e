// src/services/classifier.rs

//! Rounds-string classifier.
//!
//! Derives (grade, size category, extra category) from a free-text rounds
//! string through ordered rule cascades. Every value produced parses into
//! its closed enumeration; an axis that no rule recognizes stays empty.

use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{AppError, Result};
use crate::models::{
    ClassRule, Classification, ClassifierConfig, ExtraCategory, Grade, SizeCategory,
};
use crate::utils::text::fold;

/// Ordered rules for one axis; the first rule with any matching pattern wins.
#[derive(Debug)]
struct Cascade<T> {
    rules: Vec<(T, Vec<Regex>)>,
}

impl<T> Cascade<T>
where
    T: Copy + FromStr<Err = AppError>,
{
    fn build(rules: &[ClassRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let value = rule.value.parse::<T>()?;
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|p| compile(p))
                    .collect::<Result<Vec<_>>>()?;
                Ok((value, patterns))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    fn find(&self, text: &str) -> Option<T> {
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
            .map(|(value, _)| *value)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Classifies rounds-strings into the three closed axes.
#[derive(Debug)]
pub struct Classifier {
    heights: Option<Regex>,
    categories: Cascade<SizeCategory>,
    extras: Cascade<ExtraCategory>,
    grades: Cascade<Grade>,
    parenthesized: Regex,
    date_like: Regex,
    split_separator: String,
    federated_markers: Vec<String>,
    federated_separators: Vec<String>,
    raw_grades: Vec<(String, Grade)>,
}

impl Classifier {
    /// Compile the rule tables, rejecting values outside the enumerations.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        for height in &config.heights {
            height.parse::<SizeCategory>()?;
        }
        let heights = if config.heights.is_empty() {
            None
        } else {
            let alternatives: Vec<String> =
                config.heights.iter().map(|h| regex::escape(h.trim())).collect();
            Some(compile(&format!(
                r"\b({})\s*(?:cm)?\b",
                alternatives.join("|")
            ))?)
        };

        let raw_grades = config
            .raw_grades
            .iter()
            .map(|raw| Ok((fold(&raw.token), raw.value.parse::<Grade>()?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            heights,
            categories: Cascade::build(&config.categories)?,
            extras: Cascade::build(&config.extras)?,
            grades: Cascade::build(&config.grades)?,
            parenthesized: Regex::new(r"\(([^)]*)\)")?,
            date_like: Regex::new(r"\b\d{1,2}[/.\-]\d{1,2}(?:[/.\-]\d{2,4})?\b")?,
            split_separator: config.split_separator.clone(),
            federated_markers: config.federated_markers.iter().map(|m| fold(m)).collect(),
            federated_separators: config.federated_separators.clone(),
            raw_grades,
        })
    }

    /// Classify one rounds-string.
    ///
    /// `federation` is the participant's federation field; when it carries
    /// a federated marker, unresolved axes get a second pass over the part
    /// of the string after the federation separator.
    pub fn classify(&self, rounds: &str, federation: &str) -> Classification {
        let text = fold(rounds);
        let mut c = Classification::default();
        if text.is_empty() {
            return c;
        }

        self.fill_category(&mut c, &text);
        self.fill_extra(&mut c, &text);
        self.fill_grade(&mut c, &text);

        if (c.grade.is_none() || (c.category.is_none() && c.extra_category.is_none()))
            && !self.split_separator.is_empty()
        {
            if let Some((left, right)) = text.split_once(self.split_separator.as_str()) {
                self.fill_grade(&mut c, left);
                self.fill_category(&mut c, right);
                self.fill_extra(&mut c, right);
            }
        }

        if !c.is_complete() && self.is_federated(federation) {
            let tail = self.federated_tail(&text);
            self.fill_category(&mut c, tail);
            self.fill_extra(&mut c, tail);
            self.fill_grade(&mut c, tail);
            if c.grade.is_none() {
                c.grade = self.raw_grade(tail);
            }
        }

        c
    }

    fn fill_category(&self, c: &mut Classification, text: &str) {
        if c.category.is_some() {
            return;
        }
        // "20/04" is a date, not a height.
        let text = self.date_like.replace_all(text, " ");
        let text = text.as_ref();
        c.category = self
            .heights
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .or_else(|| self.categories.find(text));
    }

    fn fill_extra(&self, c: &mut Classification, text: &str) {
        if c.extra_category.is_some() {
            return;
        }
        c.extra_category = self
            .parenthesized
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|inner| self.extras.find(inner.as_str()))
            .or_else(|| self.extras.find(text));
    }

    fn fill_grade(&self, c: &mut Classification, text: &str) {
        if c.grade.is_none() {
            c.grade = self.grades.find(text);
        }
    }

    fn is_federated(&self, federation: &str) -> bool {
        let folded = fold(federation);
        !folded.is_empty()
            && self
                .federated_markers
                .iter()
                .any(|m| !m.is_empty() && folded.starts_with(m.as_str()))
    }

    fn federated_tail<'a>(&self, text: &'a str) -> &'a str {
        self.federated_separators
            .iter()
            .filter(|sep| !sep.is_empty())
            .find_map(|sep| text.split_once(sep.as_str()).map(|(_, tail)| tail))
            .unwrap_or(text)
    }

    fn raw_grade(&self, tail: &str) -> Option<Grade> {
        tail.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .find_map(|token| {
                self.raw_grades
                    .iter()
                    .find(|(raw, _)| raw == token)
                    .map(|(_, grade)| *grade)
            })
    }
}
