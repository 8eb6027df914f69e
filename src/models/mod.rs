// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod classification;
mod config;
mod event;
mod fragment;
mod participant;
mod record;

// Re-export all public types
pub use classification::{Classification, ExtraCategory, Grade, SizeCategory};
pub use config::{
    ClassRule, ClassifierConfig, Config, DiscoveryConfig, DiscoveryProfile, EnrichRule,
    ExtractConfig, FieldSynonyms, NormalizerConfig, PathsConfig, RawGrade, ReconcileConfig,
    SourceConfig, SourceSelectors,
};
pub use event::{Event, UNKNOWN};
pub use fragment::{Fragment, FragmentItem};
pub use participant::{Field, Participant, ParticipantRef, ScheduleSlot};
pub use record::{Record, RecordLayout, columns};
