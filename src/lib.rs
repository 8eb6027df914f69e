// src/lib.rs

//! Harvester Library
//!
//! Checkpointed extraction of agility competition events and participants,
//! and reconciliation of the harvested records into one document.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
