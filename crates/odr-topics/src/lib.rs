//! Canonical event topic constants shared across the workspace.
//!
//! This crate centralizes the string constants used when publishing events
//! so that the registry and any embedding application stay in sync.
//! Keep this list alphabetized within sections and favor dot.case names.

// Resource downloads
pub const TOPIC_RESOURCE_PROGRESS: &str = "resource.download.progress";
pub const TOPIC_RESOURCE_RECORDS_CHANGED: &str = "resource.records.changed";
pub const TOPIC_RESOURCE_RELEASED: &str = "resource.released";
