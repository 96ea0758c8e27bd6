//! Core trait abstractions for the scanner library.
//!
//! These traits define the interfaces to the external collaborators the
//! pipeline consumes: object storage, text extraction, the semantic
//! classifier, project metadata, job persistence, notification delivery and
//! process memory sampling.

pub mod classifier;
pub mod job_store;
pub mod memory;
pub mod metadata;
pub mod notifier;
pub mod object_store;
pub mod text;
