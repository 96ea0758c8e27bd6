//! Classifier implementations.
//!
//! This module provides a reference implementation of the [`Classifier`]
//! trait plus a rate-limiting wrapper usable with any implementation.
//!
//! [`Classifier`]: crate::traits::classifier::Classifier

pub mod prompts;
mod rate_limited;

#[cfg(feature = "openai")]
mod openai;

pub use rate_limited::RateLimitedClassifier;

#[cfg(feature = "openai")]
pub use openai::OpenAiClassifier;
