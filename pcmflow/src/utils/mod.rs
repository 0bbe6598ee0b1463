//! Utility functions and supporting infrastructure.
//!
//! Provides the per-sample PCM codecs and the error types.

pub mod errors;
pub mod pcm;
