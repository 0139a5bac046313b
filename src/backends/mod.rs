//! Synthesis backends.
//!
//! Backends implement [`crate::SynthesisBackend`]: one call sends one chunk
//! and returns the encoded audio, with no retrying of their own.
//!
//! # Available Backends
//!
//! Enable backends via Cargo features:
//! - `http` - Coqui-style TTS server reached over HTTP (form-encoded POST)

#[cfg(feature = "http")]
pub mod http;
