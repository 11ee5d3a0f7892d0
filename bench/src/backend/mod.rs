//! Storage backends under test.
//!
//! Each backend exposes the same pieces: a loader sink, a way to draw lookup
//! keys from already-loaded data, the strategies to time, and plan probes.

pub mod hash_record;
pub mod postgres;
pub mod search;
