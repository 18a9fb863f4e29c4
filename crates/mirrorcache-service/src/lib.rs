//! Core service layer of the mirrorcache pull-through cache.
//!
//! The first request for a path fetches the object from the configured
//! upstream mirror, verifies it, and publishes it below the storage root.
//! Subsequent requests for the same path are served from disk without
//! contacting the upstream again. Concurrent requests for the same missing
//! object are serialized so the upstream is hit at most once per miss.

pub mod caching;
pub mod config;
pub mod download;
pub mod service;
pub mod stats;
