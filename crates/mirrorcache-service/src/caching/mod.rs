//! The cache-fill coordination core.
//!
//! A cache entry on disk is the triple of object file, optional digest
//! sidecar (`<object>.sha256`) and zero or more temp artifacts
//! (`<object>.tmp.<suffix>`). The modules here decide whether an entry is
//! usable ([`check`]), serialize concurrent fills per key
//! ([`KeyLockManager`]), and publish downloaded bytes atomically
//! ([`commit`]).

mod cache_error;
mod commit;
mod integrity;
mod keylock;
mod layout;

#[cfg(test)]
mod tests;

pub use cache_error::{CacheContents, CacheError};
pub use commit::commit;
pub use integrity::{ObjectState, check};
pub use keylock::{FillPermit, KeyLockManager};
pub use layout::{CacheKey, StorageLayout};
