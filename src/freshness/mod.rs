//! Freshness detection: blake3 fingerprints, the persistent cache, and
//! rebuild selection.

mod cache;
mod hash;
mod select;

pub use cache::{CACHE_FILE, Cache};
pub use hash::{Fingerprint, fingerprint_file};
pub use select::{Fanout, RebuildSelector, RebuildSet};
