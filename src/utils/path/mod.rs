//! Path utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization and cache keys

pub mod fs;

pub use fs::{cache_key, is_underscored, normalize_path, resolve_path};
