//! Result cache for aggregate queries
//!
//! One instance per process, constructed at startup and injected into the
//! services that need it.

pub mod key;
pub mod result_cache;

pub use key::{generate_key, ParamValue, QueryParams};
pub use result_cache::{CacheStats, ResultCache};
