//! Account/class/item resolution.
//!
//! Static tables map a record's classification to names; names are turned
//! into external ids through the accounting API and cached.

pub mod cache;
pub mod mapping;
pub mod service;

pub use cache::{CachePolicy, LookupCache, LookupKind};
pub use mapping::{ClassMapping, ItemMapping};
pub use service::{FeeLineRefs, Resolver};
