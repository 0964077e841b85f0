//! Small shared helpers: URL handling and glob matching.

pub mod glob;
pub mod url;

pub use glob::GlobSet;
pub use url::{is_fetchable_url, normalize_for_dedup, registrable_domain, resolve_discovered};
