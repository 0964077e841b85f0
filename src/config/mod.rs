//! Service configuration.
//!
//! `Settings` is the process-wide configuration resolved once at startup
//! from environment variables; everything request-scoped lives in the
//! validated request options instead.

pub mod settings;

pub use settings::{DatabaseDialect, Settings, StorageBackend};
