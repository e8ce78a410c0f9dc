//! # firehose-settings
//!
//! Configuration for the firehose dispatcher, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`FirehoseSettings::default()`]
//! 2. **User file**: `~/.firehose/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FIREHOSE_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
