//! # chime-settings
//!
//! Configuration management with layered sources for the chime hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChimeSettings::default()`]
//! 2. **Settings file**: `$CHIME_HOME/settings.json` or `~/.chime/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `CHIME_*` overrides (highest priority)
//!
//! The loaded value is validated before it is returned; there is no global
//! instance, the binary passes it down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
