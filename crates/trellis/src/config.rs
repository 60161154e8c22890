//! Host settings
//!
//! A thin figment-backed view of host configuration: a TOML file merged with
//! prefixed environment variables, environment winning. The container does not
//! read settings on its own; the host passes a [`HostSettings`] to builder
//! operations such as `bind_tag_setting`, which read named values at
//! configuration time.

use crate::error::{Error, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Environment variables prefixed with this override file-sourced settings.
pub const ENV_PREFIX: &str = "TRELLIS_";

/// Layered host configuration, read at configuration time only
#[derive(Debug, Clone)]
pub struct HostSettings {
    figment: Figment,
}

impl HostSettings {
    /// Environment-only settings
    pub fn from_env() -> Self {
        Self {
            figment: Figment::new().merge(Env::prefixed(ENV_PREFIX)),
        }
    }

    /// TOML file merged under prefixed environment variables
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        debug!(path = %path.as_ref().display(), "loading host settings");
        Self {
            figment: Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX)),
        }
    }

    /// Settings from an in-memory TOML document, environment still winning
    pub fn from_toml_str(toml: &str) -> Self {
        Self {
            figment: Figment::new()
                .merge(Toml::string(toml))
                .merge(Env::prefixed(ENV_PREFIX)),
        }
    }

    /// A named string setting, dotted paths allowed
    pub fn string(&self, name: &str) -> Result<String> {
        self.value(name)
    }

    /// A named setting deserialized to `T`
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.figment.extract_inner::<T>(name).map_err(|e| {
            Error::configuration_with_source(format!("setting `{name}` is missing or invalid"), e)
        })
    }

    /// Whether a named setting is present
    pub fn contains(&self, name: &str) -> bool {
        self.figment.find_value(name).is_ok()
    }
}
