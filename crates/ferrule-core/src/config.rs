//! Compilation configuration.
//!
//! A [`CompilerConfig`] is built once and handed to a compilation run by
//! reference. Nothing in the crate keeps a process-wide default that callers
//! could mutate, so concurrent runs with different settings never observe
//! each other.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Option key toggling the wrapper-collapse policy
pub const OPT_NULL_WRAPPERS: &str = "nullwrappers";

/// Option key toggling the compatibility-level marker for temporal types
pub const OPT_COMPAT_LEVEL: &str = "compatlevel";

/// Configuration for one compilation run
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Search roots, tried in order; first match wins
    pub search_roots: Vec<PathBuf>,
    /// Collapse the nine scalar wrapper messages into nullable scalars
    pub null_wrappers: bool,
    /// Mark native temporal fields with a compatibility level instead of a
    /// field-level well-known data format
    pub compat_level: bool,
    /// Full field paths (`package.Message.field`) whose collections carry nulls
    pub null_support: BTreeSet<String>,
    /// Options not interpreted by the core, passed through to renderers
    pub render_options: BTreeMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            search_roots: Vec::new(),
            null_wrappers: true,
            compat_level: true,
            null_support: BTreeSet::new(),
            render_options: BTreeMap::new(),
        }
    }
}

impl CompilerConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from string-valued options.
    ///
    /// `nullwrappers` and `compatlevel` are parsed as booleans; every other
    /// key is kept verbatim as a renderer option.
    pub fn from_options<'a, I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            match key {
                OPT_NULL_WRAPPERS => config.null_wrappers = parse_bool(key, value)?,
                OPT_COMPAT_LEVEL => config.compat_level = parse_bool(key, value)?,
                _ => {
                    config.render_options.insert(key.to_string(), value.to_string());
                }
            }
        }
        Ok(config)
    }

    /// Appends a search root
    pub fn search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.push(root.into());
        self
    }

    /// Sets whether wrapper messages collapse to nullable scalars
    pub fn null_wrappers(mut self, enabled: bool) -> Self {
        self.null_wrappers = enabled;
        self
    }

    /// Sets whether temporal fields carry a compatibility-level marker
    pub fn compat_level(mut self, enabled: bool) -> Self {
        self.compat_level = enabled;
        self
    }

    /// Enables the null-carrying collection policy for one repeated field.
    ///
    /// `field_path` is the field's full name, e.g. `shop.Order.items`; a
    /// leading dot is accepted and ignored.
    pub fn support_null(mut self, field_path: impl Into<String>) -> Self {
        let path: String = field_path.into();
        self.null_support
            .insert(path.trim_start_matches('.').to_string());
        self
    }

    /// Sets a renderer option
    pub fn render_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.render_options.insert(key.into(), value.into());
        self
    }

    /// Returns true if the field at `full_name` should carry nulls
    pub fn supports_null(&self, full_name: &str) -> bool {
        self.null_support.contains(full_name)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::invalid_option(key, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_both_policies() {
        let config = CompilerConfig::default();
        assert!(config.null_wrappers);
        assert!(config.compat_level);
        assert!(config.null_support.is_empty());
    }

    #[test]
    fn test_from_options() {
        let config = CompilerConfig::from_options([
            ("nullwrappers", "false"),
            ("compatlevel", "No"),
            ("indent", "4"),
        ])
        .unwrap();

        assert!(!config.null_wrappers);
        assert!(!config.compat_level);
        assert_eq!(config.render_options.get("indent").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_from_options_rejects_garbage() {
        let err = CompilerConfig::from_options([("nullwrappers", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("nullwrappers"));
    }

    #[test]
    fn test_support_null_strips_leading_dot() {
        let config = CompilerConfig::new().support_null(".shop.Order.items");
        assert!(config.supports_null("shop.Order.items"));
    }
}
