//! Named configuration profiles with inheritance and environment
//! auto-detection.
//!
//! Profiles never change merge semantics; they select which
//! profile-specific files the composer loads and carry auxiliary
//! variables reachable through their own lookup chain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use strata_errors::{StrataError, StrataResult};
use tracing::debug;

/// Environment variables scanned for auto-detection, in order; the
/// first non-empty value wins.
pub const PROFILE_ENV_VARS: &[&str] = &["ENVIRONMENT", "ENV", "APP_ENV", "CONFIG_ENV", "RUST_ENV"];

/// Canonicalize a profile name, resolving the common aliases.
pub fn canonical_profile_name(name: &str) -> String {
    let normalized = name.trim().to_lowercase();
    match normalized.as_str() {
        "dev" | "develop" | "local" => "development".to_string(),
        "test" => "testing".to_string(),
        "stage" => "staging".to_string(),
        "prod" => "production".to_string(),
        _ => normalized,
    }
}

/// A named profile: optional parent, profile-scoped variables.
#[derive(Debug, Clone)]
pub struct ConfigProfile {
    pub name: String,
    pub parent: Option<String>,
    vars: Map<String, Value>,
}

impl ConfigProfile {
    fn new(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            vars: Map::new(),
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    fn own_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }
}

/// Registry of profiles plus the active selection.
pub struct ProfileManager {
    profiles: HashMap<String, ConfigProfile>,
    active: Option<String>,
}

impl ProfileManager {
    /// A registry seeded with the reserved base profiles and their
    /// conventional variables.
    pub fn new() -> Self {
        let mut manager = Self {
            profiles: HashMap::new(),
            active: None,
        };
        manager.install_builtin_profiles();
        manager
    }

    fn install_builtin_profiles(&mut self) {
        self.profiles
            .insert("base".to_string(), ConfigProfile::new("base", None));

        let mut development = ConfigProfile::new("development", Some("base"));
        development.set_var("debug", json!(true));
        development.set_var("log_level", json!("debug"));
        development.set_var("cache_enabled", json!(false));

        let mut testing = ConfigProfile::new("testing", Some("base"));
        testing.set_var("debug", json!(false));
        testing.set_var("log_level", json!("warning"));
        testing.set_var("cache_enabled", json!(false));
        testing.set_var("database_pool_size", json!(1));

        let mut staging = ConfigProfile::new("staging", Some("base"));
        staging.set_var("debug", json!(false));
        staging.set_var("log_level", json!("info"));
        staging.set_var("cache_enabled", json!(true));
        staging.set_var("database_pool_size", json!(10));

        let mut production = ConfigProfile::new("production", Some("base"));
        production.set_var("debug", json!(false));
        production.set_var("log_level", json!("warning"));
        production.set_var("cache_enabled", json!(true));
        production.set_var("database_pool_size", json!(20));
        production.set_var("ssl_required", json!(true));

        for profile in [development, testing, staging, production] {
            self.profiles.insert(profile.name.clone(), profile);
        }
    }

    /// Detect the active profile from the well-known environment
    /// variables; defaults to `development`.
    pub fn detect(&self) -> String {
        for var in PROFILE_ENV_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    let name = canonical_profile_name(&value);
                    debug!(var, profile = %name, "detected profile from environment");
                    return name;
                }
            }
        }
        "development".to_string()
    }

    /// Register a new profile. The parent must already exist and the
    /// resulting parent chain must stay acyclic.
    pub fn create_profile(
        &mut self,
        name: &str,
        parent: Option<&str>,
    ) -> StrataResult<&mut ConfigProfile> {
        let name = canonical_profile_name(name);
        let parent = parent.map(canonical_profile_name);

        if let Some(parent_name) = &parent {
            if !self.profiles.contains_key(parent_name) {
                return Err(StrataError::profile(format!(
                    "parent profile '{parent_name}' not found"
                )));
            }
            // Walk up from the parent; if we come back around to the
            // new name the chain would be cyclic.
            let mut cursor = Some(parent_name.clone());
            while let Some(current) = cursor {
                if current == name {
                    return Err(StrataError::profile(format!(
                        "profile '{name}' would create an inheritance cycle"
                    )));
                }
                cursor = self
                    .profiles
                    .get(&current)
                    .and_then(|p| p.parent.clone());
            }
        }

        let profile = ConfigProfile::new(&name, parent.as_deref());
        self.profiles.insert(name.clone(), profile);
        Ok(self.profiles.get_mut(&name).expect("just inserted"))
    }

    pub fn get(&self, name: &str) -> Option<&ConfigProfile> {
        self.profiles.get(&canonical_profile_name(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ConfigProfile> {
        self.profiles.get_mut(&canonical_profile_name(name))
    }

    pub fn set_active(&mut self, name: &str) -> StrataResult<()> {
        let name = canonical_profile_name(name);
        if !self.profiles.contains_key(&name) {
            return Err(StrataError::profile(format!("profile '{name}' not found")));
        }
        self.active = Some(name);
        Ok(())
    }

    /// The active profile name, auto-detecting when none was selected.
    pub fn active_name(&self) -> String {
        self.active.clone().unwrap_or_else(|| self.detect())
    }

    pub fn active(&self) -> Option<&ConfigProfile> {
        let name = self.active_name();
        self.profiles.get(&name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a variable along the inheritance chain of the given (or
    /// active) profile: the child overrides its ancestors.
    pub fn var(&self, key: &str, profile: Option<&str>) -> Option<Value> {
        let start = match profile {
            Some(name) => canonical_profile_name(name),
            None => self.active_name(),
        };
        let mut cursor = Some(start);
        while let Some(name) = cursor {
            let profile = self.profiles.get(&name)?;
            if let Some(value) = profile.own_var(key) {
                return Some(value.clone());
            }
            cursor = profile.parent.clone();
        }
        None
    }
}

impl Default for ProfileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Profile-specific configuration file path.
///
/// A directory base yields `dir/profile.ext`; a file base gets the
/// profile inserted before its extension.
pub fn profile_source_path(base: impl AsRef<Path>, profile: &str, extension: &str) -> PathBuf {
    let base = base.as_ref();
    if let (Some(stem), Some(ext)) = (
        base.file_stem().and_then(|s| s.to_str()),
        base.extension().and_then(|e| e.to_str()),
    ) {
        let parent = base.parent().unwrap_or_else(|| Path::new(""));
        return parent.join(format!("{stem}.{profile}.{ext}"));
    }
    base.join(format!("{profile}.{extension}"))
}

pub fn profile_source_exists(base: impl AsRef<Path>, profile: &str, extension: &str) -> bool {
    profile_source_path(base, profile, extension).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_canonicalize_case_insensitively() {
        assert_eq!(canonical_profile_name("DEV"), "development");
        assert_eq!(canonical_profile_name("local"), "development");
        assert_eq!(canonical_profile_name("Prod"), "production");
        assert_eq!(canonical_profile_name("stage"), "staging");
        assert_eq!(canonical_profile_name("test"), "testing");
        assert_eq!(canonical_profile_name("custom"), "custom");
    }

    #[test]
    fn builtin_profiles_are_registered() {
        let manager = ProfileManager::new();
        for name in ["base", "development", "testing", "staging", "production"] {
            assert!(manager.get(name).is_some(), "{name} missing");
        }
    }

    #[test]
    fn vars_resolve_along_the_inheritance_chain() {
        let mut manager = ProfileManager::new();
        manager
            .get_mut("base")
            .unwrap()
            .set_var("region", json!("eu-west-1"));

        // Inherited from base through development.
        assert_eq!(
            manager.var("region", Some("development")),
            Some(json!("eu-west-1"))
        );
        // Child value wins over ancestor.
        assert_eq!(manager.var("debug", Some("development")), Some(json!(true)));

        let profile = manager.create_profile("edge", Some("production")).unwrap();
        profile.set_var("debug", json!(true));
        assert_eq!(manager.var("debug", Some("edge")), Some(json!(true)));
        assert_eq!(manager.var("ssl_required", Some("edge")), Some(json!(true)));
        assert_eq!(manager.var("nope", Some("edge")), None);
    }

    #[test]
    fn unknown_parent_and_cycles_are_rejected() {
        let mut manager = ProfileManager::new();
        assert!(manager.create_profile("a", Some("ghost")).is_err());

        manager.create_profile("a", None).unwrap();
        manager.create_profile("b", Some("a")).unwrap();
        // Re-registering "a" with parent "b" would close the loop.
        assert!(manager.create_profile("a", Some("b")).is_err());
    }

    #[test]
    fn active_profile_selection() {
        let mut manager = ProfileManager::new();
        assert!(manager.set_active("prod").is_ok());
        assert_eq!(manager.active_name(), "production");
        assert!(manager.set_active("missing").is_err());
    }

    #[test]
    fn detection_scans_env_vars_in_order() {
        // Use a private scope to avoid interfering with other tests:
        // CONFIG_ENV is late in the scan order and unlikely to be set.
        std::env::remove_var("ENVIRONMENT");
        std::env::remove_var("ENV");
        std::env::remove_var("APP_ENV");
        std::env::remove_var("RUST_ENV");
        std::env::set_var("CONFIG_ENV", "stage");
        let manager = ProfileManager::new();
        assert_eq!(manager.detect(), "staging");
        std::env::remove_var("CONFIG_ENV");
        assert_eq!(manager.detect(), "development");
    }

    #[test]
    fn profile_paths() {
        assert_eq!(
            profile_source_path("config", "production", "yaml"),
            PathBuf::from("config/production.yaml")
        );
        assert_eq!(
            profile_source_path("app.json", "staging", "json"),
            PathBuf::from("app.staging.json")
        );
    }
}
