//! Column profiles and process settings.
//!
//! Profiles are loaded from the `configs/` directory (JSON, one profile per file)
//! with the built-in default profile as fallback and never change afterwards.
//! Process settings come from the environment (optionally `.env`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::flow::MAX_NEST_DEPTH;

pub const DEFAULT_PROFILE: &str = "default";

/// Alias lists used to map free-form spreadsheet headers onto semantic fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Account / wallet / PG identifier, the join key between rows.
    pub account_aliases: Vec<String>,
    /// Hop distance from the origin account.
    #[serde(default)]
    pub layer_aliases: Vec<String>,
    /// Account that sent the funds to this row's account.
    #[serde(default)]
    pub parent_aliases: Vec<String>,
    /// Extra fields copied onto every node under a fixed attribute key.
    #[serde(default)]
    pub attribute_fields: Vec<AttributeField>,
}

/// A named attribute resolved from the first matching alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeField {
    pub key: String,
    pub aliases: Vec<String>,
}

impl AttributeField {
    fn new(key: &str, aliases: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            aliases: strings(aliases),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            description: "Cyber-fraud layered transaction reports".to_string(),
            account_aliases: strings(&[
                "Account No./ (Wallet /PG/PA) Id",
                "Account No",
                "AccountNo",
                "Account Number",
                "acc_no",
                "Acknowledgement N",
                "A/C No",
                "AC No",
            ]),
            layer_aliases: strings(&["Layer", "Level"]),
            parent_aliases: strings(&[
                "parent_acc_no",
                "ParentAccountNo",
                "Parent Account No",
                "Parent",
                "Sender Account",
                "Source Account",
                "Debit Account",
                "Remitter Account",
                "Sender",
                "Payer",
            ]),
            attribute_fields: vec![
                AttributeField::new("sNo", &["S.No", "SNo", "Serial No", "S No", "SerialNumber"]),
                AttributeField::new(
                    "acknowledgementN",
                    &["Acknowledgement N", "Acknowledgement", "AcknowledgementN", "Acknowledgement No"],
                ),
                AttributeField::new(
                    "ifscCode",
                    &["IFSC Code", "IFSCCode", "IFSC", "Bank IFSC", "IFSC_Code"],
                ),
                AttributeField::new("state", &["State"]),
                AttributeField::new("district", &["District"]),
                AttributeField::new("policeStation", &["Police Station", "PS Name", "PoliceStation"]),
                AttributeField::new("designation", &["Designation"]),
                AttributeField::new("mobileNumber", &["Mobile Number", "MobileNumber", "Mobile", "Phone"]),
                AttributeField::new("email", &["Email", "E-mail", "EmailID"]),
            ],
        }
    }
}

/// Read-only set of loaded profiles.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: HashMap<String, ColumnProfile>,
}

impl ProfileStore {
    /// Load every `*.json` profile in `dir`. A missing or empty directory
    /// yields a store holding only the built-in default profile.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut profiles = HashMap::new();

        if dir.exists() {
            for entry in std::fs::read_dir(dir)
                .with_context(|| format!("Failed to list profile directory: {:?}", dir))?
            {
                let path = entry?.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let profile = read_profile(&path)?;
                    info!("Loaded profile: {} from {:?}", profile.name, path);
                    profiles.insert(profile.name.clone(), profile);
                }
            }
        } else {
            warn!("Profile directory {:?} does not exist, using built-in profile", dir);
        }

        Ok(Self::from_profiles(profiles.into_values().collect()))
    }

    /// Build a store from profiles; the built-in default is added when none is named `default`.
    pub fn from_profiles(profiles: Vec<ColumnProfile>) -> Self {
        let mut map: HashMap<String, ColumnProfile> = profiles
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        map.entry(DEFAULT_PROFILE.to_string())
            .or_insert_with(ColumnProfile::default);

        Self { profiles: map }
    }

    /// Get a profile by name (returns clone).
    pub fn get(&self, name: &str) -> Option<ColumnProfile> {
        self.profiles.get(name).cloned()
    }

    /// List all available profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

fn read_profile(path: &Path) -> Result<ColumnProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {:?}", path))?;
    let profile: ColumnProfile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse profile: {:?}", path))?;
    if profile.account_aliases.is_empty() {
        anyhow::bail!("Profile {:?} declares no account aliases", path);
    }
    Ok(profile)
}

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub profile_dir: PathBuf,
    /// Uploads with more data rows than this are rejected before building.
    pub max_rows: usize,
    /// Nested hierarchy output is cut below this depth, at most `MAX_NEST_DEPTH`.
    pub max_depth: usize,
    /// Nested hierarchy output stops expanding after this many emitted nodes.
    pub max_nested_nodes: usize,
    /// Built flows kept in memory; the oldest is evicted beyond this.
    pub max_stored_flows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            profile_dir: PathBuf::from("configs"),
            max_rows: 100_000,
            max_depth: 256,
            max_nested_nodes: 200_000,
            max_stored_flows: 100,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut max_depth = env_or("FLOW_MAX_DEPTH", defaults.max_depth)?;
        if max_depth > MAX_NEST_DEPTH {
            warn!(
                "FLOW_MAX_DEPTH={} exceeds the ceiling, using {}",
                max_depth, MAX_NEST_DEPTH
            );
            max_depth = MAX_NEST_DEPTH;
        }
        Ok(Self {
            bind_addr: env_or("FLOW_BIND_ADDR", defaults.bind_addr)?,
            profile_dir: env_or("FLOW_PROFILE_DIR", defaults.profile_dir)?,
            max_rows: env_or("FLOW_MAX_ROWS", defaults.max_rows)?,
            max_depth,
            max_nested_nodes: env_or("FLOW_MAX_NESTED_NODES", defaults.max_nested_nodes)?,
            max_stored_flows: env_or("FLOW_MAX_STORED_FLOWS", defaults.max_stored_flows)?.max(1),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_default_matches_builtin() {
        let bundled: ColumnProfile =
            serde_json::from_str(include_str!("../configs/default.json")).unwrap();
        assert_eq!(bundled, ColumnProfile::default());
    }

    #[test]
    fn test_missing_dir_falls_back_to_default() {
        let store = ProfileStore::load_from_dir(Path::new("does/not/exist")).unwrap();
        assert_eq!(store.list(), vec!["default".to_string()]);
        assert_eq!(store.get("default").unwrap(), ColumnProfile::default());
    }

    #[test]
    fn test_from_profiles_keeps_custom_default() {
        let custom = ColumnProfile {
            account_aliases: vec!["Wallet".to_string()],
            ..ColumnProfile::default()
        };
        let other = ColumnProfile {
            name: "bank_x".to_string(),
            ..ColumnProfile::default()
        };
        let store = ProfileStore::from_profiles(vec![custom.clone(), other]);
        assert_eq!(store.list(), vec!["bank_x".to_string(), "default".to_string()]);
        assert_eq!(store.get("default").unwrap(), custom);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_profile_optional_fields_default() {
        let json = r#"{"name": "minimal", "account_aliases": ["Account"]}"#;
        let profile: ColumnProfile = serde_json::from_str(json).unwrap();
        assert!(profile.parent_aliases.is_empty());
        assert!(profile.attribute_fields.is_empty());
        assert_eq!(profile.description, "");
    }

    #[test]
    fn test_env_or_parses_and_defaults() {
        std::env::set_var("FLOW_TEST_ENV_OR_ROWS", " 42 ");
        let parsed: usize = env_or("FLOW_TEST_ENV_OR_ROWS", 7).unwrap();
        assert_eq!(parsed, 42);

        let fallback: usize = env_or("FLOW_TEST_ENV_OR_UNSET", 7).unwrap();
        assert_eq!(fallback, 7);

        std::env::set_var("FLOW_TEST_ENV_OR_BAD", "many");
        assert!(env_or::<usize>("FLOW_TEST_ENV_OR_BAD", 7).is_err());
    }

    #[test]
    fn test_depth_setting_is_clamped() {
        std::env::set_var("FLOW_MAX_DEPTH", "1000000");
        let settings = Settings::from_env().unwrap();
        std::env::remove_var("FLOW_MAX_DEPTH");
        assert_eq!(settings.max_depth, MAX_NEST_DEPTH);
    }
}
