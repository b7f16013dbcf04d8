use crate::limit::ResourceLimit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// The only manifest schema version this crate understands.
pub const MANIFEST_VERSION: i64 = 2;

const VERSION_KEY: &str = "version";
const DEFAULT_KEY: &str = "default";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("manifest error: 'version' must be an integer, got {0}")]
    InvalidVersion(String),
    #[error("manifest error: profile '{name}' is invalid: {source}")]
    InvalidProfile {
        name: String,
        source: serde_json::Error,
    },
    #[error("manifest error: unsupported version {0}, expected 2")]
    UnsupportedVersion(i64),
}

/// Serialization format of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Toml,
}

impl ManifestFormat {
    /// `.toml` files are TOML, everything else is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// A named set of build lines, package lines, template variables and
/// optional resource overrides. Never used directly: see
/// [`Manifest::resolve`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub package: Vec<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<ResourceLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<ResourceLimit>,
}

/// A parsed build manifest: a schema version, a `default` profile, and every
/// other top-level key as a named profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: i64,
    pub default: Profile,
    pub profiles: BTreeMap<String, Profile>,
}

impl Manifest {
    /// The profile stored under `name`, or an empty profile when absent.
    pub fn lookup(&self, name: &str) -> Profile {
        self.profiles.get(name).cloned().unwrap_or_default()
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

pub fn parse_manifest_str(input: &str, format: ManifestFormat) -> Result<Manifest, ManifestError> {
    let mut root: Map<String, Value> = match format {
        ManifestFormat::Yaml => serde_yaml::from_str(input)?,
        ManifestFormat::Toml => toml::from_str(input)?,
    };

    // Known keys first, so a version mismatch is reported before any
    // profile shape errors from a foreign schema.
    let version = match root.remove(VERSION_KEY) {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ManifestError::InvalidVersion(n.to_string()))?,
        Some(other) => return Err(ManifestError::InvalidVersion(other.to_string())),
    };
    if version != MANIFEST_VERSION {
        return Err(ManifestError::UnsupportedVersion(version));
    }

    let default = match root.remove(DEFAULT_KEY) {
        Some(value) => decode_profile(DEFAULT_KEY, value)?,
        None => Profile {
            name: DEFAULT_KEY.to_owned(),
            ..Profile::default()
        },
    };

    let profiles = root
        .into_iter()
        .map(|(name, value)| {
            let profile = decode_profile(&name, value)?;
            Ok((name, profile))
        })
        .collect::<Result<BTreeMap<_, _>, ManifestError>>()?;

    Ok(Manifest {
        version,
        default,
        profiles,
    })
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = parse_manifest_str(&content, ManifestFormat::from_path(path))?;
    debug!(
        "loaded manifest {} with {} profile(s)",
        path.display(),
        manifest.profiles.len()
    );
    Ok(manifest)
}

fn decode_profile(name: &str, value: Value) -> Result<Profile, ManifestError> {
    let mut profile = match value {
        Value::Null => Profile::default(),
        value => serde_json::from_value(value).map_err(|source| ManifestError::InvalidProfile {
            name: name.to_owned(),
            source,
        })?,
    };
    profile.name = name.to_owned();
    Ok(profile)
}
