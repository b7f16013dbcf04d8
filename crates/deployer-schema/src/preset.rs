use crate::limit::ResourceLimit;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Overrides the preset directory when set.
pub const PRESET_DIR_ENV: &str = "DEPLOYER_PRESET_DIR";
const HOME_ENV: &str = "HOME";
const PRESET_SUBDIR: &str = ".deployer2";

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset error: environment variable ${0} is not set")]
    MissingEnv(&'static str),
    #[error("preset error: no preset for cluster '{cluster}' at {}", path.display())]
    NotFound { cluster: String, path: PathBuf },
    #[error("preset error: failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("preset error: failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("preset error: failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },
}

/// Static per-cluster configuration: registry, pull secrets, annotations,
/// resource defaults and client credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default)]
    pub registry: String,
    /// Annotations set on the workload itself.
    #[serde(default, deserialize_with = "scalar_strings")]
    pub annotations: BTreeMap<String, String>,
    /// Annotations set on the pod template.
    #[serde(default, deserialize_with = "scalar_strings")]
    pub template_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<ResourceLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<ResourceLimit>,
    #[serde(default, rename = "requestsCPU", skip_serializing_if = "Option::is_none")]
    pub requests_cpu: Option<String>,
    #[serde(default, rename = "requestsMEM", skip_serializing_if = "Option::is_none")]
    pub requests_mem: Option<String>,
    #[serde(default, rename = "limitsCPU", skip_serializing_if = "Option::is_none")]
    pub limits_cpu: Option<String>,
    #[serde(default, rename = "limitsMEM", skip_serializing_if = "Option::is_none")]
    pub limits_mem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerconfig: Option<Value>,
}

impl Preset {
    /// Load the preset for `cluster` from `dir`. A missing file is reported
    /// as [`PresetError::NotFound`], distinct from other read failures.
    pub fn load(dir: &Path, cluster: &str) -> Result<Self, PresetError> {
        let path = preset_path(dir, cluster);
        debug!("loading preset {}", path.display());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PresetError::NotFound {
                    cluster: cluster.to_owned(),
                    path,
                })
            }
            Err(source) => return Err(PresetError::Io { path, source }),
        };
        serde_yaml::from_str(&content).map_err(|source| PresetError::Parse { path, source })
    }

    /// Kubeconfig as YAML; empty when the preset carries none.
    pub fn kubeconfig_bytes(&self) -> Result<Vec<u8>, PresetError> {
        match &self.kubeconfig {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(config) => serde_yaml::to_string(config)
                .map(String::into_bytes)
                .map_err(|e| PresetError::Encode {
                    what: "kubeconfig",
                    message: e.to_string(),
                }),
        }
    }

    /// Docker client config as JSON; `{}` when the preset carries none.
    pub fn dockerconfig_bytes(&self) -> Result<Vec<u8>, PresetError> {
        match &self.dockerconfig {
            None | Some(Value::Null) => Ok(b"{}".to_vec()),
            Some(config) => serde_json::to_vec(config).map_err(|e| PresetError::Encode {
                what: "dockerconfig",
                message: e.to_string(),
            }),
        }
    }
}

/// Annotation values are strings on the wire; YAML numbers, booleans and
/// nulls are accepted in their plain text form.
fn scalar_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(de::Error::custom(format!(
                        "annotation '{key}' must be a scalar"
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}

pub fn preset_path(dir: &Path, cluster: &str) -> PathBuf {
    dir.join(format!("preset-{cluster}.yml"))
}

/// Preset directory from an explicit override or a home directory.
pub fn preset_dir_from(
    override_dir: Option<&str>,
    home: Option<&str>,
) -> Result<PathBuf, PresetError> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    match home.filter(|h| !h.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(PRESET_SUBDIR)),
        None => Err(PresetError::MissingEnv(HOME_ENV)),
    }
}

/// `$DEPLOYER_PRESET_DIR`, else `$HOME/.deployer2`.
pub fn default_preset_dir() -> Result<PathBuf, PresetError> {
    let override_dir = std::env::var(PRESET_DIR_ENV).ok();
    let home = std::env::var(HOME_ENV).ok();
    preset_dir_from(override_dir.as_deref(), home.as_deref())
}
