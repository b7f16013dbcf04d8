use deployer_schema::{default_preset_dir, Preset, PresetError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Supplies the preset for a cluster.
pub trait PresetSource {
    fn load(&self, cluster: &str) -> Result<Preset, PresetError>;
}

/// Reads `preset-<cluster>.yml` from a fixed directory.
#[derive(Debug, Clone)]
pub struct DirPresetSource {
    dir: PathBuf,
}

impl DirPresetSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl PresetSource for DirPresetSource {
    fn load(&self, cluster: &str) -> Result<Preset, PresetError> {
        Preset::load(&self.dir, cluster)
    }
}

/// Resolves the preset directory from the environment on every load, so a
/// missing `$HOME` only fails runs that actually need a preset.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomePresetSource;

impl PresetSource for HomePresetSource {
    fn load(&self, cluster: &str) -> Result<Preset, PresetError> {
        Preset::load(&default_preset_dir()?, cluster)
    }
}

/// In-memory presets keyed by cluster name.
#[derive(Debug, Clone, Default)]
pub struct StaticPresetSource {
    presets: BTreeMap<String, Preset>,
}

impl StaticPresetSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, cluster: &str, preset: Preset) -> Self {
        self.presets.insert(cluster.to_owned(), preset);
        self
    }
}

impl PresetSource for StaticPresetSource {
    fn load(&self, cluster: &str) -> Result<Preset, PresetError> {
        self.presets
            .get(cluster)
            .cloned()
            .ok_or_else(|| PresetError::NotFound {
                cluster: cluster.to_owned(),
                path: PathBuf::from(format!("<memory>/{cluster}")),
            })
    }
}
