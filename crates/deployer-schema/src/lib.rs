//! Manifest parsing, profile resolution, templating, and option codecs for deployer.
//!
//! This crate defines the schema layer: manifest parsing with inline profiles
//! (`Manifest`), profile merging and build/package artifact rendering
//! (`EffectiveProfile`), the template engine, `MIN:MAX` resource limits
//! (`ResourceLimit`), workload target addresses (`WorkloadTarget`), and
//! per-cluster presets (`Preset`).

pub mod limit;
pub mod manifest;
pub mod preset;
pub mod profile;
pub mod target;
pub mod template;

pub use limit::{parse_limit, LimitError, ResourceLimit, CPU_CEILING, MEM_CEILING};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, Manifest, ManifestError, ManifestFormat, Profile,
    MANIFEST_VERSION,
};
pub use preset::{default_preset_dir, preset_dir_from, preset_path, Preset, PresetError};
pub use profile::{
    ArtifactKind, EffectiveProfile, RenderError, RenderedArtifacts, UnresolvedLine,
    BUILD_PREAMBLE,
};
pub use target::{normalize_segment, parse_target, TargetError, WorkloadKind, WorkloadTarget};
pub use template::{env_snapshot, render, RenderContext, TemplateError, UNRESOLVED};
