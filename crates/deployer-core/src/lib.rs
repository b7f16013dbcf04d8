//! Image tagging, resource resolution, patch synthesis, and run planning for deployer.
//!
//! This crate ties the schema layer together: `ImageNames` computes the tags
//! to build and push, `synthesize` turns a preset, a workload target and a
//! tag set into a `PatchDocument`, and the `Planner` drives a whole run
//! (manifest → rendered artifacts → per-target patches) behind a
//! `PresetSource` seam.

pub mod images;
pub mod patch;
pub mod plan;
pub mod source;

pub use images::ImageNames;
pub use patch::{
    resolve_resources, synthesize, Container, InitContainer, PatchDocument, ResourceList,
    ResourceOverrides, ResourceRequirements, SecretReference, PULL_POLICY_ALWAYS,
    TIMESTAMP_ANNOTATION,
};
pub use plan::{DeployPlan, PlanRequest, Planner, TargetPlan};
pub use source::{DirPresetSource, HomePresetSource, PresetSource, StaticPresetSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Manifest(#[from] deployer_schema::ManifestError),
    #[error(transparent)]
    Render(#[from] deployer_schema::RenderError),
    #[error(transparent)]
    Preset(#[from] deployer_schema::PresetError),
}
