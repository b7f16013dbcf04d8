use crate::images::ImageNames;
use crate::patch::{synthesize, PatchDocument, ResourceOverrides};
use crate::source::PresetSource;
use crate::CoreError;
use chrono::{DateTime, Utc};
use deployer_schema::{
    parse_manifest_file, EffectiveProfile, Manifest, Preset, RenderedArtifacts, ResourceLimit,
    WorkloadTarget,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Everything one run needs to know, already parsed.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub manifest_path: PathBuf,
    pub image: String,
    pub profile: String,
    pub build_id: Option<String>,
    pub targets: Vec<WorkloadTarget>,
    /// Command-level overrides, above the profile's own `cpu`/`mem`.
    pub cpu: Option<ResourceLimit>,
    pub mem: Option<ResourceLimit>,
}

/// Output of a full run, in target order.
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub profile: EffectiveProfile,
    pub artifacts: RenderedArtifacts,
    pub images: ImageNames,
    pub targets: Vec<TargetPlan>,
}

/// Per-target result: registry-qualified tags and the patch to apply.
#[derive(Debug, Clone, Serialize)]
pub struct TargetPlan {
    pub target: WorkloadTarget,
    pub images: ImageNames,
    pub patch: PatchDocument,
    /// Kept for credential staging; never serialized.
    #[serde(skip)]
    pub preset: Preset,
}

/// Resolves profiles, renders artifacts, and synthesizes per-target patches.
///
/// Holds the environment snapshot used for rendering so that repeated
/// renders within a run see identical input.
pub struct Planner<S> {
    source: S,
    env: BTreeMap<String, String>,
}

impl<S: PresetSource> Planner<S> {
    pub fn new(source: S, env: BTreeMap<String, String>) -> Self {
        Self { source, env }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Resolve `profile` and render both artifacts. Unresolved template
    /// references are logged, not fatal.
    pub fn render(
        &self,
        manifest: &Manifest,
        profile: &str,
    ) -> Result<(EffectiveProfile, RenderedArtifacts), CoreError> {
        info!("using profile '{profile}'");
        let effective = manifest.resolve(profile);
        let artifacts = effective.render(&self.env)?;
        for unresolved in artifacts.unresolved() {
            warn!(
                "profile '{}': {} line {} has an unresolved reference: {}",
                effective.name, unresolved.artifact, unresolved.line, unresolved.text
            );
        }
        Ok((effective, artifacts))
    }

    /// Load the target's preset, derive registry tags, and build its patch.
    pub fn plan_target(
        &self,
        target: &WorkloadTarget,
        images: &ImageNames,
        overrides: &ResourceOverrides,
        now: DateTime<Utc>,
    ) -> Result<TargetPlan, CoreError> {
        debug!("loading preset for cluster '{}'", target.cluster);
        let preset = self.source.load(&target.cluster)?;
        let images = images.derive(&preset.registry);
        let patch = synthesize(&preset, target, &images, overrides, now);
        Ok(TargetPlan {
            target: target.clone(),
            images,
            patch,
            preset,
        })
    }

    /// Run the whole pipeline. Targets are processed in order and the first
    /// failure aborts the run.
    pub fn plan(&self, request: &PlanRequest) -> Result<DeployPlan, CoreError> {
        info!("manifest: {}", request.manifest_path.display());
        let manifest = parse_manifest_file(&request.manifest_path)?;
        let (profile, artifacts) = self.render(&manifest, &request.profile)?;

        let images = ImageNames::build(
            &request.image,
            &request.profile,
            request.build_id.as_deref(),
        );
        info!("image tags: {images}");

        let overrides = ResourceOverrides {
            cpu: request.cpu,
            mem: request.mem,
        }
        .or(ResourceOverrides {
            cpu: profile.cpu,
            mem: profile.mem,
        });

        let mut targets = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            info!("planning {target}");
            targets.push(self.plan_target(target, &images, &overrides, Utc::now())?);
        }

        Ok(DeployPlan {
            profile,
            artifacts,
            images,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticPresetSource;
    use chrono::TimeZone;
    use deployer_schema::{parse_manifest_str, parse_target, ManifestFormat};

    fn source() -> StaticPresetSource {
        StaticPresetSource::new().with(
            "prod",
            Preset {
                registry: "reg.io/team".to_owned(),
                cpu: Some(ResourceLimit { min: 100, max: 0 }),
                ..Preset::default()
            },
        )
    }

    #[test]
    fn plan_target_uses_registry_qualified_primary() {
        let planner = Planner::new(source(), BTreeMap::new());
        let images = ImageNames::build("svc", "prod", Some("9"));
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let plan = planner
            .plan_target(
                &parse_target("prod/web/deployment/api").unwrap(),
                &images,
                &ResourceOverrides::default(),
                now,
            )
            .unwrap();
        assert_eq!(plan.images.primary(), "reg.io/team/svc:prod-build-9");
        let container = &plan.patch.spec.template.spec.containers[0];
        assert_eq!(container.image, "reg.io/team/svc:prod-build-9");
        let resources = container.resources.as_ref().unwrap();
        assert_eq!(resources.requests.cpu.as_deref(), Some("100m"));
    }

    #[test]
    fn plan_target_fails_for_unknown_cluster() {
        let planner = Planner::new(source(), BTreeMap::new());
        let err = planner
            .plan_target(
                &parse_target("staging/web/deployment/api").unwrap(),
                &ImageNames::build("svc", "prod", None),
                &ResourceOverrides::default(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Preset(deployer_schema::PresetError::NotFound { .. })
        ));
    }

    #[test]
    fn render_uses_planner_environment() {
        let manifest = parse_manifest_str(
            "version: 2\ndefault:\n  package:\n    - \"FROM base:{{ .Env.TAG }}\"\n",
            ManifestFormat::Yaml,
        )
        .unwrap();
        let env = BTreeMap::from([("TAG".to_owned(), "1.2".to_owned())]);
        let planner = Planner::new(source(), env);
        let (profile, artifacts) = planner.render(&manifest, "dev").unwrap();
        assert_eq!(profile.name, "dev");
        assert_eq!(artifacts.package, "FROM base:1.2");
    }
}
