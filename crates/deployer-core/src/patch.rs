//! Strategic-merge patch documents for workload resources.
//!
//! Field presence follows an omit-when-empty policy, except for annotation
//! mappings which are always emitted: an empty mapping there means "replace
//! with empty", which differs from "no change".

use crate::images::ImageNames;
use chrono::{DateTime, SecondsFormat, Utc};
use deployer_schema::{Preset, ResourceLimit, WorkloadTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pod-template annotation carrying the synthesis time, forcing a rollout.
pub const TIMESTAMP_ANNOTATION: &str = "net.guoyk.deployer/timestamp";
pub const PULL_POLICY_ALWAYS: &str = "Always";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDocument {
    pub metadata: PatchMetadata,
    pub spec: WorkloadSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMetadata {
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub template: PodTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub metadata: PatchMetadata,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<InitContainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<SecretReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Init containers never carry a resources section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitContainer {
    pub image: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub limits: ResourceList,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub requests: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceList {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

impl ResourceRequirements {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Resource limits supplied above the cluster preset. Each dimension is
/// resolved on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceOverrides {
    pub cpu: Option<ResourceLimit>,
    pub mem: Option<ResourceLimit>,
}

impl ResourceOverrides {
    /// Layer `self` over `lower`; `self` wins per dimension.
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            cpu: self.cpu.or(lower.cpu),
            mem: self.mem.or(lower.mem),
        }
    }
}

/// Resolve container resources: an override limit, else the preset's limit,
/// else the preset's raw quantity strings. `None` when nothing resolved.
pub fn resolve_resources(
    preset: &Preset,
    overrides: &ResourceOverrides,
) -> Option<ResourceRequirements> {
    let mut resources = ResourceRequirements::default();

    if let Some(limit) = overrides.cpu.or(preset.cpu) {
        let (request, limit) = limit.encode_cpu();
        resources.requests.cpu = Some(request);
        resources.limits.cpu = Some(limit);
    } else {
        resources.requests.cpu = quantity(preset.requests_cpu.as_deref());
        resources.limits.cpu = quantity(preset.limits_cpu.as_deref());
    }

    if let Some(limit) = overrides.mem.or(preset.mem) {
        let (request, limit) = limit.encode_mem();
        resources.requests.memory = Some(request);
        resources.limits.memory = Some(limit);
    } else {
        resources.requests.memory = quantity(preset.requests_mem.as_deref());
        resources.limits.memory = quantity(preset.limits_mem.as_deref());
    }

    (!resources.is_empty()).then_some(resources)
}

fn quantity(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|q| !q.is_empty()).map(str::to_owned)
}

/// Build the patch for one workload target.
///
/// `images` should already be registry-qualified; its primary tag becomes the
/// container image.
pub fn synthesize(
    preset: &Preset,
    target: &WorkloadTarget,
    images: &ImageNames,
    overrides: &ResourceOverrides,
    now: DateTime<Utc>,
) -> PatchDocument {
    let mut patch = PatchDocument::default();
    patch.metadata.annotations = preset.annotations.clone();

    let template = &mut patch.spec.template;
    template.metadata.annotations = preset.template_annotations.clone();
    template.metadata.annotations.insert(
        TIMESTAMP_ANNOTATION.to_owned(),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    template.spec.image_pull_secrets = preset
        .image_pull_secrets
        .iter()
        .map(|name| SecretReference {
            name: name.trim().to_owned(),
        })
        .collect();

    if target.is_init {
        template.spec.init_containers.push(InitContainer {
            image: images.primary().to_owned(),
            name: target.container.clone(),
            image_pull_policy: PULL_POLICY_ALWAYS.to_owned(),
        });
    } else {
        template.spec.containers.push(Container {
            image: images.primary().to_owned(),
            name: target.container.clone(),
            image_pull_policy: PULL_POLICY_ALWAYS.to_owned(),
            resources: resolve_resources(preset, overrides),
        });
    }

    patch
}

impl PatchDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use deployer_schema::parse_target;
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap()
    }

    fn images() -> ImageNames {
        ImageNames::build("svc", "prod", Some("42")).derive("reg.io/team")
    }

    fn limit(min: i64, max: i64) -> ResourceLimit {
        ResourceLimit { min, max }
    }

    fn to_value(patch: &PatchDocument) -> Value {
        serde_json::from_str(&patch.to_json().unwrap()).unwrap()
    }

    #[test]
    fn regular_container_without_limits_has_no_resources_key() {
        let target = parse_target("prod/web/deployment/api").unwrap();
        let patch = synthesize(
            &Preset::default(),
            &target,
            &images(),
            &ResourceOverrides::default(),
            now(),
        );
        assert_eq!(
            to_value(&patch),
            json!({
                "metadata": {"annotations": {}},
                "spec": {"template": {
                    "metadata": {"annotations": {
                        "net.guoyk.deployer/timestamp": "2026-03-14T15:09:26Z"
                    }},
                    "spec": {"containers": [{
                        "image": "reg.io/team/svc:prod-build-42",
                        "name": "api",
                        "imagePullPolicy": "Always"
                    }]}
                }}
            })
        );
    }

    #[test]
    fn init_container_never_has_resources() {
        let target = parse_target("prod/web/deployment/api/migrate!").unwrap();
        let preset = Preset {
            cpu: Some(limit(100, 200)),
            requests_mem: Some("64Mi".to_owned()),
            ..Preset::default()
        };
        let overrides = ResourceOverrides {
            cpu: Some(limit(500, 0)),
            mem: Some(limit(256, 512)),
        };
        let patch = synthesize(&preset, &target, &images(), &overrides, now());
        let value = to_value(&patch);
        let spec = &value["spec"]["template"]["spec"];
        assert!(spec.get("containers").is_none());
        assert_eq!(
            spec["initContainers"],
            json!([{
                "image": "reg.io/team/svc:prod-build-42",
                "name": "migrate",
                "imagePullPolicy": "Always"
            }])
        );
        assert!(!patch.to_json().unwrap().contains("resources"));
    }

    #[test]
    fn override_beats_preset_limit() {
        let target = parse_target("prod/web/deployment/api").unwrap();
        let preset = Preset {
            cpu: Some(limit(100, 200)),
            mem: Some(limit(64, 0)),
            ..Preset::default()
        };
        let overrides = ResourceOverrides {
            cpu: Some(limit(500, 0)),
            mem: None,
        };
        let patch = synthesize(&preset, &target, &images(), &overrides, now());
        let resources = patch.spec.template.spec.containers[0]
            .resources
            .clone()
            .unwrap();
        assert_eq!(resources.requests.cpu.as_deref(), Some("500m"));
        assert_eq!(resources.limits.cpu.as_deref(), Some("999"));
        assert_eq!(resources.requests.memory.as_deref(), Some("64Mi"));
        assert_eq!(resources.limits.memory.as_deref(), Some("999Gi"));
    }

    #[test]
    fn layered_overrides_prefer_upper_tier() {
        let command = ResourceOverrides {
            cpu: Some(limit(1, 2)),
            mem: None,
        };
        let profile = ResourceOverrides {
            cpu: Some(limit(3, 4)),
            mem: Some(limit(5, 6)),
        };
        assert_eq!(
            command.or(profile),
            ResourceOverrides {
                cpu: Some(limit(1, 2)),
                mem: Some(limit(5, 6)),
            }
        );
    }

    #[test]
    fn raw_preset_quantities_are_used_verbatim() {
        let preset = Preset {
            requests_cpu: Some(" 250m ".to_owned()),
            limits_cpu: Some("1".to_owned()),
            limits_mem: Some("".to_owned()),
            ..Preset::default()
        };
        let resources = resolve_resources(&preset, &ResourceOverrides::default()).unwrap();
        assert_eq!(
            resources,
            ResourceRequirements {
                limits: ResourceList {
                    cpu: Some("1".to_owned()),
                    memory: None,
                },
                requests: ResourceList {
                    cpu: Some("250m".to_owned()),
                    memory: None,
                },
            }
        );
    }

    #[test]
    fn preset_limit_object_beats_raw_quantities() {
        let preset = Preset {
            mem: Some(limit(128, 256)),
            requests_mem: Some("1Gi".to_owned()),
            ..Preset::default()
        };
        let resources = resolve_resources(&preset, &ResourceOverrides::default()).unwrap();
        assert_eq!(resources.requests.memory.as_deref(), Some("128Mi"));
        assert_eq!(resources.limits.memory.as_deref(), Some("256Mi"));
        assert!(resources.requests.cpu.is_none());
    }

    #[test]
    fn nothing_resolved_is_none() {
        assert!(resolve_resources(&Preset::default(), &ResourceOverrides::default()).is_none());
    }

    #[test]
    fn pull_secrets_trimmed_in_order_and_annotations_merged() {
        let target = parse_target("prod/web/sts/db").unwrap();
        let preset = Preset {
            annotations: BTreeMap::from([("team".to_owned(), "core".to_owned())]),
            template_annotations: BTreeMap::from([
                ("sidecar".to_owned(), "off".to_owned()),
                (TIMESTAMP_ANNOTATION.to_owned(), "stale".to_owned()),
            ]),
            image_pull_secrets: vec![" zeta ".to_owned(), "alpha".to_owned()],
            ..Preset::default()
        };
        let patch = synthesize(&preset, &target, &images(), &ResourceOverrides::default(), now());
        assert_eq!(patch.metadata.annotations["team"], "core");
        let template = &patch.spec.template;
        assert_eq!(template.metadata.annotations["sidecar"], "off");
        assert_eq!(
            template.metadata.annotations[TIMESTAMP_ANNOTATION],
            "2026-03-14T15:09:26Z"
        );
        let names: Vec<_> = template
            .spec
            .image_pull_secrets
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn json_round_trip_preserves_presence() {
        let target = parse_target("prod/web/deployment/api").unwrap();
        let preset = Preset {
            image_pull_secrets: vec!["regcred".to_owned()],
            mem: Some(limit(64, 0)),
            ..Preset::default()
        };
        let patch = synthesize(&preset, &target, &images(), &ResourceOverrides::default(), now());
        let json = patch.to_json().unwrap();
        let parsed = PatchDocument::from_json(&json).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.to_json().unwrap(), json);
        assert!(!json.contains("initContainers"));
        assert!(!json.contains("\"cpu\""));
        assert!(json.contains("\"imagePullSecrets\":[{\"name\":\"regcred\"}]"));
    }
}
