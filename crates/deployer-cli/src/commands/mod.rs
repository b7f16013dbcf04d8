pub mod completions;
pub mod man_pages;
pub mod patch;
pub mod plan;
pub mod render;
pub mod tags;

use crate::{JobArgs, TargetArgs};
use deployer_core::{DirPresetSource, HomePresetSource, PlanRequest, Planner, PresetSource};
use deployer_schema::{env_snapshot, parse_limit, parse_target, Preset, PresetError};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_PRESET_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Split `$JOB_NAME` into `(image, profile)`. Only `image.profile` with both
/// parts non-empty is usable.
pub fn split_job_name(job_name: &str) -> Option<(&str, &str)> {
    let mut parts = job_name.trim().split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(image), Some(profile), None) if !image.is_empty() && !profile.is_empty() => {
            Some((image, profile))
        }
        _ => None,
    }
}

pub fn resolve_profile(profile: Option<String>, job_name: Option<&str>) -> Result<String, String> {
    if let Some(profile) = profile.filter(|p| !p.trim().is_empty()) {
        return Ok(profile);
    }
    job_name
        .and_then(split_job_name)
        .map(|(_, profile)| profile.to_owned())
        .ok_or_else(|| "no --profile given and $JOB_NAME is not 'image.profile'".to_owned())
}

pub fn resolve_job(
    image: Option<String>,
    profile: Option<String>,
    job_name: Option<&str>,
) -> Result<(String, String), String> {
    let from_job = job_name.and_then(split_job_name);
    let image = image
        .filter(|i| !i.trim().is_empty())
        .or_else(|| from_job.map(|(i, _)| i.to_owned()))
        .ok_or_else(|| "no --image given and $JOB_NAME is not 'image.profile'".to_owned())?;
    let profile = profile
        .filter(|p| !p.trim().is_empty())
        .or_else(|| from_job.map(|(_, p)| p.to_owned()))
        .ok_or_else(|| "no --profile given and $JOB_NAME is not 'image.profile'".to_owned())?;
    Ok((image, profile))
}

/// Turn command-line arguments into a fully parsed [`PlanRequest`].
pub fn build_request(
    manifest: PathBuf,
    job: JobArgs,
    targets: &TargetArgs,
    job_name: Option<&str>,
) -> Result<PlanRequest, String> {
    let (image, profile) = resolve_job(job.image, job.profile, job_name)?;
    let workloads = targets
        .workloads
        .iter()
        .map(|w| parse_target(w).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let cpu = targets
        .cpu
        .as_deref()
        .map(parse_limit)
        .transpose()
        .map_err(|e| format!("--cpu: {e}"))?;
    let mem = targets
        .mem
        .as_deref()
        .map(parse_limit)
        .transpose()
        .map_err(|e| format!("--mem: {e}"))?;
    Ok(PlanRequest {
        manifest_path: manifest,
        image,
        profile,
        build_id: job.build_id.filter(|b| !b.trim().is_empty()),
        targets: workloads,
        cpu,
        mem,
    })
}

/// Preset lookup chosen on the command line: an explicit `--preset-dir`, or
/// the home-directory default.
pub enum CliPresetSource {
    Dir(DirPresetSource),
    Home(HomePresetSource),
}

impl CliPresetSource {
    pub fn new(preset_dir: Option<&Path>) -> Self {
        match preset_dir {
            Some(dir) => Self::Dir(DirPresetSource::new(dir)),
            None => Self::Home(HomePresetSource),
        }
    }
}

impl PresetSource for CliPresetSource {
    fn load(&self, cluster: &str) -> Result<Preset, PresetError> {
        match self {
            Self::Dir(source) => source.load(cluster),
            Self::Home(source) => source.load(cluster),
        }
    }
}

pub fn planner(preset_dir: Option<&Path>) -> Planner<CliPresetSource> {
    Planner::new(CliPresetSource::new(preset_dir), env_snapshot())
}

pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, contents).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// Write a file only its owner can read, for credentials. On unix the mode
/// is 0600 even when the file already existed with wider permissions.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        if path.exists() {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| format!("failed to chmod {}: {e}", path.display()))?;
        }
    }
    let mut file = options
        .open(path)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    file.write_all(contents)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(workloads: &[&str]) -> TargetArgs {
        TargetArgs {
            workloads: workloads.iter().map(|w| (*w).to_owned()).collect(),
            cpu: None,
            mem: None,
            preset_dir: None,
        }
    }

    fn job(image: Option<&str>, profile: Option<&str>) -> JobArgs {
        JobArgs {
            image: image.map(str::to_owned),
            profile: profile.map(str::to_owned),
            build_id: None,
        }
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn split_job_name_requires_two_parts() {
        assert_eq!(split_job_name("api.prod"), Some(("api", "prod")));
        assert_eq!(split_job_name("api"), None);
        assert_eq!(split_job_name("a.b.c"), None);
        assert_eq!(split_job_name(".prod"), None);
    }

    #[test]
    fn resolve_profile_prefers_flag() {
        assert_eq!(
            resolve_profile(Some("dev".to_owned()), Some("api.prod")).unwrap(),
            "dev"
        );
        assert_eq!(resolve_profile(None, Some("api.prod")).unwrap(), "prod");
        assert!(resolve_profile(None, None).is_err());
    }

    #[test]
    fn resolve_job_mixes_flag_and_job_name() {
        let (image, profile) =
            resolve_job(Some("web".to_owned()), None, Some("api.prod")).unwrap();
        assert_eq!(image, "web");
        assert_eq!(profile, "prod");
    }

    #[test]
    fn resolve_job_without_sources_fails() {
        let err = resolve_job(None, Some("prod".to_owned()), Some("broken")).unwrap_err();
        assert!(err.contains("--image"));
    }

    #[test]
    fn build_request_parses_targets_and_limits() {
        let mut t = targets(&["prod/web/deploy/api/main!"]);
        t.cpu = Some("100:-".to_owned());
        let mut j = job(Some("api"), Some("prod"));
        j.build_id = Some("  ".to_owned());
        let request = build_request(PathBuf::from("deployer.yml"), j, &t, None).unwrap();
        assert_eq!(request.targets.len(), 1);
        assert!(request.targets[0].is_init);
        assert_eq!(request.targets[0].kind.as_str(), "deployment");
        assert_eq!(request.cpu.unwrap().min, 100);
        assert!(request.build_id.is_none());
    }

    #[test]
    fn build_request_reports_bad_workload() {
        let err = build_request(
            PathBuf::from("deployer.yml"),
            job(Some("api"), Some("prod")),
            &targets(&["prod/web"]),
            None,
        )
        .unwrap_err();
        assert!(err.starts_with("invalid workload 'prod/web'"));
    }

    #[test]
    fn build_request_reports_bad_limit() {
        let mut t = targets(&[]);
        t.mem = Some("abc".to_owned());
        let err = build_request(
            PathBuf::from("deployer.yml"),
            job(Some("api"), Some("prod")),
            &t,
            None,
        )
        .unwrap_err();
        assert!(err.starts_with("--mem: invalid resource limit"));
    }

    #[test]
    fn write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        write_file(&path, b"hello").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn private_file_is_owner_only_even_when_overwritten() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds/config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_private_file(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_MANIFEST_ERROR);
        assert_ne!(EXIT_MANIFEST_ERROR, EXIT_PRESET_ERROR);
    }
}
