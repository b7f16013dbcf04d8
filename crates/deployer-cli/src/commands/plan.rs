use super::render::{write_build_script, BUILD_SCRIPT_FILE, PACKAGE_RECIPE_FILE};
use super::{json_pretty, planner, write_file, write_private_file, EXIT_SUCCESS};
use deployer_core::{ImageNames, PlanRequest, TargetPlan};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TAGS_FILE: &str = "tags.txt";
pub const PATCH_FILE: &str = "patch.json";
pub const KUBECONFIG_FILE: &str = "kubeconfig.yml";
pub const DOCKER_CONFIG_FILE: &str = "docker/config.json";
pub const PLAN_FILE: &str = "plan.json";
pub const TARGETS_DIR: &str = "targets";

pub fn run(
    request: &PlanRequest,
    preset_dir: Option<&Path>,
    out: &Path,
    json: bool,
) -> Result<u8, String> {
    let plan = planner(preset_dir)
        .plan(request)
        .map_err(|e| e.to_string())?;

    std::fs::create_dir_all(out)
        .map_err(|e| format!("failed to create {}: {e}", out.display()))?;
    write_build_script(&out.join(BUILD_SCRIPT_FILE), &plan.artifacts.build)?;
    write_file(&out.join(PACKAGE_RECIPE_FILE), plan.artifacts.package.as_bytes())?;
    write_file(&out.join(TAGS_FILE), tags_text(&plan.images).as_bytes())?;

    // Target directories are numbered per run; drop any left by an earlier one.
    let targets_root = out.join(TARGETS_DIR);
    if targets_root.exists() {
        std::fs::remove_dir_all(&targets_root)
            .map_err(|e| format!("failed to clear {}: {e}", targets_root.display()))?;
    }

    let mut target_dirs = Vec::with_capacity(plan.targets.len());
    for (index, target) in plan.targets.iter().enumerate() {
        let dir = out.join(target_dir_name(index, target));
        write_target(&dir, target)?;
        target_dirs.push(dir);
    }

    write_file(&out.join(PLAN_FILE), json_pretty(&plan)?.as_bytes())?;

    if json {
        let payload = serde_json::json!({
            "out": out.display().to_string(),
            "profile": plan.profile.name,
            "images": plan.images,
            "targets": target_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("plan written to {}", out.display());
        for (target, dir) in plan.targets.iter().zip(&target_dirs) {
            println!("  {} -> {}", target.target, dir.display());
        }
    }
    Ok(EXIT_SUCCESS)
}

/// `targets/NN-cluster-namespace-kind-name-container`, numbered in run order.
pub fn target_dir_name(index: usize, target: &TargetPlan) -> PathBuf {
    let t = &target.target;
    PathBuf::from(TARGETS_DIR).join(format!(
        "{:02}-{}-{}-{}-{}-{}",
        index + 1,
        t.cluster,
        t.namespace,
        t.kind,
        t.name,
        t.container
    ))
}

fn tags_text(images: &ImageNames) -> String {
    let mut text = String::new();
    for tag in images.iter() {
        text.push_str(tag);
        text.push('\n');
    }
    text
}

fn write_target(dir: &Path, target: &TargetPlan) -> Result<(), String> {
    debug!("writing artifacts for {} to {}", target.target, dir.display());
    let patch = target
        .patch
        .to_json()
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    write_file(&dir.join(PATCH_FILE), patch.as_bytes())?;
    write_file(&dir.join(TAGS_FILE), tags_text(&target.images).as_bytes())?;
    let kubeconfig = target
        .preset
        .kubeconfig_bytes()
        .map_err(|e| e.to_string())?;
    write_private_file(&dir.join(KUBECONFIG_FILE), &kubeconfig)?;
    let dockerconfig = target
        .preset
        .dockerconfig_bytes()
        .map_err(|e| e.to_string())?;
    write_private_file(&dir.join(DOCKER_CONFIG_FILE), &dockerconfig)?;
    Ok(())
}
