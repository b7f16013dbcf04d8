use super::{json_pretty, planner, write_file, EXIT_SUCCESS};
use deployer_schema::parse_manifest_file;
use std::path::Path;

pub const BUILD_SCRIPT_FILE: &str = "build.sh";
pub const PACKAGE_RECIPE_FILE: &str = "package.dockerfile";

pub fn run(manifest: &Path, profile: &str, out: Option<&Path>, json: bool) -> Result<u8, String> {
    let parsed = parse_manifest_file(manifest).map_err(|e| e.to_string())?;
    let (effective, artifacts) = planner(None)
        .render(&parsed, profile)
        .map_err(|e| e.to_string())?;

    if let Some(dir) = out {
        write_build_script(&dir.join(BUILD_SCRIPT_FILE), &artifacts.build)?;
        write_file(&dir.join(PACKAGE_RECIPE_FILE), artifacts.package.as_bytes())?;
    }

    if json {
        let payload = serde_json::json!({
            "profile": effective.name,
            "build": artifacts.build,
            "package": artifacts.package,
            "unresolved": artifacts.unresolved(),
            "out": out.map(|d| d.display().to_string()),
        });
        println!("{}", json_pretty(&payload)?);
    } else if let Some(dir) = out {
        println!(
            "wrote {} and {} to {}",
            BUILD_SCRIPT_FILE,
            PACKAGE_RECIPE_FILE,
            dir.display()
        );
    } else {
        println!("# {BUILD_SCRIPT_FILE}");
        print!("{}", artifacts.build);
        println!("# {PACKAGE_RECIPE_FILE}");
        println!("{}", artifacts.package);
    }
    Ok(EXIT_SUCCESS)
}

/// Write the build script, executable on unix.
pub fn write_build_script(path: &Path, script: &str) -> Result<(), String> {
    write_file(path, script.as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| format!("failed to chmod {}: {e}", path.display()))?;
    }
    Ok(())
}
