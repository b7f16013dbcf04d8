use super::{json_pretty, planner, EXIT_SUCCESS};
use deployer_core::PlanRequest;
use std::path::Path;

pub fn run(request: &PlanRequest, preset_dir: Option<&Path>, json: bool) -> Result<u8, String> {
    if request.targets.is_empty() {
        return Err("no --workload given".to_owned());
    }
    let plan = planner(preset_dir)
        .plan(request)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&plan.targets)?);
    } else {
        for target in &plan.targets {
            let body = target
                .patch
                .to_json()
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("# {}", target.target);
            println!("{body}");
        }
    }
    Ok(EXIT_SUCCESS)
}
