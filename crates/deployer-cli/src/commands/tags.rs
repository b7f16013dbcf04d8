use super::{json_pretty, EXIT_SUCCESS};
use deployer_core::ImageNames;

pub fn run(
    image: &str,
    profile: &str,
    build_id: Option<&str>,
    registry: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let images = ImageNames::build(image, profile, build_id);
    let images = match registry {
        Some(registry) => images.derive(registry),
        None => images,
    };

    if json {
        let payload = serde_json::json!({
            "primary": images.primary(),
            "tags": images,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for tag in images.iter() {
            println!("{tag}");
        }
    }
    Ok(EXIT_SUCCESS)
}
