use super::completions::BIN_NAME;
use super::EXIT_SUCCESS;
use clap::CommandFactory;
use std::path::Path;

fn render_page(cmd: clap::Command, dir: &Path, file: &str) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed: {e}"))?;
    let path = dir.join(file);
    std::fs::write(&path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    let cmd = C::command();
    render_page(cmd.clone(), dir, &format!("{BIN_NAME}.1"))?;
    for sub in cmd.get_subcommands() {
        render_page(sub.clone(), dir, &format!("{BIN_NAME}-{}.1", sub.get_name()))?;
    }
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}
