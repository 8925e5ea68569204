use super::{exit_codes, write_file_if_missing};
use crate::cli::args::InitArgs;
use std::path::Path;

pub fn run(args: InitArgs, config_path: &Path) -> anyhow::Result<i32> {
    if config_path.exists() {
        eprintln!("note: {} already exists", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        promptfactory_core::config::write_sample_config(config_path)?;
        eprintln!("created {}", config_path.display());
    }

    if args.gitignore {
        write_file_if_missing(Path::new(".gitignore"), crate::templates::GITIGNORE)?;
    }

    Ok(exit_codes::OK)
}
