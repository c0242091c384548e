//! Config Command
//!
//! Inspect and initialize configuration files.

use crate::cli::ui::Output;
use crate::cli::util::OutputFormat;
use crate::config::{Config, ConfigLoader};
use crate::types::Result;

pub fn show(config: &Config, format: OutputFormat) -> Result<()> {
    ConfigLoader::show_config(config, format == OutputFormat::Json)
}

pub fn path() {
    ConfigLoader::show_path();
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    Output::new().success(&format!("Configuration ready at {}", path.display()));
    Ok(())
}
