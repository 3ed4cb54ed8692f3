//! `geowatch config` - show the effective configuration.

use std::path::Path;

use geowatch::config::GeowatchConfig;

use crate::error::CliError;

/// Print the effective configuration as INI, or only the file location.
pub fn run(config: &GeowatchConfig, path: &Path, path_only: bool) -> Result<(), CliError> {
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }

    if path.exists() {
        println!("# Loaded from {}", path.display());
    } else {
        println!("# {} not found, showing defaults", path.display());
    }
    print!("{}", config.to_config_string());

    Ok(())
}
