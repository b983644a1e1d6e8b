use crate::config::Config;
use crate::gml_parser;
use crate::topology::Topology;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open config file {:?}", config_path))?;
    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse config file {:?}", config_path))?;

    config.validate()?;
    info!(
        "Configuration has {} flows, topology at {}",
        config.flows.len(),
        config.network.path
    );

    Ok(config)
}

/// Topology file location; relative paths are taken from the config file's
/// directory
pub fn topology_path(config: &Config, config_path: &Path) -> PathBuf {
    let path = Path::new(&config.network.path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Load the topology the configuration points at
pub fn load_topology(config: &Config, config_path: &Path) -> Result<Topology> {
    let path = topology_path(config, config_path);
    info!("Loading topology from: {:?}", path);
    gml_parser::load_topology(&path)
}
