use std::fs;
use std::path::Path;

use crate::config::root::Config;
use crate::config::validator::validate;
use crate::error::{FederationError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let path = p.as_ref();
    let txt = fs::read_to_string(path).map_err(|e| {
        FederationError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    parse(&txt)
}

/// Parse and validate a TOML document.
pub fn parse(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| FederationError::Config(format!("Failed to parse config: {e}")))?;
    validate(&cfg).map_err(FederationError::Config)?;
    Ok(cfg)
}
