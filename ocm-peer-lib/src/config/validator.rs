use crate::config::root::Config;

/// Checks that serde cannot express. Profile references and quirk names are
/// checked when the registry is built.
pub fn validate(config: &Config) -> Result<(), String> {
    let outbound = &config.outbound;
    if outbound.timeout_ms == 0 {
        return Err("outbound.timeout_ms must be > 0".into());
    }
    if outbound.connect_timeout_ms == 0 {
        return Err("outbound.connect_timeout_ms must be > 0".into());
    }
    if outbound.max_response_bytes == 0 {
        return Err("outbound.max_response_bytes must be > 0".into());
    }
    if outbound.user_agent.trim().is_empty() {
        return Err("outbound.user_agent cannot be empty".into());
    }
    if let Some(ref file) = outbound.ca_file {
        if !file.is_file() {
            return Err(format!("outbound.ca_file not found: {}", file.display()));
        }
    }
    if let Some(ref dir) = outbound.ca_dir {
        if !dir.is_dir() {
            return Err(format!("outbound.ca_dir not found: {}", dir.display()));
        }
    }
    for mapping in &config.peer_profiles.mappings {
        if mapping.pattern.trim().is_empty() {
            return Err("peer_profiles.mappings: pattern cannot be empty".into());
        }
        if mapping.profile_name.trim().is_empty() {
            return Err(format!(
                "peer_profiles.mappings: profile for {:?} cannot be empty",
                mapping.pattern
            ));
        }
    }
    Ok(())
}
