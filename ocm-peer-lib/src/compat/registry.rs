use super::pattern::HostPattern;
use super::quirk::{builtin_profiles, lookup_quirk, CompatProfile, STRICT_PROFILE};
use crate::config::{PeerProfilesConfig, ProfileMapping};
use crate::security::ip_filter::normalize_host;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile name {0:?} is reserved")]
    ReservedProfileName(String),

    #[error("profile {profile:?} references unknown quirk {quirk:?}")]
    UnknownQuirk { profile: String, quirk: String },

    #[error("mapping for {pattern:?} references unknown profile {profile:?}")]
    UnknownProfile { pattern: String, profile: String },

    #[error("invalid mapping pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Resolves a peer host to its compatibility profile
///
/// Built once at startup and read-only afterwards, so it can be shared
/// behind an `Arc` without locking. Mappings are tried in declaration order
/// and the first match wins. Unmatched peers get the strict profile.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    mappings: Vec<(HostPattern, Arc<CompatProfile>)>,
    strict: Arc<CompatProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self { mappings: Vec::new(), strict: Arc::new(CompatProfile::strict()) }
    }
}

impl ProfileRegistry {
    pub fn from_config(config: &PeerProfilesConfig) -> Result<Self, ProfileError> {
        let mut profiles: HashMap<String, Arc<CompatProfile>> = builtin_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), Arc::new(p)))
            .collect();

        for (name, custom) in &config.custom_profiles {
            if name.eq_ignore_ascii_case(STRICT_PROFILE) {
                return Err(ProfileError::ReservedProfileName(name.clone()));
            }
            let quirks = custom
                .quirks
                .iter()
                .map(|quirk| {
                    lookup_quirk(quirk).ok_or_else(|| ProfileError::UnknownQuirk {
                        profile: name.clone(),
                        quirk: quirk.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let profile = CompatProfile { name: name.clone(), quirks, flags: custom.flags };
            profiles.insert(name.clone(), Arc::new(profile));
        }

        Self::build(&config.mappings, &profiles)
    }

    /// Build from explicit profiles. Mappings that name `strict` resolve to
    /// the implicit strict profile.
    pub fn new(
        mappings: &[ProfileMapping],
        profiles: impl IntoIterator<Item = CompatProfile>,
    ) -> Result<Self, ProfileError> {
        let mut by_name = HashMap::new();
        for profile in profiles {
            if profile.name.eq_ignore_ascii_case(STRICT_PROFILE) {
                return Err(ProfileError::ReservedProfileName(profile.name));
            }
            by_name.insert(profile.name.clone(), Arc::new(profile));
        }
        Self::build(mappings, &by_name)
    }

    fn build(
        mappings: &[ProfileMapping],
        profiles: &HashMap<String, Arc<CompatProfile>>,
    ) -> Result<Self, ProfileError> {
        let strict = Arc::new(CompatProfile::strict());
        let mut compiled = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let pattern = HostPattern::parse(&mapping.pattern).map_err(|reason| {
                ProfileError::InvalidPattern { pattern: mapping.pattern.clone(), reason }
            })?;
            let profile = if mapping.profile_name.eq_ignore_ascii_case(STRICT_PROFILE) {
                Arc::clone(&strict)
            } else {
                profiles.get(&mapping.profile_name).cloned().ok_or_else(|| {
                    ProfileError::UnknownProfile {
                        pattern: mapping.pattern.clone(),
                        profile: mapping.profile_name.clone(),
                    }
                })?
            };
            compiled.push((pattern, profile));
        }
        Ok(Self { mappings: compiled, strict })
    }

    pub fn resolve(&self, peer_host: &str) -> &CompatProfile {
        let host = normalize_host(peer_host);
        match self.mappings.iter().find(|(pattern, _)| pattern.matches(&host)) {
            Some((pattern, profile)) => {
                debug!(peer = %host, %pattern, profile = %profile.name, "peer profile resolved");
                profile
            }
            None => &self.strict,
        }
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::quirk::{ProfileFlags, ACCEPT_PLAIN_TOKEN, SKIP_DIGEST_VALIDATION};
    use crate::compat::ReasonCode;
    use crate::config::CustomProfileConfig;
    use std::collections::BTreeMap;

    fn mapping(pattern: &str, profile: &str) -> ProfileMapping {
        ProfileMapping { pattern: pattern.to_string(), profile_name: profile.to_string() }
    }

    fn registry(config: &PeerProfilesConfig) -> ProfileRegistry {
        match ProfileRegistry::from_config(config) {
            Ok(r) => r,
            Err(e) => panic!("registry: {e}"),
        }
    }

    #[test]
    fn test_unmapped_peer_is_strict() {
        let reg = registry(&PeerProfilesConfig::default());
        let profile = reg.resolve("cloud.example.org");
        assert_eq!(profile.name, STRICT_PROFILE);
        assert!(profile.is_strict());
    }

    #[test]
    fn test_first_match_wins() {
        let config = PeerProfilesConfig {
            mappings: vec![
                mapping("legacy.nextcloud.com", "owncloud"),
                mapping("*.nextcloud.com", "nextcloud"),
            ],
            custom_profiles: BTreeMap::new(),
        };
        let reg = registry(&config);
        assert_eq!(reg.resolve("legacy.nextcloud.com").name, "owncloud");
        assert_eq!(reg.resolve("demo.nextcloud.com").name, "nextcloud");
        assert_eq!(reg.resolve("nextcloud.com").name, STRICT_PROFILE);
    }

    #[test]
    fn test_strict_mapping_ignores_case() {
        let config = PeerProfilesConfig {
            mappings: vec![mapping("a.example", "Strict"), mapping("*", "dev")],
            custom_profiles: BTreeMap::new(),
        };
        let reg = registry(&config);
        assert!(reg.resolve("a.example").is_strict());
        assert_eq!(reg.resolve("b.example").name, "dev");
    }

    #[test]
    fn test_resolve_normalizes_host() {
        let config = PeerProfilesConfig {
            mappings: vec![mapping("*.nextcloud.com", "nextcloud")],
            custom_profiles: BTreeMap::new(),
        };
        let reg = registry(&config);
        assert_eq!(reg.resolve(" Demo.NextCloud.com. ").name, "nextcloud");
    }

    #[test]
    fn test_custom_profile_keeps_quirk_order() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "legacy".to_string(),
            CustomProfileConfig {
                quirks: vec![SKIP_DIGEST_VALIDATION.to_string(), ACCEPT_PLAIN_TOKEN.to_string()],
                flags: ProfileFlags { allow_unsigned_inbound: true, ..ProfileFlags::default() },
            },
        );
        let config = PeerProfilesConfig {
            mappings: vec![mapping("cloud.example.org", "legacy")],
            custom_profiles: custom,
        };
        let reg = registry(&config);
        let profile = reg.resolve("cloud.example.org");
        let names: Vec<_> = profile.quirks.iter().map(|q| q.name).collect();
        assert_eq!(names, vec![SKIP_DIGEST_VALIDATION, ACCEPT_PLAIN_TOKEN]);
        assert!(profile.flags.allow_unsigned_inbound);
        assert!(profile.quirk_for(ReasonCode::SignatureRequired).is_some());
    }

    #[test]
    fn test_strict_cannot_be_redefined() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "Strict".to_string(),
            CustomProfileConfig {
                quirks: vec![ACCEPT_PLAIN_TOKEN.to_string()],
                flags: ProfileFlags::default(),
            },
        );
        let config = PeerProfilesConfig { mappings: vec![], custom_profiles: custom };
        assert_eq!(
            ProfileRegistry::from_config(&config).err(),
            Some(ProfileError::ReservedProfileName("Strict".to_string()))
        );

        let result = ProfileRegistry::new(
            &[],
            [CompatProfile { quirks: vec![], ..CompatProfile::strict() }],
        );
        assert!(matches!(result, Err(ProfileError::ReservedProfileName(_))));
    }

    #[test]
    fn test_explicit_strict_mapping() {
        let config = PeerProfilesConfig {
            mappings: vec![
                mapping("secure.nextcloud.com", "strict"),
                mapping("*.nextcloud.com", "nextcloud"),
            ],
            custom_profiles: BTreeMap::new(),
        };
        let reg = registry(&config);
        assert!(reg.resolve("secure.nextcloud.com").is_strict());
        assert_eq!(reg.mapping_count(), 2);
    }

    #[test]
    fn test_unknown_quirk_rejected() {
        let mut custom = BTreeMap::new();
        custom.insert(
            "legacy".to_string(),
            CustomProfileConfig {
                quirks: vec!["disable_tls".to_string()],
                flags: ProfileFlags::default(),
            },
        );
        let config = PeerProfilesConfig { mappings: vec![], custom_profiles: custom };
        assert!(matches!(
            ProfileRegistry::from_config(&config),
            Err(ProfileError::UnknownQuirk { .. })
        ));
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let config = PeerProfilesConfig {
            mappings: vec![mapping("*.example.org", "missing")],
            custom_profiles: BTreeMap::new(),
        };
        assert!(matches!(
            ProfileRegistry::from_config(&config),
            Err(ProfileError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = PeerProfilesConfig {
            mappings: vec![mapping("  ", "nextcloud")],
            custom_profiles: BTreeMap::new(),
        };
        assert!(matches!(
            ProfileRegistry::from_config(&config),
            Err(ProfileError::InvalidPattern { .. })
        ));
    }
}
