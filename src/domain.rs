//! Region domain and model rosters.
//!
//! The region list and the per-family model rosters are static
//! configuration: the summaries are defined over exactly these sets and
//! report regions in exactly this order. `config` may override them from
//! drought.toml, but the defaults here are the single source of truth for
//! the shipped datasets.

use crate::error::ConfigError;
use crate::model::SourceFamily;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of models every roster must contain. Event summaries divide by this.
pub const ROSTER_SIZE: usize = 5;

/// NRM region identifiers, in the order summaries are reported.
pub static REGION_DOMAIN: &[i32] = &[
    1030, 1040, 1060, 1100, 5040, 5050, 5060, 6010, 6020, 6030,
    7010, 4020, 4030, 4010, 4040, 4080, 4070, 4050, 9010, 9020,
    9030, 3150, 1010, 1020, 2010, 2020, 2030, 2080, 2090, 3010,
    3020, 3040, 3060, 3070, 3080, 3100, 3110, 3130, 3140, 5010,
    5020, 5030, 1050, 1070, 1080, 1090, 1110, 2040, 2050, 2060,
    2070, 2100, 3030, 3050, 3090, 3120, 5070, 4060,
];

pub static CMIP5_ROSTER: [&str; ROSTER_SIZE] = [
    "CCCma-CanESM2",
    "NCC-NorESM1-M",
    "CSIRO-BOM-ACCESS1-0",
    "MIROC-MIROC5",
    "NOAA-GFDL-GFDL-ESM2M",
];

pub static CMIP6_ROSTER: [&str; ROSTER_SIZE] = [
    "ACCESS-CM2",
    "ACCESS-ESM1-5",
    "CESM2",
    "CNRM-ESM2-1",
    "CMCC-ESM2",
];

// ---------------------------------------------------------------------------
// Domain value
// ---------------------------------------------------------------------------

/// Fixed model set averaged over for one source family.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRoster {
    pub family: SourceFamily,
    pub models: Vec<String>,
}

/// Region list plus one roster per family, validated on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    regions: Vec<i32>,
    cmip5: ModelRoster,
    cmip6: ModelRoster,
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            regions: REGION_DOMAIN.to_vec(),
            cmip5: ModelRoster {
                family: SourceFamily::Cmip5,
                models: CMIP5_ROSTER.iter().map(|m| m.to_string()).collect(),
            },
            cmip6: ModelRoster {
                family: SourceFamily::Cmip6,
                models: CMIP6_ROSTER.iter().map(|m| m.to_string()).collect(),
            },
        }
    }
}

impl Domain {
    /// Builds a domain from explicit parts, enforcing the roster and region invariants.
    pub fn new(regions: Vec<i32>, rosters: Vec<ModelRoster>) -> Result<Self, ConfigError> {
        if regions.is_empty() {
            return Err(ConfigError::Invalid("region list must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for id in &regions {
            if !seen.insert(*id) {
                return Err(ConfigError::Invalid(format!("duplicate region id {}", id)));
            }
        }

        let mut cmip5 = None;
        let mut cmip6 = None;
        for roster in rosters {
            validate_roster(&roster)?;
            let slot = match roster.family {
                SourceFamily::Cmip5 => &mut cmip5,
                SourceFamily::Cmip6 => &mut cmip6,
            };
            if slot.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "more than one roster configured for {}",
                    roster.family
                )));
            }
            *slot = Some(roster);
        }

        let defaults = Domain::default();
        Ok(Self {
            regions,
            cmip5: cmip5.unwrap_or(defaults.cmip5),
            cmip6: cmip6.unwrap_or(defaults.cmip6),
        })
    }

    pub fn regions(&self) -> &[i32] {
        &self.regions
    }

    pub fn roster_for(&self, family: SourceFamily) -> &ModelRoster {
        match family {
            SourceFamily::Cmip5 => &self.cmip5,
            SourceFamily::Cmip6 => &self.cmip6,
        }
    }

    /// Hex digest of the region order and the `family` roster. Cached
    /// summaries are positional, so the digest is part of every cache key.
    pub fn fingerprint(&self, family: SourceFamily) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        for id in &self.regions {
            hasher.update(id.to_string().as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"|");
        for model in &self.roster_for(family).models {
            hasher.update(model.trim().to_lowercase().as_bytes());
            hasher.update(b",");
        }
        let result = hasher.finalize();
        // First 8 bytes are plenty to tell configurations apart.
        let bytes: [u8; 8] = result
            .get(..8)
            .and_then(|s| s.try_into().ok())
            .unwrap_or([0u8; 8]);
        hex::encode(bytes)
    }
}

fn validate_roster(roster: &ModelRoster) -> Result<(), ConfigError> {
    if roster.models.len() != ROSTER_SIZE {
        return Err(ConfigError::Invalid(format!(
            "{} roster must list exactly {} models, found {}",
            roster.family,
            ROSTER_SIZE,
            roster.models.len()
        )));
    }
    let distinct: HashSet<String> = roster.models.iter().map(|m| m.to_lowercase()).collect();
    if distinct.len() != ROSTER_SIZE {
        return Err(ConfigError::Invalid(format!("{} roster contains duplicate models", roster.family)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_domain_has_no_duplicates() {
        let mut seen = HashSet::new();
        for id in REGION_DOMAIN {
            assert!(seen.insert(*id), "duplicate region id {} in REGION_DOMAIN", id);
        }
        assert_eq!(REGION_DOMAIN.len(), 58);
    }

    #[test]
    fn test_default_domain_preserves_region_order() {
        let domain = Domain::default();
        assert_eq!(domain.regions()[0], 1030);
        assert_eq!(*domain.regions().last().unwrap(), 4060);
    }

    #[test]
    fn test_roster_selection_by_family() {
        let domain = Domain::default();
        assert!(domain.roster_for(SourceFamily::Cmip5).models.contains(&"MIROC-MIROC5".to_string()));
        assert!(domain.roster_for(SourceFamily::Cmip6).models.contains(&"CESM2".to_string()));
        assert_eq!(domain.roster_for(SourceFamily::Cmip6).models.len(), ROSTER_SIZE);
    }

    #[test]
    fn test_fingerprint_tracks_region_order_and_roster() {
        let domain = Domain::default();
        let fp = domain.fingerprint(SourceFamily::Cmip5);
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, Domain::default().fingerprint(SourceFamily::Cmip5));
        assert_ne!(fp, domain.fingerprint(SourceFamily::Cmip6));

        let forward = Domain::new(vec![1030, 1040], vec![]).unwrap();
        let reversed = Domain::new(vec![1040, 1030], vec![]).unwrap();
        assert_ne!(forward.fingerprint(SourceFamily::Cmip5), reversed.fingerprint(SourceFamily::Cmip5));

        let swapped = ModelRoster {
            family: SourceFamily::Cmip5,
            models: vec!["m1".into(), "m2".into(), "m3".into(), "m4".into(), "m5".into()],
        };
        let custom = Domain::new(vec![1030, 1040], vec![swapped]).unwrap();
        assert_ne!(forward.fingerprint(SourceFamily::Cmip5), custom.fingerprint(SourceFamily::Cmip5));
        assert_eq!(forward.fingerprint(SourceFamily::Cmip6), custom.fingerprint(SourceFamily::Cmip6));
    }

    #[test]
    fn test_roster_with_four_models_is_rejected() {
        let roster = ModelRoster {
            family: SourceFamily::Cmip6,
            models: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        let result = Domain::new(vec![1], vec![roster]);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_roster_duplicates_are_case_insensitive() {
        let roster = ModelRoster {
            family: SourceFamily::Cmip5,
            models: vec!["A".into(), "a".into(), "b".into(), "c".into(), "d".into()],
        };
        assert!(Domain::new(vec![1], vec![roster]).is_err());
    }

    #[test]
    fn test_duplicate_regions_rejected() {
        assert!(Domain::new(vec![1030, 1030], vec![]).is_err());
        assert!(Domain::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_missing_roster_falls_back_to_default() {
        let domain = Domain::new(vec![1030, 1040], vec![]).unwrap();
        assert_eq!(domain.regions(), &[1030, 1040]);
        assert_eq!(domain.roster_for(SourceFamily::Cmip5), Domain::default().roster_for(SourceFamily::Cmip5));
    }
}
