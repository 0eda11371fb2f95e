//! Device setting keys accepted by the setting get/set endpoints

use crate::error::{FoxessError, Result};

/// Normalized key paired with the canonical name the API expects
const SETTING_KEYS: [(&str, &str); 10] = [
    ("exportlimit", "ExportLimit"),
    ("minsoc", "MinSoc"),
    ("minsocongrid", "MinSocOnGrid"),
    ("maxsoc", "MaxSoc"),
    ("gridcode", "GridCode"),
    ("workmode", "WorkMode"),
    ("activepowerlimit", "ActivePowerLimit"),
    ("exportlimitpower", "ExportLimitPower"),
    ("epsoutput", "EpsOutPut"),
    ("ecomode", "ECOMode"),
];

/// Canonical setting names in table order
pub fn allowed_keys() -> impl Iterator<Item = &'static str> {
    SETTING_KEYS.iter().map(|(_, canonical)| *canonical)
}

/// Resolve user input such as `min_soc_on_grid` or `MinSocOnGrid` to the
/// canonical API key
pub fn canonical_setting_key(key: &str) -> Result<&'static str> {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SETTING_KEYS
        .iter()
        .find(|(norm, _)| *norm == normalized)
        .map(|(_, canonical)| *canonical)
        .ok_or_else(|| {
            FoxessError::api(format!(
                "Unknown setting key '{}'. Allowed keys: {}",
                key,
                allowed_keys().collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_spelling_variants() {
        assert_eq!(canonical_setting_key("MinSocOnGrid").unwrap(), "MinSocOnGrid");
        assert_eq!(canonical_setting_key("min_soc_on_grid").unwrap(), "MinSocOnGrid");
        assert_eq!(canonical_setting_key("export-limit").unwrap(), "ExportLimit");
        assert_eq!(canonical_setting_key("EPS_OUTPUT").unwrap(), "EpsOutPut");
        assert_eq!(canonical_setting_key("ecomode").unwrap(), "ECOMode");
    }

    #[test]
    fn unknown_key_lists_allowed_keys() {
        let err = canonical_setting_key("bogus").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Unknown setting key 'bogus'"));
        assert!(msg.contains("ExportLimit, MinSoc, MinSocOnGrid"));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn every_canonical_key_resolves_to_itself() {
        for key in allowed_keys() {
            assert_eq!(canonical_setting_key(key).unwrap(), key);
        }
    }
}
