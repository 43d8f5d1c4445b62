//! Checks that run on top of serde: unrecognised keys in a config file,
//! and values that parse fine but make no physical sense for a helmet IMU.
//!
//! Unknown keys are reported, never rejected, so an old config file keeps
//! loading after a field is renamed. The closest known key is offered as a
//! suggestion.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `HelmetConfig`.
///
/// Maintained by hand to match the struct hierarchy in helmet_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [rider]
        "rider",
        "rider.name",
        "rider.device_id",
        // [sensor]
        "sensor",
        "sensor.acc_counts_per_g",
        "sensor.gyro_counts_per_dps",
        "sensor.smoothing_alpha",
        // [connectivity]
        "connectivity",
        "connectivity.stale_threshold_ms",
        "connectivity.poll_interval_ms",
        // [classifier]
        "classifier",
        "classifier.window_ms",
        "classifier.max_samples",
        "classifier.impact_threshold_g",
        "classifier.rotation_threshold_dps",
        "classifier.min_rotation_samples",
        "classifier.confirm_threshold_percent",
        "classifier.required_consecutive_hits",
        // [alert]
        "alert",
        "alert.escalation_secs",
        "alert.cooldown_secs",
        // [contacts]
        "contacts",
        "contacts.rider",
        "contacts.emergency",
        "contacts.default_contact",
        // [storage]
        "storage",
        "storage.path",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// Key Paths
// ============================================================================

/// Dotted paths of every table and key in a parsed TOML document, e.g.
/// `[alert] cooldown_secs = 5` gives `alert` and `alert.cooldown_secs`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut pending: Vec<(String, &toml::Value)> = vec![(prefix.to_string(), value)];

    while let Some((base, node)) = pending.pop() {
        let Some(table) = node.as_table() else {
            continue;
        };
        for (name, child) in table {
            let dotted = match base.as_str() {
                "" => name.to_string(),
                _ => format!("{base}.{name}"),
            };
            if child.is_table() {
                pending.push((dotted.clone(), child));
            }
            found.push(dotted);
        }
    }
    found
}

// ============================================================================
// Edit Distance
// ============================================================================

/// Edit distance over chars, single-row dynamic programming.
fn edit_distance(from: &str, to: &str) -> usize {
    let target: Vec<char> = to.chars().collect();
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, a) in from.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, b) in target.iter().enumerate() {
            let substitute = diagonal + usize::from(a != *b);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[target.len()]
}

/// Closest known key within three edits of `unknown`.
///
/// Ties resolve to the lexicographically smallest key so output is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (edit_distance(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Keys
// ============================================================================

/// One warning per key the config structs do not know about.
///
/// Unparseable input yields no warnings; serde reports the syntax error.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Ranges
// ============================================================================

/// Sensor- and rider-level sanity checks on a parsed config.
///
/// Errors make detection impossible and stop startup. Warnings are logged.
pub fn validate_physical_ranges(
    config: &super::HelmetConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ValidationWarning> = Vec::new();
    let c = &config.classifier;

    // A window shorter than the rotation run can never confirm rotation
    if c.window_ms > 0 && c.window_ms < 100 {
        errors.push(format!(
            "classifier.window_ms = {} is too short to hold a rotation run (min 100 ms)",
            c.window_ms
        ));
    }

    // Consumer MEMS accelerometers saturate at 16 g
    if c.impact_threshold_g.is_finite() && c.impact_threshold_g > 16.0 {
        warnings.push(ValidationWarning {
            field: "classifier.impact_threshold_g".to_string(),
            message: format!(
                "impact_threshold_g = {:.1} is above typical sensor full scale (16 g)",
                c.impact_threshold_g
            ),
            suggestion: None,
        });
    }

    // Consumer MEMS gyroscopes saturate at 2000 deg/s
    if c.rotation_threshold_dps.is_finite() && c.rotation_threshold_dps > 2000.0 {
        warnings.push(ValidationWarning {
            field: "classifier.rotation_threshold_dps".to_string(),
            message: format!(
                "rotation_threshold_dps = {:.0} is above typical sensor full scale (2000 deg/s)",
                c.rotation_threshold_dps
            ),
            suggestion: None,
        });
    }

    if config.alert.escalation_secs > 0 && config.alert.escalation_secs < 10 {
        warnings.push(ValidationWarning {
            field: "alert.escalation_secs".to_string(),
            message: format!(
                "escalation_secs = {} leaves the rider little time to cancel",
                config.alert.escalation_secs
            ),
            suggestion: None,
        });
    }

    if config.contacts.emergency.is_empty() && config.contacts.default_contact.is_none() {
        warnings.push(ValidationWarning {
            field: "contacts.emergency".to_string(),
            message: "no emergency contacts and no default contact configured".to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}
