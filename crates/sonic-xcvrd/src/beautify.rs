//! Unit stripping for diagnostic values.
//!
//! Platform drivers report sensor values with their unit attached
//! (`"35.5C"`, `"3.3Volts"`, `"-2.1dBm"`). STATE_DB carries bare numbers.

use once_cell::sync::Lazy;
use regex::Regex;
use sonic_xcvr_common::{DiagDict, DiagValue, FieldValue};

struct UnitRule {
    field: Regex,
    suffix: &'static str,
}

impl UnitRule {
    fn new(pattern: &str, suffix: &'static str) -> Self {
        Self {
            field: Regex::new(pattern).expect("Invalid field pattern"),
            suffix,
        }
    }
}

static UNIT_RULES: Lazy<Vec<UnitRule>> = Lazy::new(|| {
    vec![
        // sensors
        UnitRule::new(r"^temperature$", "C"),
        UnitRule::new(r"^voltage$", "Volts"),
        UnitRule::new(r"^[tr]x[1-8]power$", "dBm"),
        UnitRule::new(r"^[tr]x[1-8]bias$", "mA"),
        // thresholds
        UnitRule::new(r"^temp(high|low)(alarm|warning)$", "C"),
        UnitRule::new(r"^vcc(high|low)(alarm|warning)$", "Volts"),
        UnitRule::new(r"^[tr]xpower(high|low)(alarm|warning)$", "dBm"),
        UnitRule::new(r"^txbias(high|low)(alarm|warning)$", "mA"),
    ]
});

fn unit_suffix(field: &str) -> Option<&'static str> {
    UNIT_RULES
        .iter()
        .find(|rule| rule.field.is_match(field))
        .map(|rule| rule.suffix)
}

/// String form of one value, unit stripped.
pub fn beautify_value(field: &str, value: &DiagValue) -> String {
    match value {
        DiagValue::Str(s) => {
            let s = s.trim_end();
            match unit_suffix(field) {
                Some(suffix) => s.strip_suffix(suffix).unwrap_or(s).trim_end().to_string(),
                None => s.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// Field values of a dictionary, units stripped when `beautify` is set.
pub fn to_field_values(dict: &DiagDict, beautify: bool) -> Vec<FieldValue> {
    dict.iter()
        .map(|(field, value)| {
            let value = if beautify {
                beautify_value(field, value)
            } else {
                value.to_string()
            };
            (field.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_xcvr_common::diag_dict;

    #[test]
    fn test_sensor_units_stripped() {
        let dict = diag_dict! {
            "temperature" => "35.5C",
            "voltage" => "3.3Volts",
            "rx1power" => "-2.1dBm",
            "tx8power" => "0.5dBm",
            "tx3bias" => "6.75mA",
            "rx9power" => "1.0dBm",
        };
        assert_eq!(
            to_field_values(&dict, true),
            vec![
                ("rx1power".to_string(), "-2.1".to_string()),
                ("rx9power".to_string(), "1.0dBm".to_string()),
                ("temperature".to_string(), "35.5".to_string()),
                ("tx3bias".to_string(), "6.75".to_string()),
                ("tx8power".to_string(), "0.5".to_string()),
                ("voltage".to_string(), "3.3".to_string()),
            ]
        );
    }

    #[test]
    fn test_threshold_units_stripped() {
        assert_eq!(beautify_value("temphighalarm", &"75.0C".into()), "75.0");
        assert_eq!(beautify_value("vcclowwarning", &"3.13Volts".into()), "3.13");
        assert_eq!(beautify_value("rxpowerhighalarm", &"3.4dBm".into()), "3.4");
        assert_eq!(beautify_value("txbiaslowalarm", &"2.0mA".into()), "2.0");
    }

    #[test]
    fn test_non_strings_and_whitespace() {
        assert_eq!(beautify_value("temperature", &DiagValue::Float(41.0)), "41.0");
        assert_eq!(beautify_value("tx1power", &DiagValue::Int(-3)), "-3");
        assert_eq!(beautify_value("rx_los", &DiagValue::Bool(false)), "False");
        assert_eq!(beautify_value("manufacturer", &"ACME Corp.   ".into()), "ACME Corp.");
        assert_eq!(beautify_value("temperature", &"35.5 C ".into()), "35.5");
        assert_eq!(beautify_value("voltage", &"N/A".into()), "N/A");
    }

    #[test]
    fn test_unbeautified_values_keep_units() {
        let dict = diag_dict! { "temperature" => "35.5C", "rx_los" => true };
        assert_eq!(
            to_field_values(&dict, false),
            vec![
                ("rx_los".to_string(), "True".to_string()),
                ("temperature".to_string(), "35.5C".to_string()),
            ]
        );
    }
}
