//! Platform driver registry.
//!
//! Drivers are compiled in and selected by name from the `[platform]`
//! config section.

use super::sim::SimChassis;
use super::Chassis;
use crate::config::PlatformConfig;
use crate::error::{Result, XcvrError};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type DriverFactory = fn(&Path) -> Result<Arc<dyn Chassis>>;

/// Built-in drivers.
const DRIVERS: &[(&str, DriverFactory)] = &[("sim", load_sim)];

fn load_sim(description: &Path) -> Result<Arc<dyn Chassis>> {
    Ok(Arc::new(SimChassis::from_file(description)?))
}

/// Names of the compiled-in drivers.
pub fn driver_names() -> Vec<&'static str> {
    DRIVERS.iter().map(|(name, _)| *name).collect()
}

/// Instantiates the configured driver.
pub fn load_platform(config: &PlatformConfig) -> Result<Arc<dyn Chassis>> {
    let factory = DRIVERS
        .iter()
        .find(|(name, _)| *name == config.driver)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| {
            XcvrError::Platform(format!(
                "unknown driver '{}' (available: {})",
                config.driver,
                driver_names().join(", ")
            ))
        })?;

    let chassis = factory(&config.description)?;
    info!(
        driver = %config.driver,
        chassis = chassis.name(),
        sfps = chassis.get_num_sfps(),
        "Platform loaded"
    );
    Ok(chassis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unknown_driver() {
        let config = PlatformConfig {
            driver: "vendor-x".to_string(),
            ..Default::default()
        };
        let err = load_platform(&config).err().unwrap();
        assert!(matches!(err, XcvrError::Platform(_)));
        assert!(err.to_string().contains("sim"));
    }

    #[test]
    fn test_sim_driver() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "ports": [ {{ "index": 1 }}, {{ "index": 2 }} ] }}"#).unwrap();

        let config = PlatformConfig {
            driver: "sim".to_string(),
            description: file.path().to_path_buf(),
        };
        let chassis = load_platform(&config).unwrap();
        assert_eq!(chassis.get_num_sfps(), 2);
        assert!(chassis.get_sfp(2).is_some());
    }

    #[test]
    fn test_sim_driver_missing_description() {
        let config = PlatformConfig {
            driver: "sim".to_string(),
            description: "/nonexistent/sim.json".into(),
        };
        assert!(load_platform(&config).is_err());
    }
}
