//! Process configuration, read once from the environment at startup.

use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct Settings {
    pub focuser_port: String,
    pub focuser_min: f64,
    pub focuser_max: f64,
    pub focuser_step: f64,
    pub ha_host: String,
    pub ha_token: String,
    pub ha_entity: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            focuser_port: var_or("FOCUSER_PORT", "/dev/ttyAMA1"),
            focuser_min: number_or("FOCUSER_MIN", 0.0)?,
            focuser_max: number_or("FOCUSER_MAX", 64500.0)?,
            focuser_step: number_or("FOCUSER_STEP", 1.0)?,
            ha_host: var_or("HA_HOST", "http://homeassistant.local:8123"),
            ha_token: required("HA_TOKEN")?,
            ha_entity: var_or("HA_ENTITY", "switch.astro_flattner"),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &'static str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn number_or(name: &'static str, default: f64) -> Result<f64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            "FOCUSER_PORT",
            "FOCUSER_MIN",
            "FOCUSER_MAX",
            "FOCUSER_STEP",
            "HA_HOST",
            "HA_TOKEN",
            "HA_ENTITY",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn missing_token_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        assert!(matches!(
            Settings::from_env(),
            Err(ConfigError::Missing("HA_TOKEN"))
        ));
    }

    #[test]
    fn defaults_fill_optional_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("HA_TOKEN", "secret");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.focuser_port, "/dev/ttyAMA1");
        assert_eq!(settings.focuser_max, 64500.0);
        assert_eq!(settings.ha_entity, "switch.astro_flattner");
        env::remove_var("HA_TOKEN");
    }

    #[test]
    fn bad_number_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        env::set_var("HA_TOKEN", "secret");
        env::set_var("FOCUSER_MAX", "not-a-number");
        let result = Settings::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "FOCUSER_MAX",
                ..
            })
        ));
        env::remove_var("FOCUSER_MAX");
        env::remove_var("HA_TOKEN");
    }
}
