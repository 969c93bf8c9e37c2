//! Semantic validation of the merged configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

pub(crate) fn check(config: &Config) -> ConfigResult<()> {
    if config.batch.size == 0 {
        return Err(ConfigError::Validation(
            "batch.size must be at least 1".to_owned(),
        ));
    }
    if config.scheduler.image.trim().is_empty() {
        return Err(ConfigError::Validation(
            "scheduler.image must not be empty".to_owned(),
        ));
    }
    if config.scheduler.pod_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "scheduler.pod_name must not be empty".to_owned(),
        ));
    }
    if config.scheduler.container_port == 0 {
        return Err(ConfigError::Validation(
            "scheduler.container_port must not be 0".to_owned(),
        ));
    }
    if config.scheduler.http_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler.http_timeout_secs must not be 0".to_owned(),
        ));
    }
    if !config.storage.local_root.is_absolute() {
        return Err(ConfigError::Validation(format!(
            "storage.local_root must be absolute, got {}",
            config.storage.local_root.display()
        )));
    }
    Ok(())
}
