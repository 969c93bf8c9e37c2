//! Config loading: embedded defaults, optional file overlay, env overrides.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Environment variable overrides, `(variable, dotted config path)`.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("LOCFLOW_SCHEDULER_IMAGE", "scheduler.image"),
    ("LOCFLOW_SCHEDULER_POD_NAME", "scheduler.pod_name"),
    ("LOCFLOW_SCHEDULER_STRATEGY", "scheduler.strategy"),
    ("LOCFLOW_BATCH_SIZE", "batch.size"),
    ("LOCFLOW_FTP_USER", "ftp.user"),
    ("LOCFLOW_FTP_PASSWORD", "ftp.password"),
    ("LOCFLOW_LOCAL_ROOT", "storage.local_root"),
];

/// Load the configuration.
///
/// `file` is the executor-provided config file; `None` skips the overlay
/// layer and uses defaults plus environment only.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any layer is malformed or the merged
/// configuration fails validation.
pub fn load(file: Option<&Path>) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|source| ConfigError::Parse {
            path: "<embedded defaults>".to_owned(),
            source,
        })?;

    if let Some(path) = file {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let overlay: toml::Value = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        deep_merge(&mut merged, overlay);
        info!(path = %path.display(), "loaded config file");
    }

    for (variable, dotted) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(variable) {
            debug!(variable, "applying environment override");
            set_dotted(&mut merged, dotted, &value);
        }
    }

    let config: Config = merged.try_into().map_err(ConfigError::Deserialize)?;
    validate::check(&config)?;
    Ok(config)
}

/// Recursively merge `overlay` into `base`. Tables merge key-wise; any other
/// value replaces the base wholesale.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Set a dotted path like `batch.size` to a string value, coercing to the
/// type already present at that slot.
fn set_dotted(tree: &mut toml::Value, dotted: &str, raw: &str) {
    match dotted.split_once('.') {
        Some((head, rest)) => {
            if let Some(next) = tree.as_table_mut().and_then(|table| table.get_mut(head)) {
                set_dotted(next, rest, raw);
            }
        }
        None => {
            if let Some(table) = tree.as_table_mut() {
                let coerced = coerce(table.get(dotted), raw);
                table.insert(dotted.to_owned(), coerced);
            }
        }
    }
}

/// Coerce a raw env string to the type already present at the slot.
fn coerce(existing: Option<&toml::Value>, raw: &str) -> toml::Value {
    match existing {
        Some(toml::Value::Integer(_)) => raw
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Integer),
        Some(toml::Value::Boolean(_)) => raw
            .parse::<bool>()
            .map_or_else(|_| toml::Value::String(raw.to_owned()), toml::Value::Boolean),
        _ => toml::Value::String(raw.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_and_validate() {
        let config = load(None).unwrap();
        assert_eq!(config.ftp.user, "ftp");
        assert_eq!(config.ftp.password, "nextflowClient");
        assert_eq!(config.batch.size, 100);
        assert_eq!(config.scheduler.container_port, 8080);
    }

    #[test]
    fn file_overlay_wins_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[batch]\nsize = 3\n\n[scheduler]\nimage = \"registry.internal/sched:2\""
        )
        .unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.batch.size, 3);
        assert_eq!(config.scheduler.image, "registry.internal/sched:2");
        // Untouched sections keep their defaults.
        assert_eq!(config.scheduler.strategy, "fifo-locality");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\nsize = 3\nfrequency = 9").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(ConfigError::Deserialize(_))
        ));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\nsize = 0").unwrap();
        assert!(matches!(
            load(Some(file.path())),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn dotted_override_coerces_integers() {
        let mut tree: toml::Value = toml::from_str(DEFAULTS_TOML).unwrap();
        set_dotted(&mut tree, "batch.size", "7");
        assert_eq!(tree["batch"]["size"], toml::Value::Integer(7));
        set_dotted(&mut tree, "scheduler.image", "x:1");
        assert_eq!(
            tree["scheduler"]["image"],
            toml::Value::String("x:1".into())
        );
    }
}
