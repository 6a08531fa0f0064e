// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{KilnError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = KilnError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.build, raw.entry))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_build_section(cfg)?;
    validate_entry_dependencies(cfg)?;
    Ok(())
}

fn validate_build_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.build.max_concurrent_batches == 0 {
        return Err(KilnError::ConfigError(
            "[build].max_concurrent_batches must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.build.lock_timeout_ms == 0 {
        return Err(KilnError::ConfigError(
            "[build].lock_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Reject unknown and self references in `depends_on` up front.
///
/// Cycles are left to the graph runner, which reconstructs the full cycle
/// path for its error message.
fn validate_entry_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, entry) in cfg.entry.iter() {
        for dep in entry.depends_on.iter() {
            if !cfg.entry.contains_key(dep) {
                return Err(KilnError::ConfigError(format!(
                    "entry '{}' has unknown dependency '{}' in `depends_on`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(KilnError::ConfigError(format!(
                    "entry '{}' cannot depend on itself in `depends_on`",
                    name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).expect("valid TOML")
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = ConfigFile::try_from(raw("")).expect("empty config is valid");
        assert_eq!(cfg.build.pipeline, "default");
        assert!(cfg.build.cache);
        assert_eq!(cfg.build.max_concurrent_batches, 50);
        assert_eq!(cfg.build.lock_timeout_ms, 1000);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [entry.app]
            path = "pkgs/app"
            depends_on = ["nope"]
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, KilnError::ConfigError(_)));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [entry.app]
            path = "pkgs/app"
            depends_on = ["app"]
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, KilnError::ConfigError(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [build]
            max_concurrent_batches = 0
            "#,
        ))
        .unwrap_err();
        assert!(matches!(err, KilnError::ConfigError(_)));
    }
}
