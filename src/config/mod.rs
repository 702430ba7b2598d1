mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./framevault.toml",
        "~/.config/framevault/config.toml",
        "/etc/framevault/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.health.error_threshold == 0 {
        anyhow::bail!("health.error_threshold must be at least 1");
    }
    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be at least 1");
    }
    if !(0.0..=1.0).contains(&config.resolution.min_confidence) {
        anyhow::bail!("resolution.min_confidence must be between 0.0 and 1.0");
    }
    if config
        .locale
        .chain
        .iter()
        .any(|locale| locale.trim().is_empty())
    {
        anyhow::bail!("locale.chain must not contain blank entries");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.health.error_threshold, 3);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.locale.preferred, "zh-TW");
        assert!(config.douban.enabled);
        assert!(config.tmdb.api_key.is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
[tmdb]
api_key = "abc123"

[locale]
preferred = "pt-BR"
chain = ["pt-BR", "pt-PT", "en"]

[retry]
max_attempts = 6
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.tmdb.api_key, "abc123");
        assert_eq!(config.locale.chain, ["pt-BR", "pt-PT", "en"]);
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry.base_delay_secs, 1);
        assert_eq!(config.resolution.min_confidence, 0.2);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let file = write_config("[health]\nerror_threshold = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let file = write_config("[resolution]\nmin_confidence = 1.5\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn blank_locale_entry_is_rejected() {
        let file = write_config("[locale]\nchain = [\"zh-TW\", \"  \"]\n");
        assert!(load_config(file.path()).is_err());
    }
}
