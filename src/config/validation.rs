use crate::config::types::{ApiConfig, Config, CrawlConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    // The frontier grows with games x (participants - 1) per level; depths
    // past a handful are never what an operator actually wants.
    if config.max_depth > 8 {
        return Err(ConfigError::Validation(format!(
            "max-depth must be <= 8, got {}",
            config.max_depth
        )));
    }

    if config.max_games_per_user == Some(0) {
        return Err(ConfigError::Validation(
            "max-games-per-user must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if let Some(dir) = &config.export_dir {
        if dir.is_empty() {
            return Err(ConfigError::Validation(
                "export-dir cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            api: ApiConfig::default(),
            crawl: CrawlConfig::default(),
            output: OutputConfig {
                database_path: "./arena.db".to_string(),
                export_dir: None,
            },
            seeds: Default::default(),
        }
    }

    #[test]
    fn test_default_config_validates() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = base_config();
        config.api.base_url = "ftp://example.io".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let mut config = base_config();
        config.crawl.max_depth = 9;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_zero_games_cap() {
        let mut config = base_config();
        config.crawl.max_games_per_user = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_database_path() {
        let mut config = base_config();
        config.output.database_path = String::new();
        assert!(validate(&config).is_err());
    }
}
