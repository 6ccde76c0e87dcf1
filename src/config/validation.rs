use crate::config::types::{
    ApiConfig, AreaEntry, Config, OutputConfig, RateLimitConfig, RetryConfig, SearchConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_output_config(&config.output)?;
    validate_search_config(&config.search)?;
    validate_areas(&config.areas)?;
    Ok(())
}

/// Validates API endpoint configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "key-env cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 || config.page_size > 50 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 50, got {}",
            config.page_size
        )));
    }

    if config.max_results < config.page_size {
        return Err(ConfigError::Validation(format!(
            "max-results ({}) must be at least page-size ({})",
            config.max_results, config.page_size
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the request budget
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.requests_per_window < 1 {
        return Err(ConfigError::Validation(format!(
            "requests-per-window must be >= 1, got {}",
            config.requests_per_window
        )));
    }

    if config.window_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "window-secs must be >= 1, got {}",
            config.window_secs
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates search filters
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    for filter in &config.filters {
        if filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "search filters cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates area entries
fn validate_areas(areas: &[AreaEntry]) -> Result<(), ConfigError> {
    if areas.is_empty() {
        return Err(ConfigError::InvalidArea(
            "at least one [[area]] is required".to_string(),
        ));
    }

    for area in areas {
        validate_area(area)?;
    }

    Ok(())
}

/// Validates a single area entry
fn validate_area(area: &AreaEntry) -> Result<(), ConfigError> {
    match (&area.location, &area.bbox) {
        (Some(_), Some(_)) => Err(ConfigError::InvalidArea(
            "an area takes either location or bbox, not both".to_string(),
        )),
        (None, None) => Err(ConfigError::InvalidArea(
            "an area needs a location or a bbox".to_string(),
        )),
        (Some(location), None) => {
            if location.trim().is_empty() {
                return Err(ConfigError::InvalidArea(
                    "location cannot be empty".to_string(),
                ));
            }

            for zip in &area.partitions {
                validate_zip(zip)?;
            }

            Ok(())
        }
        (None, Some(bbox)) => {
            if !area.partitions.is_empty() {
                return Err(ConfigError::InvalidArea(
                    "partitions only apply to location areas".to_string(),
                ));
            }

            if !bbox.is_valid() {
                return Err(ConfigError::InvalidArea(format!(
                    "bbox must satisfy -90 <= south < north <= 90 and -180 <= west < east <= 180, got {:?}",
                    bbox
                )));
            }

            Ok(())
        }
    }
}

/// Validates a ZIP partition (five digits, optionally ZIP+4)
fn validate_zip(zip: &str) -> Result<(), ConfigError> {
    let (base, plus4) = match zip.split_once('-') {
        Some((base, plus4)) => (base, Some(plus4)),
        None => (zip, None),
    };

    let digits = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_digit());

    if !digits(base, 5) || plus4.is_some_and(|p| !digits(p, 4)) {
        return Err(ConfigError::InvalidArea(format!(
            "partition '{}' is not a ZIP code",
            zip
        )));
    }

    Ok(())
}
