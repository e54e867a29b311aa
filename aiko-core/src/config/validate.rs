//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    let url = config.relay.url.trim();
    if url.is_empty() {
        errors.push("relay.url must not be empty".to_string());
    } else if !url.starts_with("ws://") && !url.starts_with("wss://") {
        errors.push(format!("relay.url must be a ws:// or wss:// URL, got {}", url));
    }
    if config.relay.reconnect_delay_ms == 0 {
        errors.push("relay.reconnect_delay_ms must be > 0".to_string());
    }

    if config.bandit.state_path.trim().is_empty() {
        errors.push("bandit.state_path must not be empty".to_string());
    }

    if config.director.interval_s == 0 {
        errors.push("director.interval_s must be > 0".to_string());
    }

    let format = config.logging.format.to_lowercase();
    if format != "text" && format != "json" {
        errors.push(format!(
            "logging.format must be text or json, got {}",
            config.logging.format
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
