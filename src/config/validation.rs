use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_generator_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.max_request_body_bytes == 0 {
        return Err(validation_err(
            "server.max_request_body_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(max_blocking_threads) = server.runtime_max_blocking_threads {
        if max_blocking_threads == 0 {
            return Err(validation_err(
                "server.runtime_max_blocking_threads must be greater than 0 when set",
            ));
        }
    }
    if let Some(thread_stack_size_kb) = server.runtime_thread_stack_size_kb {
        if thread_stack_size_kb == 0 {
            return Err(validation_err(
                "server.runtime_thread_stack_size_kb must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_generator_config(config: &AppConfig) -> Result<(), ConfigError> {
    let generator = &config.generator;
    if generator.binary.trim().is_empty() {
        return Err(validation_err("generator.binary cannot be empty"));
    }
    if generator.output_format.trim().is_empty() {
        return Err(validation_err("generator.output_format cannot be empty"));
    }
    if generator.default_model.trim().is_empty() {
        return Err(validation_err("generator.default_model cannot be empty"));
    }
    if generator.scratch_dir.as_os_str().is_empty() {
        return Err(validation_err("generator.scratch_dir cannot be empty"));
    }
    if generator.models.is_empty() {
        return Err(validation_err("generator.models cannot be empty"));
    }
    if generator.models.iter().any(|model| model.trim().is_empty()) {
        return Err(validation_err("generator.models contains an empty model id"));
    }
    if generator.max_buffered_bytes == 0 {
        return Err(validation_err(
            "generator.max_buffered_bytes must be greater than 0",
        ));
    }
    if generator.idle_timeout_secs == Some(0) {
        return Err(validation_err(
            "generator.idle_timeout_secs must be greater than 0 when set",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is not one of {VALID_LOG_LEVELS:?}",
            config.features.log_level
        )));
    }
    Ok(())
}
