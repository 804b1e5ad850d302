// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty names, non-zero intervals and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::TesseraConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TesseraConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let service = &config.service;

    if service.data_source_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.data_source_name must not be empty".to_string(),
        });
    }

    if service.service_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "service.service_name must not be empty".to_string(),
        });
    }

    if service.start_poll_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "service.start_poll_secs must be at least 1".to_string(),
        });
    }

    if service.post_init_poll_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "service.post_init_poll_ms must be at least 1".to_string(),
        });
    }

    if service.max_cascade_depth == 0 {
        errors.push(ConfigError::Validation {
            message: "service.max_cascade_depth must be at least 1".to_string(),
        });
    }

    for (name, source) in &config.datasources {
        if source.path.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("datasources.{name}.path must not be empty"),
            });
        }
    }

    let level = config.log.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
