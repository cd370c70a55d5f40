//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, ports, methods and allow-list patterns
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::codec::KNOWN_METHODS;
use crate::config::schema::RelayConfig;
use crate::routing::destination::parse_url;
use crate::routing::matcher::EnvelopePolicy;

/// One semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.ingress.is_none() && config.egress.is_none() {
        errors.push(ValidationError::new(
            "config",
            "at least one of [ingress] or [egress] must be configured",
        ));
    }

    if let Some(ingress) = &config.ingress {
        check_bind("ingress.bind_address", &ingress.bind_address, &mut errors);
        check_limit("ingress.max_connections", ingress.max_connections, &mut errors);
        match parse_url(&ingress.next_hop) {
            Ok(dest) if dest.port == 0 => {
                errors.push(ValidationError::new("ingress.next_hop", "port must be non-zero"))
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("ingress.next_hop", e.to_string())),
        }
    }

    if let Some(egress) = &config.egress {
        check_bind("egress.bind_address", &egress.bind_address, &mut errors);
        check_limit("egress.max_connections", egress.max_connections, &mut errors);
        if let Err(e) = EnvelopePolicy::compile(&egress.allow_list) {
            errors.push(ValidationError::new("egress.allow_list", e.to_string()));
        }
        if egress.reverse_proxy.host.trim().is_empty() {
            errors.push(ValidationError::new("egress.reverse_proxy.host", "must not be empty"));
        }
        if egress.reverse_proxy.port == 0 {
            errors.push(ValidationError::new("egress.reverse_proxy.port", "must be non-zero"));
        }
        if let Some(upstream) = &egress.upstream {
            if let Err(e) = parse_url(upstream) {
                errors.push(ValidationError::new("egress.upstream", e.to_string()));
            }
        }
    }

    let method = config.envelope.method.to_ascii_uppercase();
    if !KNOWN_METHODS.contains(&method.as_str()) {
        errors.push(ValidationError::new(
            "envelope.method",
            format!("{:?} is not one of {}", config.envelope.method, KNOWN_METHODS.join(", ")),
        ));
    }
    if method == "CONNECT" {
        errors.push(ValidationError::new(
            "envelope.method",
            "CONNECT cannot carry an envelope body",
        ));
    }

    if config.timeouts.connect_secs == Some(0) {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled {
        check_bind(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("{:?}: {}", value, e)));
    }
}

fn check_limit(field: &str, value: usize, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}
