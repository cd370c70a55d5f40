//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    let config: RelayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Cipher, Packaging};

    const SAMPLE: &str = r#"
[ingress]
bind_address = "127.0.0.1:7000"
next_hop = "proxy.corp.example:3128"
absolute_form = true

[ingress.credentials]
username = "svc"
password = "hunter2"

[egress]
bind_address = "0.0.0.0:7001"
allow_list = ['^PUT /sync', '(?mi)^x-client: relay']
insecure_skip_verify = true

[egress.reverse_proxy]
host = "intranet.example"
port = 80

[envelope]
package = "file"
cipher = "hex"
method = "PUT"
path = "/sync"

[timeouts]
connect_secs = 10
"#;

    #[test]
    fn parses_full_file() {
        let config = parse_config(SAMPLE).unwrap();

        let ingress = config.ingress.unwrap();
        assert_eq!(ingress.next_hop, "proxy.corp.example:3128");
        assert!(ingress.absolute_form);
        assert_eq!(ingress.credentials.unwrap().username, "svc");
        assert_eq!(ingress.max_connections, 1024);

        let egress = config.egress.unwrap();
        assert_eq!(egress.allow_list.len(), 2);
        assert!(egress.insecure_skip_verify);
        assert_eq!(egress.reverse_proxy.host, "intranet.example");

        assert_eq!(config.envelope.package, Packaging::File);
        assert_eq!(config.envelope.cipher, Cipher::Hex);
        assert_eq!(config.timeouts.connect_secs, Some(10));
        assert_eq!(config.timeouts.drain_secs, 5);
    }

    #[test]
    fn missing_sections_stay_disabled() {
        let config = parse_config("[egress]\nbind_address = \"127.0.0.1:9001\"\n").unwrap();
        assert!(config.ingress.is_none());
        assert!(config.egress.is_some());
    }

    #[test]
    fn unknown_cipher_is_a_parse_error() {
        let err = parse_config("[egress]\n[envelope]\ncipher = \"rot13\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("[ingress]\nmax_connections = 0\n").unwrap_err();
        assert!(err.to_string().contains("ingress.max_connections"));
    }
}
