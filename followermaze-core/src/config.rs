use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Port clients connect to
    pub client_port: u16,
    /// Port the event source connects to
    pub event_source_port: u16,
    /// Port serving `/metrics`
    pub metrics_port: u16,
    pub enable_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            client_port: 9099,
            event_source_port: 9090,
            metrics_port: 8080,
            enable_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Depth of each client's outbound delivery queue. A client whose queue
    /// is full misses the message instead of stalling dispatch.
    pub client_queue_depth: usize,
    /// Longest accepted record or handshake line, in bytes
    pub max_line_length: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_queue_depth: 1024,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // FOLLOWERMAZE_SERVER__CLIENT_PORT=9099, FOLLOWERMAZE_LOGGING__LEVEL=debug, ...
        builder = builder.add_source(
            Environment::with_prefix("FOLLOWERMAZE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check for values the server cannot start with
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut ports = vec![
            ("client_port", self.server.client_port),
            ("event_source_port", self.server.event_source_port),
        ];
        // Only bound when the endpoint is enabled
        if self.server.enable_metrics {
            ports.push(("metrics_port", self.server.metrics_port));
        }
        for (name, port) in ports {
            if port == 0 {
                errors.push(format!("server.{name} must be non-zero"));
            }
        }
        if self.server.client_port == self.server.event_source_port {
            errors.push("server.client_port and server.event_source_port must differ".to_string());
        }
        if self.server.enable_metrics
            && (self.server.metrics_port == self.server.client_port
                || self.server.metrics_port == self.server.event_source_port)
        {
            errors.push("server.metrics_port collides with a listener port".to_string());
        }

        if self.hub.client_queue_depth == 0 {
            errors.push("hub.client_queue_depth must be at least 1".to_string());
        }
        if self.hub.max_line_length < 4 {
            errors.push("hub.max_line_length must be at least 4".to_string());
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level {:?} is not a log level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!("logging.format {:?} must be json or pretty", self.logging.format));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get client listener address
    #[must_use]
    pub fn client_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.client_port)
    }

    /// Get event source listener address
    #[must_use]
    pub fn event_source_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.event_source_port)
    }

    /// Get metrics listener address
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.metrics_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.client_port, 9099);
        assert_eq!(config.server.event_source_port, 9090);
        assert!(config.hub.client_queue_depth > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_addresses() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(config.client_address(), "127.0.0.1:9099");
        assert_eq!(config.event_source_address(), "127.0.0.1:9090");
        assert_eq!(config.metrics_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = Config {
            server: ServerConfig {
                client_port: 9000,
                event_source_port: 9000,
                ..Default::default()
            },
            hub: HubConfig {
                client_queue_depth: 0,
                ..Default::default()
            },
            logging: LoggingConfig {
                level: "loud".to_string(),
                ..Default::default()
            },
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("must differ")));
        assert!(errors.iter().any(|e| e.contains("client_queue_depth")));
        assert!(errors.iter().any(|e| e.contains("loud")));
    }

    #[test]
    fn test_metrics_port_ignored_when_disabled() {
        let mut config = Config {
            server: ServerConfig {
                metrics_port: 0,
                enable_metrics: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.server.enable_metrics = true;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors, vec!["server.metrics_port must be non-zero".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "server:\n  client_port: 7001\n  event_source_port: 7002\nhub:\n  client_queue_depth: 16\n"
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.client_port, 7001);
        assert_eq!(config.server.event_source_port, 7002);
        assert_eq!(config.hub.client_queue_depth, 16);
        // Untouched sections keep their defaults
        assert_eq!(config.server.metrics_port, 8080);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::from_file("/nonexistent/followermaze.yaml").unwrap();
        assert_eq!(config.server.client_port, ServerConfig::default().client_port);
    }
}
