//! Tracing configuration types.

use serde::Deserialize;

/// `[tracing]` section: log filter and format, optional OTLP export.
#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Collector endpoint, e.g. "http://collector:4317". Unset disables export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default)]
    pub protocol: OtlpProtocol,

    /// Log level filter (e.g. "info", "debug", "host_redirect=debug,info").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// Shape of the log lines written to stderr.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

fn default_service_name() -> String {
    "host-redirect".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            otlp_endpoint: None,
            protocol: OtlpProtocol::default(),
            log_level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_section_uses_defaults() {
        let config: TracingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service_name, "host-redirect");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.protocol, OtlpProtocol::Grpc);
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_enums_are_lowercase() {
        let config: TracingConfig = serde_json::from_str(
            r#"{"protocol": "http", "otlp_endpoint": "http://c:4318", "format": "json"}"#,
        )
        .unwrap();
        assert_eq!(config.protocol, OtlpProtocol::Http);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://c:4318"));
    }
}
