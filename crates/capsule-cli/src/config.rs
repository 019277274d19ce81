//! TOML configuration for `gemini serve`.
//!
//! ```toml
//! port = 1965
//! readTimeout = "5s"
//! writeTimeout = "10s"
//!
//! [domain."example.org"]
//! path = "content/example.org"
//! certFilePath = "certs/example.org.crt"
//! keyFilePath = "certs/example.org.key"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 1965;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "certFilePath")]
    pub cert_file_path: String,
    #[serde(default, rename = "keyFilePath")]
    pub key_file_path: String,
}

impl DomainConfig {
    fn problems(&self, name: &str, problems: &mut Vec<String>) {
        if self.path.is_empty() {
            problems.push(format!("{name}: no path configured"));
        }
        if self.cert_file_path.is_empty() {
            problems.push(format!("{name}: no cert file configured"));
        }
        if self.key_file_path.is_empty() {
            problems.push(format!("{name}: no key file configured"));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub domains: HashMap<String, DomainConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    port: Option<u16>,
    #[serde(rename = "readTimeout")]
    read_timeout: Option<String>,
    #[serde(rename = "writeTimeout")]
    write_timeout: Option<String>,
    #[serde(default)]
    domain: HashMap<String, DomainConfig>,
}

/// Parses and validates configuration text. Missing top-level fields fall
/// back to the defaults; a config without domains, or a domain missing any
/// of its three fields, is an error.
pub fn load_config(text: &str) -> Result<ServerConfig> {
    let raw: RawConfig = toml::from_str(text).context("invalid config")?;
    let config = ServerConfig {
        port: raw.port.unwrap_or(DEFAULT_PORT),
        read_timeout: optional_duration(raw.read_timeout.as_deref())?
            .unwrap_or(DEFAULT_READ_TIMEOUT),
        write_timeout: optional_duration(raw.write_timeout.as_deref())?
            .unwrap_or(DEFAULT_WRITE_TIMEOUT),
        domains: raw.domain,
    };
    config.validate()?;
    Ok(config)
}

pub fn load_config_file(path: &Path) -> Result<ServerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("invalid config path: {}", path.display()))?;
    load_config(&text)
}

fn optional_duration(raw: Option<&str>) -> Result<Option<Duration>> {
    raw.map(|text| parse_duration(text).map_err(anyhow::Error::msg))
        .transpose()
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.domains.is_empty() {
            bail!("no domains configured");
        }
        let mut problems = Vec::new();
        let mut names: Vec<&String> = self.domains.keys().collect();
        names.sort();
        for name in names {
            self.domains[name].problems(name, &mut problems);
        }
        if !problems.is_empty() {
            bail!("{}", problems.join("; "));
        }
        Ok(())
    }
}

/// Parses Go-style duration strings: one or more `<number><unit>` terms,
/// e.g. `5s`, `1m30s`, `500ms`.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration {text:?}"))?;
        if number_len == 0 {
            return Err(format!("invalid duration {text:?}"));
        }
        let (number, after) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number in duration {text:?}"))?;
        let unit_len = after
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(format!("unknown unit {unit:?} in duration {text:?}")),
        };
        total += Duration::from_secs_f64(value * scale);
        rest = next;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_an_error() {
        let err = load_config("").expect_err("no domains");
        assert!(err.to_string().contains("no domains configured"));
    }

    #[test]
    fn full_config_parses_with_overrides() {
        let config = load_config(
            r#"
port = 1966
readTimeout = "15s"
writeTimeout = "1m"

[domain.localhost]
path = "localhost/gemini"
certFilePath = "certs/localhost.cert"
keyFilePath = "certs/localhost.key"

[domain.domainb]
path = "domainb/gemini"
certFilePath = "certs/domainb.cert"
keyFilePath = "certs/domainb.key"
"#,
        )
        .expect("config");
        assert_eq!(config.port, 1966);
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.write_timeout, Duration::from_secs(60));
        assert_eq!(config.domains.len(), 2);
        assert_eq!(
            config.domains["localhost"],
            DomainConfig {
                path: "localhost/gemini".to_string(),
                cert_file_path: "certs/localhost.cert".to_string(),
                key_file_path: "certs/localhost.key".to_string(),
            }
        );
    }

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let config = load_config(
            r#"
[domain.localhost]
path = "."
certFilePath = "server.crt"
keyFilePath = "server.key"
"#,
        )
        .expect("config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn missing_domain_fields_are_reported_together() {
        let err = load_config(
            r#"
[domain.localhost]
path = "."
"#,
        )
        .expect_err("invalid domain");
        let message = err.to_string();
        assert!(message.contains("localhost: no cert file configured"));
        assert!(message.contains("localhost: no key file configured"));
    }

    #[test]
    fn durations_parse_like_go() {
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5parsecs").is_err());
    }
}
