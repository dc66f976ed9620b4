/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per-account proxy configuration.
//!
//! Validation happens here, before any side effect; applying the rules to a
//! session store is the session provider's job. A rejected config never
//! blocks an account from loading — the provider falls back to a direct
//! connection and reports the rejection as an advisory.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
    Socks4,
}

impl ProxyProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks5 => "socks5",
            Self::Socks4 => "socks4",
        }
    }
}

impl std::str::FromStr for ProxyProtocol {
    type Err = ProxyConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            "socks4" => Ok(Self::Socks4),
            other => Err(ProxyConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyConfigError {
    #[error("unsupported proxy protocol {0:?}")]
    UnsupportedProtocol(String),
    #[error("proxy host is empty")]
    EmptyHost,
    #[error("proxy port must be in 1..=65535")]
    InvalidPort,
    #[error("proxy username and password must be given together")]
    PartialCredentials,
}

/// Proxy settings as stored on an account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Validate shape only; reachability is not this layer's concern.
    pub fn validate(&self) -> Result<(), ProxyConfigError> {
        if self.host.trim().is_empty() {
            return Err(ProxyConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ProxyConfigError::InvalidPort);
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ProxyConfigError::PartialCredentials);
        }
        Ok(())
    }

    /// Resolve into the rules handed to a session store. Fails on the same
    /// conditions as [`Self::validate`].
    pub fn to_rules(&self) -> Result<ProxyRules, ProxyConfigError> {
        self.validate()?;
        Ok(ProxyRules {
            proxy_url: format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// Validated, ready-to-apply proxy rules for a session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRules {
    pub proxy_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(protocol: ProxyProtocol, host: &str, port: u16) -> ProxyConfig {
        ProxyConfig {
            protocol,
            host: host.to_string(),
            port,
            username: None,
            password: None,
        }
    }

    #[test]
    fn valid_socks5_config_resolves_to_rules() {
        let rules = config(ProxyProtocol::Socks5, "127.0.0.1", 1080)
            .to_rules()
            .expect("valid config");
        assert_eq!(rules.proxy_url, "socks5://127.0.0.1:1080");
        assert!(rules.username.is_none());
    }

    #[test]
    fn empty_host_is_rejected() {
        assert_eq!(
            config(ProxyProtocol::Socks5, "", 1080).validate(),
            Err(ProxyConfigError::EmptyHost)
        );
        assert_eq!(
            config(ProxyProtocol::Http, "   ", 8080).validate(),
            Err(ProxyConfigError::EmptyHost)
        );
    }

    #[test]
    fn zero_port_is_rejected() {
        assert_eq!(
            config(ProxyProtocol::Http, "proxy.test", 0).validate(),
            Err(ProxyConfigError::InvalidPort)
        );
    }

    #[test]
    fn credentials_must_come_in_pairs() {
        let mut cfg = config(ProxyProtocol::Https, "proxy.test", 443);
        cfg.username = Some("user".into());
        assert_eq!(cfg.validate(), Err(ProxyConfigError::PartialCredentials));
        cfg.password = Some("pass".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn protocol_parses_case_insensitively() {
        assert_eq!("SOCKS5".parse::<ProxyProtocol>(), Ok(ProxyProtocol::Socks5));
        assert!(matches!(
            "ftp".parse::<ProxyProtocol>(),
            Err(ProxyConfigError::UnsupportedProtocol(_))
        ));
    }
}
