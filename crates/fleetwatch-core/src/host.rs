//! Host records as seen by the monitoring subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host identifier.
pub type HostId = i64;

/// A remote machine running the compose stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    pub name: String,
    /// Network address the remote shell connects to.
    pub address: String,
    pub port: u16,
    /// Compose file name that wires the test database.
    pub base_config: Option<String>,
    /// Compose file name that wires the production database.
    pub prod_config: Option<String>,
    /// Last successful source pull.
    pub last_update: Option<DateTime<Utc>>,
    /// Last CI-reported commit and when it finished.
    pub last_commit: Option<DateTime<Utc>>,
    pub commit_hash: Option<String>,
}

impl HostRecord {
    /// Create a record with no configuration names and no history.
    #[must_use]
    pub fn new(id: HostId, name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            port,
            base_config: None,
            prod_config: None,
            last_update: None,
            last_commit: None,
            commit_hash: None,
        }
    }

    #[must_use]
    pub fn with_configs(mut self, base: impl Into<String>, prod: impl Into<String>) -> Self {
        self.base_config = Some(base.into());
        self.prod_config = Some(prod.into());
        self
    }

    /// Connection endpoint for this host.
    #[must_use]
    pub fn target(&self) -> SshTarget {
        SshTarget {
            address: self.address.clone(),
            port: self.port,
        }
    }

    /// Base compose file name, if one is set.
    #[must_use]
    pub fn base_config(&self) -> Option<&str> {
        self.base_config.as_deref().filter(|s| !s.is_empty())
    }

    /// Production compose file name, if one is set.
    #[must_use]
    pub fn prod_config(&self) -> Option<&str> {
        self.prod_config.as_deref().filter(|s| !s.is_empty())
    }
}

/// Address and port of a remote shell endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SshTarget {
    pub address: String,
    pub port: u16,
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_names_are_unset() {
        let host = HostRecord::new(1, "staging", "10.0.0.5", 22).with_configs("", "docker-prod.yml");
        assert_eq!(host.base_config(), None);
        assert_eq!(host.prod_config(), Some("docker-prod.yml"));
    }

    #[test]
    fn test_target_display() {
        let host = HostRecord::new(1, "staging", "10.0.0.5", 2222);
        assert_eq!(host.target().to_string(), "10.0.0.5:2222");
    }
}
