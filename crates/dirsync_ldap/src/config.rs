//! Connection configuration for the LDAP directory client.

use std::time::Duration;

use thiserror::Error;

use dirsync_core::{attributes, AffiliationRecord};

/// A configuration problem detected before any connection attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The server URL is empty.
    #[error("server URL must not be empty")]
    MissingUrl,

    /// The server URL does not use an LDAP scheme.
    #[error("server URL '{0}' must start with ldap:// or ldaps://")]
    InvalidScheme(String),

    /// The page size is zero.
    #[error("page size must be at least 1")]
    ZeroPageSize,

    /// A bind DN was given without a password, or vice versa.
    #[error("bind DN and bind password must be given together")]
    PartialBindCredentials,
}

/// Settings for one LDAP connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server URL (`ldap://host:port` or `ldaps://host:port`).
    pub url: String,
    /// DN to bind as; `None` for an anonymous bind.
    pub bind_dn: Option<String>,
    /// Password for the bind DN.
    pub bind_password: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Maximum entries per page of a paged search.
    pub page_size: u32,
}

impl ConnectionConfig {
    /// Creates a configuration for an anonymous connection to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bind_dn: None,
            bind_password: None,
            connect_timeout: Duration::from_secs(30),
            page_size: attributes::DEFAULT_PAGE_SIZE,
        }
    }

    /// Derives a configuration from an affiliation record's connection
    /// fields (an empty bind user means an anonymous bind).
    pub fn from_affiliation(record: &AffiliationRecord) -> Self {
        let mut config = Self::new(record.url.clone());
        if !record.bind_user.is_empty() {
            config = config.with_simple_bind(record.bind_user.clone(), record.bind_password.clone());
        }
        config
    }

    /// Sets simple-bind credentials.
    pub fn with_simple_bind(
        mut self,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_password = Some(bind_password.into());
        self
    }

    /// Sets the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the paged-search page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Checks the configuration for problems a connection attempt could
    /// only report confusingly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !self.url.starts_with("ldap://") && !self.url.starts_with("ldaps://") {
            return Err(ConfigError::InvalidScheme(self.url.clone()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.bind_dn.is_some() != self.bind_password.is_some() {
            return Err(ConfigError::PartialBindCredentials);
        }
        Ok(())
    }
}
