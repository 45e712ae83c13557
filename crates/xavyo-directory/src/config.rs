//! Directory configuration
//!
//! The configuration document has two sections: `sources`, the named LDAP
//! backends, and `dit`, the base DNs keyed in declaration order with the
//! entity names that map to them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{DirectoryError, DirectoryResult};

/// Environment variable that overrides the configuration file path.
pub const CONFIG_PATH_ENV: &str = "XAVYO_DIRECTORY_CONFIG";

/// Configuration file path used when the environment does not name one.
pub const DEFAULT_CONFIG_PATH: &str = "conf/Config.yaml";

/// Root directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Named LDAP backends.
    pub sources: HashMap<String, SourceConfig>,

    /// DIT locations, in the order they were declared.
    #[serde(deserialize_with = "ordered_locations")]
    pub dit: Vec<DitLocation>,
}

/// Connection settings for one named LDAP backend.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    /// LDAP server hostname or IP address.
    pub address: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port", deserialize_with = "port_number")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(rename = "useSSL", default)]
    pub use_ssl: bool,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    #[serde(rename = "bindDN")]
    pub bind_dn: String,

    /// Bind password.
    #[serde(default)]
    pub bind_password: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// One configured directory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DitLocation {
    /// Subtree root searched for this entity type.
    pub base_dn: String,
    /// Name that resolves to a single entry (e.g. "person").
    pub singular: String,
    /// Name that resolves to a list of entries (e.g. "people").
    pub plural: String,
    /// Identifier of the source that holds this subtree.
    pub source: String,
}

#[derive(Deserialize)]
struct LocationFields {
    singular: String,
    plural: String,
    source: String,
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connect_timeout() -> u64 {
    30
}

/// Collect the `dit` mapping into a list, keeping the document order.
fn ordered_locations<'de, D>(deserializer: D) -> Result<Vec<DitLocation>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LocationsVisitor;

    impl<'de> Visitor<'de> for LocationsVisitor {
        type Value = Vec<DitLocation>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of base DN to {singular, plural, source}")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut locations = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((base_dn, fields)) = map.next_entry::<String, LocationFields>()? {
                locations.push(DitLocation {
                    base_dn,
                    singular: fields.singular,
                    plural: fields.plural,
                    source: fields.source,
                });
            }
            Ok(locations)
        }
    }

    deserializer.deserialize_map(LocationsVisitor)
}

/// Accept the port as either a YAML integer or a quoted string.
fn port_number<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port: {text:?}"))),
    }
}

impl SourceConfig {
    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.address, self.port)
    }

    /// Get the bind password, empty when none is configured.
    pub fn password(&self) -> &str {
        self.bind_password.as_deref().unwrap_or("")
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }
}

impl DirectoryConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| DirectoryError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> DirectoryResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| {
            DirectoryError::invalid_configuration(format!("failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the path named by the environment, or the default path.
    pub fn load() -> DirectoryResult<Self> {
        Self::from_file(Self::config_path())
    }

    /// Get the configuration file path from environment or default.
    pub fn config_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Look up a source by identifier.
    pub fn source(&self, source_id: &str) -> DirectoryResult<&SourceConfig> {
        self.sources
            .get(source_id)
            .ok_or_else(|| DirectoryError::UnknownSource {
                source_id: source_id.to_string(),
            })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        for (id, source) in &self.sources {
            if source.address.is_empty() {
                return Err(DirectoryError::invalid_configuration(format!(
                    "source '{id}': address is required"
                )));
            }
            if source.port == 0 {
                return Err(DirectoryError::invalid_configuration(format!(
                    "source '{id}': port must be non-zero"
                )));
            }
        }

        let mut names = HashSet::new();
        let mut base_dns = HashSet::new();
        for location in &self.dit {
            if location.base_dn.is_empty() {
                return Err(DirectoryError::invalid_configuration(
                    "dit: base DN must not be empty",
                ));
            }
            if !base_dns.insert(location.base_dn.to_ascii_lowercase()) {
                return Err(DirectoryError::invalid_configuration(format!(
                    "dit: base DN '{}' is declared twice",
                    location.base_dn
                )));
            }
            if location.singular.is_empty() || location.plural.is_empty() {
                return Err(DirectoryError::invalid_configuration(format!(
                    "dit '{}': singular and plural names are required",
                    location.base_dn
                )));
            }
            if location.singular == location.plural {
                return Err(DirectoryError::invalid_configuration(format!(
                    "dit '{}': singular and plural names must differ",
                    location.base_dn
                )));
            }
            for name in [&location.singular, &location.plural] {
                if !names.insert(name.as_str()) {
                    return Err(DirectoryError::invalid_configuration(format!(
                        "dit '{}': entity name '{}' is already mapped",
                        location.base_dn, name
                    )));
                }
            }
            if !self.sources.contains_key(&location.source) {
                return Err(DirectoryError::invalid_configuration(format!(
                    "dit '{}': source '{}' is not declared",
                    location.base_dn, location.source
                )));
            }
        }

        Ok(())
    }
}
