//! Directory session
//!
//! Owns one bound connection per source identifier, opened on first use, and
//! runs find/add/delete/modify against the location an entity name resolves
//! to.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientConnector, DirectoryClient, Outcome};
use crate::config::{DirectoryConfig, SourceConfig};
use crate::entry::{AttributeMap, Entry};
use crate::error::{DirectoryError, DirectoryResult};
use crate::ldap::Ldap3Connector;
use crate::schema::{Cardinality, SchemaResolver};

/// LDAP result code for invalid credentials.
const INVALID_CREDENTIALS: u32 = 49;

type ConnectionSlot = Arc<OnceCell<Arc<dyn DirectoryClient>>>;

/// Entries returned by [`DirectorySession::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    /// Singular lookup: the first match, if any.
    One(Option<Entry>),
    /// Plural lookup: every match in result order.
    Many(Vec<Entry>),
}

impl Found {
    /// Cardinality of the lookup that produced this result.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            Found::One(_) => Cardinality::Singular,
            Found::Many(_) => Cardinality::Plural,
        }
    }

    /// Number of entries found.
    pub fn len(&self) -> usize {
        match self {
            Found::One(entry) => usize::from(entry.is_some()),
            Found::Many(entries) => entries.len(),
        }
    }

    /// Check if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single entry, or the first of many.
    pub fn into_entry(self) -> Option<Entry> {
        match self {
            Found::One(entry) => entry,
            Found::Many(entries) => entries.into_iter().next(),
        }
    }

    /// Every entry found, in result order.
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Found::One(entry) => entry.into_iter().collect(),
            Found::Many(entries) => entries,
        }
    }
}

/// A session against the configured directory sources.
///
/// Connections are opened and bound the first time a source is used and then
/// kept until [`DirectorySession::close`] is called or the session is dropped.
/// They are never re-bound or checked for staleness.
pub struct DirectorySession<C = Ldap3Connector> {
    config: DirectoryConfig,
    resolver: SchemaResolver,
    connector: C,
    connections: Mutex<HashMap<String, ConnectionSlot>>,
}

impl DirectorySession<Ldap3Connector> {
    /// Create a session that connects with `ldap3`.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        Self::with_connector(config, Ldap3Connector)
    }

    /// Create a session from a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> DirectoryResult<Self> {
        Self::new(DirectoryConfig::from_file(path)?)
    }

    /// Create a session from the configuration file named by the environment.
    pub fn load() -> DirectoryResult<Self> {
        Self::new(DirectoryConfig::load()?)
    }
}

impl<C: ClientConnector> DirectorySession<C> {
    /// Create a session that opens connections through `connector`.
    pub fn with_connector(config: DirectoryConfig, connector: C) -> DirectoryResult<Self> {
        config.validate()?;
        let resolver = SchemaResolver::from_config(&config);

        Ok(Self {
            config,
            resolver,
            connector,
            connections: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Get the bound connection for a source, opening it if necessary.
    ///
    /// Concurrent first use of a source opens and binds once. A failed bind
    /// is returned to the caller and not cached.
    #[instrument(skip(self))]
    pub async fn connection(&self, source_id: &str) -> DirectoryResult<Arc<dyn DirectoryClient>> {
        let source = self.config.source(source_id)?;

        let slot = {
            let mut connections = self.connections.lock().await;
            connections.entry(source_id.to_string()).or_default().clone()
        };

        let client = slot
            .get_or_try_init(|| self.establish(source_id, source))
            .await?;

        Ok(Arc::clone(client))
    }

    async fn establish(
        &self,
        source_id: &str,
        source: &SourceConfig,
    ) -> DirectoryResult<Arc<dyn DirectoryClient>> {
        let url = source.url();
        let client = self.connector.open(source_id, &url, source).await?;

        debug!(bind_dn = %source.bind_dn, "Performing LDAP bind");

        if let Err(e) = client.simple_bind(&source.bind_dn, source.password()).await {
            if let Err(unbind_err) = client.unbind().await {
                warn!(error = %unbind_err, "Error closing connection after failed bind");
            }
            return Err(bind_error(source_id, &source.bind_dn, e));
        }

        info!(source = %source_id, url = %url, "Directory connection established");
        Ok(client)
    }

    /// Find entries of `entity` matching an LDAP filter.
    ///
    /// A singular entity name yields [`Found::One`] with the first match, or
    /// `None` when nothing matches. A plural name yields [`Found::Many`] with
    /// every match, possibly none.
    #[instrument(skip(self))]
    pub async fn find(&self, entity: &str, filter: &str) -> DirectoryResult<Found> {
        let resolution = self.resolver.resolve(entity)?;
        let client = self.connection(resolution.source).await?;

        debug!(base_dn = %resolution.base_dn, "Searching directory");
        let rows = client.search(resolution.base_dn, filter).await?;

        let mut entries = rows
            .into_iter()
            .map(|row| Entry::new(row.dn, row.attributes, entity));
        let found = match resolution.cardinality {
            Cardinality::Singular => Found::One(entries.next()),
            Cardinality::Plural => Found::Many(entries.collect()),
        };

        debug!(found = found.len(), "Directory search completed");
        Ok(found)
    }

    /// Add an entry at `dn` on the source that holds `entity`.
    ///
    /// `dn` is not checked against the entity's base DN.
    #[instrument(skip(self, attributes))]
    pub async fn add(
        &self,
        entity: &str,
        dn: &str,
        attributes: &AttributeMap,
    ) -> DirectoryResult<Outcome> {
        let resolution = self.resolver.resolve(entity)?;
        let client = self.connection(resolution.source).await?;

        client.add(dn, attributes).await
    }

    /// Delete the entry at `dn` on the source that holds `entity`.
    #[instrument(skip(self))]
    pub async fn delete(&self, entity: &str, dn: &str) -> DirectoryResult<Outcome> {
        let resolution = self.resolver.resolve(entity)?;
        let client = self.connection(resolution.source).await?;

        client.delete(dn).await
    }

    /// Send an entry's pending modifications, in the order they were made.
    ///
    /// The entry's modification log is left as it is; calling this twice
    /// sends the same changes twice.
    #[instrument(skip(self, entry), fields(dn = %entry.dn(), entity = %entry.entity()))]
    pub async fn modify(&self, entry: &Entry) -> DirectoryResult<Outcome> {
        let resolution = self.resolver.resolve(entry.entity())?;
        let client = self.connection(resolution.source).await?;

        client.modify(entry.dn(), entry.modifications()).await
    }

    /// Unbind and forget every open connection.
    pub async fn close(&self) -> DirectoryResult<()> {
        let connections: Vec<(String, ConnectionSlot)> =
            self.connections.lock().await.drain().collect();

        for (source_id, slot) in connections {
            if let Some(client) = slot.get() {
                if let Err(e) = client.unbind().await {
                    warn!(source = %source_id, error = %e, "Error during LDAP unbind");
                }
            }
        }

        info!("Directory session closed");
        Ok(())
    }
}

impl<C> std::fmt::Debug for DirectorySession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Classify a bind failure as a connection error.
fn bind_error(source_id: &str, bind_dn: &str, err: DirectoryError) -> DirectoryError {
    match err {
        DirectoryError::Rejected {
            rc: INVALID_CREDENTIALS,
            ..
        } => DirectoryError::AuthenticationFailed {
            source_id: source_id.to_string(),
        },
        e if e.is_connection_error() => e,
        e => DirectoryError::connection_failed_with_source(
            source_id,
            format!("bind failed for {bind_dn}"),
            e,
        ),
    }
}
