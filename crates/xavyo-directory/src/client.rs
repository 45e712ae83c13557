//! Directory protocol client traits
//!
//! The session talks to the directory only through these traits. The
//! production implementation over `ldap3` lives in [`crate::ldap`]; tests plug
//! in an in-memory directory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::entry::{AttributeMap, Modification};
use crate::error::DirectoryResult;

/// One (dn, attributes) row of a search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub dn: String,
    pub attributes: AttributeMap,
}

impl SearchRow {
    pub fn new(dn: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }
}

/// Status reported by the directory for a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// LDAP result code (0 on success).
    pub rc: u32,
    /// Matched DN, when the server returns one.
    pub matched: String,
    /// Diagnostic message from the server.
    pub text: String,
}

impl Outcome {
    /// A plain success result.
    pub fn success() -> Self {
        Self::default()
    }
}

/// An open connection to one directory server.
///
/// Every call completes its round trip before returning. Non-success result
/// codes are reported as [`crate::DirectoryError::Rejected`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Perform a simple bind.
    async fn simple_bind(&self, bind_dn: &str, password: &str) -> DirectoryResult<Outcome>;

    /// Search the subtree rooted at `base_dn`, returning all user attributes.
    async fn search(&self, base_dn: &str, filter: &str) -> DirectoryResult<Vec<SearchRow>>;

    /// Add a new entry.
    ///
    /// The values of each attribute are sent as a set: their order is not
    /// kept and duplicates collapse to one value.
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> DirectoryResult<Outcome>;

    /// Delete an entry.
    async fn delete(&self, dn: &str) -> DirectoryResult<Outcome>;

    /// Apply modifications to an entry, in order.
    ///
    /// The values within one modification are sent as a set: their order is
    /// not kept and duplicates collapse to one value.
    async fn modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<Outcome>;

    /// Close the connection.
    async fn unbind(&self) -> DirectoryResult<()>;
}

/// Opens connections from a connection URL.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Open an unbound connection to `url` using the source's settings.
    async fn open(
        &self,
        source_id: &str,
        url: &str,
        source: &SourceConfig,
    ) -> DirectoryResult<Arc<dyn DirectoryClient>>;
}
