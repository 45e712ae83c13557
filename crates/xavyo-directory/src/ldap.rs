//! LDAP client over `ldap3`
//!
//! Implements [`ClientConnector`] and [`DirectoryClient`] with an async `ldap3`
//! connection whose driver runs on a spawned task.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::asn1::StructureTag;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, ResultEntry, Scope};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientConnector, DirectoryClient, Outcome, SearchRow};
use crate::config::SourceConfig;
use crate::entry::{AttributeMap, ModOp, Modification};
use crate::error::{DirectoryError, DirectoryResult};

/// LDAP message tag of a SearchResultEntry (RFC 4511 §4.5.2).
const SEARCH_RESULT_ENTRY: u64 = 4;

/// Opens `ldap3` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Connector;

#[async_trait]
impl ClientConnector for Ldap3Connector {
    #[instrument(skip(self, source))]
    async fn open(
        &self,
        source_id: &str,
        url: &str,
        source: &SourceConfig,
    ) -> DirectoryResult<Arc<dyn DirectoryClient>> {
        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new().set_conn_timeout(source.connect_timeout());

        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    source_id,
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(Arc::new(Ldap3Client { ldap }))
    }
}

/// A connection opened by [`Ldap3Connector`].
///
/// `ldap3::Ldap` is a cheap handle onto the driver task, so each call works on
/// its own clone.
#[derive(Clone)]
pub struct Ldap3Client {
    ldap: Ldap,
}

impl std::fmt::Debug for Ldap3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldap3Client").finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectoryClient for Ldap3Client {
    #[instrument(skip(self, password))]
    async fn simple_bind(&self, bind_dn: &str, password: &str) -> DirectoryResult<Outcome> {
        let mut ldap = self.ldap.clone();
        let result = ldap.simple_bind(bind_dn, password).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(
                "bind",
                format!("LDAP bind failed for {bind_dn}"),
                e,
            )
        })?;

        outcome("bind", result)
    }

    #[instrument(skip(self))]
    async fn search(&self, base_dn: &str, filter: &str) -> DirectoryResult<Vec<SearchRow>> {
        let mut ldap = self.ldap.clone();
        let ldap3::SearchResult(entries, result) = ldap
            .search(base_dn, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(|e| {
                DirectoryError::operation_failed_with_source("search", "LDAP search failed", e)
            })?;
        outcome("search", result)?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(row) = decode_entry(entry)? {
                rows.push(row);
            }
        }

        debug!(returned = rows.len(), "LDAP search completed");
        Ok(rows)
    }

    #[instrument(skip(self, attributes))]
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> DirectoryResult<Outcome> {
        let mut ldap = self.ldap.clone();
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .iter()
            .map(|(name, values)| (name.as_bytes().to_vec(), values.iter().cloned().collect()))
            .collect();

        let result = ldap.add(dn, attrs).await.map_err(|e| {
            DirectoryError::operation_failed_with_source("add", format!("failed to add {dn}"), e)
        })?;

        let outcome = outcome("add", result)?;
        info!(dn = %dn, "LDAP entry added");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> DirectoryResult<Outcome> {
        let mut ldap = self.ldap.clone();
        let result = ldap.delete(dn).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(
                "delete",
                format!("failed to delete {dn}"),
                e,
            )
        })?;

        let outcome = outcome("delete", result)?;
        info!(dn = %dn, "LDAP entry deleted");
        Ok(outcome)
    }

    #[instrument(skip(self, modifications))]
    async fn modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<Outcome> {
        let mut ldap = self.ldap.clone();
        let mods: Vec<Mod<Vec<u8>>> = modifications.iter().map(to_ldap_mod).collect();

        let result = ldap.modify(dn, mods).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(
                "modify",
                format!("failed to modify {dn}"),
                e,
            )
        })?;

        let outcome = outcome("modify", result)?;
        info!(dn = %dn, changes = modifications.len(), "LDAP entry modified");
        Ok(outcome)
    }

    async fn unbind(&self) -> DirectoryResult<()> {
        let mut ldap = self.ldap.clone();
        ldap.unbind().await.map_err(|e| {
            DirectoryError::operation_failed_with_source("unbind", "LDAP unbind failed", e)
        })
    }
}

/// Turn an LDAP result into an [`Outcome`], rejecting non-success codes.
fn outcome(operation: &'static str, result: LdapResult) -> DirectoryResult<Outcome> {
    if result.rc != 0 {
        return Err(DirectoryError::Rejected {
            operation,
            rc: result.rc,
            text: result.text,
        });
    }

    Ok(Outcome {
        rc: result.rc,
        matched: result.matched,
        text: result.text,
    })
}

/// Values become a `HashSet`, which drops their order and any duplicates.
fn to_ldap_mod(modification: &Modification) -> Mod<Vec<u8>> {
    let name = modification.attribute.as_bytes().to_vec();
    let values: HashSet<Vec<u8>> = modification
        .values
        .iter()
        .flatten()
        .cloned()
        .collect();

    match modification.op {
        ModOp::Delete => Mod::Delete(name, values),
        ModOp::Replace => Mod::Replace(name, values),
    }
}

/// Decode a search result entry, keeping attribute and value order.
///
/// `ldap3::SearchEntry` collects attributes into a `HashMap`, which loses
/// the order the server sent them in, so the entry is read from its ASN.1
/// structure directly. Referrals and intermediate messages yield `None`.
fn decode_entry(entry: ResultEntry) -> DirectoryResult<Option<SearchRow>> {
    if entry.is_ref() || entry.is_intermediate() {
        debug!("Skipping non-entry search result");
        return Ok(None);
    }

    let malformed = || DirectoryError::operation_failed("search", "malformed search result entry");

    let mut parts = entry
        .0
        .match_id(SEARCH_RESULT_ENTRY)
        .and_then(StructureTag::expect_constructed)
        .ok_or_else(malformed)?
        .into_iter();

    let dn = octet_string(parts.next(), "entry DN")?;

    let mut attributes = AttributeMap::new();
    let list = parts
        .next()
        .and_then(StructureTag::expect_constructed)
        .ok_or_else(malformed)?;
    for attribute in list {
        let mut pair = attribute
            .expect_constructed()
            .ok_or_else(malformed)?
            .into_iter();
        let name = octet_string(pair.next(), "attribute description")?;
        let values = pair
            .next()
            .and_then(StructureTag::expect_constructed)
            .ok_or_else(malformed)?
            .into_iter()
            .map(|value| value.expect_primitive().ok_or_else(malformed))
            .collect::<DirectoryResult<Vec<_>>>()?;
        attributes.push(name, values);
    }

    Ok(Some(SearchRow::new(dn, attributes)))
}

fn octet_string(tag: Option<StructureTag>, what: &str) -> DirectoryResult<String> {
    let bytes = tag.and_then(StructureTag::expect_primitive).ok_or_else(|| {
        DirectoryError::operation_failed("search", format!("malformed search result: missing {what}"))
    })?;

    String::from_utf8(bytes).map_err(|e| {
        DirectoryError::operation_failed_with_source(
            "search",
            format!("{what} is not valid UTF-8"),
            e,
        )
    })
}
