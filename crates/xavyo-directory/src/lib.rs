//! # Directory Mapping
//!
//! Entity-level access to LDAP directories for xavyo.
//!
//! Application code asks for entities by name ("person", "people", "group")
//! and this crate works out which subtree to search and which configured
//! source holds it. Search results come back as [`Entry`] values that track
//! attribute changes until they are sent with [`DirectorySession::modify`].
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_directory::{DirectoryConfig, DirectorySession};
//!
//! let session = DirectorySession::new(DirectoryConfig::from_file("conf/Config.yaml")?)?;
//!
//! let mut person = session
//!     .find("person", "(uid=100)")
//!     .await?
//!     .into_entry()
//!     .expect("uid=100 exists");
//! println!("{}", person.ldif());
//!
//! person.set("givenName", "First");
//! person.set("cn", vec!["First Last", "Last, First"]);
//! person.unset("description");
//! session.modify(&person).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`config`] - `sources` / `dit` configuration loaded from YAML
//! - [`schema`] - entity name resolution
//! - [`entry`] - search result entries and pending modifications
//! - [`session`] - per-source connections and directory operations
//! - [`client`] - protocol client traits
//! - [`ldap`] - `ldap3` implementation of the client traits
//! - [`escape`] - filter and DN value escaping
//! - [`error`] - error types

pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod escape;
pub mod ldap;
pub mod schema;
pub mod session;

// Re-exports
pub use client::{ClientConnector, DirectoryClient, Outcome, SearchRow};
pub use config::{DirectoryConfig, DitLocation, SourceConfig};
pub use entry::{AttributeMap, AttributeUpdate, Entry, Field, ModOp, Modification};
pub use error::{DirectoryError, DirectoryResult};
pub use escape::{escape_dn_value, escape_filter_value};
pub use ldap::{Ldap3Client, Ldap3Connector};
pub use schema::{Cardinality, Resolution, SchemaResolver};
pub use session::{DirectorySession, Found};
