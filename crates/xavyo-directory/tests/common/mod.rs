//! Common test utilities for xavyo-directory integration tests.
//!
//! Provides an in-memory directory that implements the client traits, seeded
//! with a small `dc=someu,dc=edu` tree.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use xavyo_directory::{
    AttributeMap, ClientConnector, DirectoryClient, DirectoryConfig, DirectoryError,
    DirectoryResult, DirectorySession, ModOp, Modification, Outcome, SearchRow, SourceConfig,
};

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const ADMIN_DN: &str = "cn=admin,dc=someu,dc=edu";
pub const ADMIN_PASSWORD: &str = "secret";
pub const GROUPS_BASE_DN: &str = "ou=groups,dc=someu,dc=edu";
pub const PEOPLE_BASE_DN: &str = "ou=people,dc=someu,dc=edu";

pub const CONFIG: &str = r#"
sources:
  directory:
    address: ldap.someu.edu
    port: "389"
    useSSL: false
    bindDN: cn=admin,dc=someu,dc=edu
    bindPassword: secret

dit:
  ou=people,dc=someu,dc=edu:
    singular: person
    plural: people
    source: directory
  ou=groups,dc=someu,dc=edu:
    singular: group
    plural: groups
    source: directory
"#;

/// Shared state of the in-memory directory.
#[derive(Default)]
pub struct DirectoryState {
    pub entries: Vec<SearchRow>,
    pub binds: Vec<String>,
    pub modify_requests: Vec<(String, Vec<Modification>)>,
    pub unbinds: usize,
}

/// In-memory directory reachable through [`ClientConnector`].
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    pub state: Arc<Mutex<DirectoryState>>,
    pub opens: Arc<AtomicUsize>,
}

impl InMemoryDirectory {
    /// Create a directory holding the `dc=someu,dc=edu` fixture tree.
    pub fn seeded() -> Self {
        let directory = Self::default();
        {
            let mut state = directory.state.lock().unwrap();
            state.entries = fixture_entries();
        }
        directory
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn modify_requests(&self) -> Vec<(String, Vec<Modification>)> {
        self.state.lock().unwrap().modify_requests.clone()
    }

    pub fn binds(&self) -> Vec<String> {
        self.state.lock().unwrap().binds.clone()
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|e| e.dn.eq_ignore_ascii_case(dn))
    }
}

#[async_trait]
impl ClientConnector for InMemoryDirectory {
    async fn open(
        &self,
        _source_id: &str,
        _url: &str,
        _source: &SourceConfig,
    ) -> DirectoryResult<Arc<dyn DirectoryClient>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn simple_bind(&self, bind_dn: &str, password: &str) -> DirectoryResult<Outcome> {
        self.state.lock().unwrap().binds.push(bind_dn.to_string());
        if bind_dn != ADMIN_DN || password != ADMIN_PASSWORD {
            return Err(rejected("bind", 49, "invalid credentials"));
        }
        Ok(Outcome::success())
    }

    async fn search(&self, base_dn: &str, filter: &str) -> DirectoryResult<Vec<SearchRow>> {
        let filter = Filter::parse(filter)
            .ok_or_else(|| rejected("search", 87, &format!("bad search filter: {filter}")))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .entries
            .iter()
            .filter(|e| in_subtree(&e.dn, base_dn) && filter.matches(&e.attributes))
            .cloned()
            .collect())
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> DirectoryResult<Outcome> {
        let mut state = self.state.lock().unwrap();
        if state.entries.iter().any(|e| e.dn.eq_ignore_ascii_case(dn)) {
            return Err(rejected("add", 68, "entry already exists"));
        }
        state.entries.push(SearchRow::new(dn, attributes.clone()));
        Ok(Outcome::success())
    }

    async fn delete(&self, dn: &str) -> DirectoryResult<Outcome> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .entries
            .iter()
            .position(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| rejected("delete", 32, "no such object"))?;
        state.entries.remove(position);
        Ok(Outcome::success())
    }

    async fn modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<Outcome> {
        let mut state = self.state.lock().unwrap();
        state
            .modify_requests
            .push((dn.to_string(), modifications.to_vec()));

        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| rejected("modify", 32, "no such object"))?;
        for modification in modifications {
            entry.attributes = apply(&entry.attributes, modification);
        }
        Ok(Outcome::success())
    }

    async fn unbind(&self) -> DirectoryResult<()> {
        self.state.lock().unwrap().unbinds += 1;
        Ok(())
    }
}

/// Build a session over a seeded in-memory directory.
pub fn test_session() -> (DirectorySession<InMemoryDirectory>, InMemoryDirectory) {
    init_test_logging();
    let directory = InMemoryDirectory::seeded();
    let config = DirectoryConfig::from_yaml(CONFIG).unwrap();
    let session = DirectorySession::with_connector(config, directory.clone()).unwrap();
    (session, directory)
}

fn rejected(operation: &'static str, rc: u32, text: &str) -> DirectoryError {
    DirectoryError::Rejected {
        operation,
        rc,
        text: text.to_string(),
    }
}

fn in_subtree(dn: &str, base_dn: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let base = base_dn.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{base}"))
}

fn apply(attributes: &AttributeMap, modification: &Modification) -> AttributeMap {
    let mut result = AttributeMap::new();
    let mut replaced = false;
    for (name, values) in attributes.iter() {
        if !name.eq_ignore_ascii_case(&modification.attribute) {
            result.push(name, values.to_vec());
            continue;
        }
        if modification.op == ModOp::Replace {
            let new_values = modification.values.clone().unwrap_or_default();
            if !new_values.is_empty() {
                result.push(name, new_values);
            }
            replaced = true;
        }
    }
    if modification.op == ModOp::Replace && !replaced {
        let new_values = modification.values.clone().unwrap_or_default();
        if !new_values.is_empty() {
            result.push(modification.attribute.clone(), new_values);
        }
    }
    result
}

/// Minimal RFC 4515 filter: and/or/not, presence and equality with `*`.
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equals(String, String),
}

impl Filter {
    fn parse(input: &str) -> Option<Filter> {
        let (filter, rest) = Self::parse_one(input.trim())?;
        rest.is_empty().then_some(filter)
    }

    fn parse_one(input: &str) -> Option<(Filter, &str)> {
        let inner = input.strip_prefix('(')?;
        match inner.chars().next()? {
            '&' | '|' => {
                let mut rest = &inner[1..];
                let mut children = Vec::new();
                while rest.starts_with('(') {
                    let (child, after) = Self::parse_one(rest)?;
                    children.push(child);
                    rest = after;
                }
                let rest = rest.strip_prefix(')')?;
                let filter = if inner.starts_with('&') {
                    Filter::And(children)
                } else {
                    Filter::Or(children)
                };
                Some((filter, rest))
            }
            '!' => {
                let (child, rest) = Self::parse_one(&inner[1..])?;
                Some((Filter::Not(Box::new(child)), rest.strip_prefix(')')?))
            }
            _ => {
                let end = inner.find(')')?;
                let (attribute, value) = inner[..end].split_once('=')?;
                let filter = if value == "*" {
                    Filter::Present(attribute.to_string())
                } else {
                    Filter::Equals(attribute.to_string(), value.to_string())
                };
                Some((filter, &inner[end + 1..]))
            }
        }
    }

    fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.matches(attributes)),
            Filter::Or(children) => children.iter().any(|c| c.matches(attributes)),
            Filter::Not(child) => !child.matches(attributes),
            Filter::Present(name) => attributes.contains(name),
            Filter::Equals(name, pattern) => attributes.get(name).is_some_and(|values| {
                values
                    .iter()
                    .any(|v| wildcard_match(pattern, &String::from_utf8_lossy(v)))
            }),
        }
    }
}

/// Case-insensitive match of a value against a pattern with `*` wildcards.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let mut rest = value.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(after) => rest = after,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn person(uid: &str, given_name: &str, sn: &str) -> SearchRow {
    SearchRow::new(
        format!("uid={uid},{PEOPLE_BASE_DN}"),
        AttributeMap::new()
            .with(
                "objectClass",
                [
                    "top",
                    "person",
                    "organizationalPerson",
                    "inetOrgPerson",
                    "eduPerson",
                ],
            )
            .with("uid", [uid])
            .with("givenName", [given_name])
            .with("sn", [sn])
            .with("cn", [format!("{given_name} {sn}")])
            .with(
                "description",
                [format!("This is the description for {sn}, {given_name}.")],
            ),
    )
}

fn group(cn: &str, members: &[&str], description: &str) -> SearchRow {
    SearchRow::new(
        format!("cn={cn},{GROUPS_BASE_DN}"),
        AttributeMap::new()
            .with("objectClass", ["top", "groupOfUniqueNames"])
            .with(
                "uniqueMember",
                members
                    .iter()
                    .map(|uid| format!("uid={uid},{PEOPLE_BASE_DN}")),
            )
            .with("cn", [cn])
            .with("description", [description]),
    )
}

fn fixture_entries() -> Vec<SearchRow> {
    vec![
        person("3", "Mabel", "Rockland"),
        person("6", "Ada", "Reyes"),
        person("7", "Ben", "Okafor"),
        person("9", "Chloe", "Ruiz"),
        person("100", "Jill", "Peters"),
        group("service desk", &["3"], "This is the Service Desk group"),
        group("faculty", &["6", "9"], "This is the Faculty group"),
    ]
}
