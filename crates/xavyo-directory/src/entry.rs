//! Directory entries
//!
//! An [`Entry`] is a snapshot of one search result plus a log of the changes
//! the caller intends to send back. Reads always come from the snapshot;
//! writes only append to the log, so a read after a write still returns the
//! value the directory held at search time. Re-fetch the entry to observe
//! applied changes.

use base64::Engine;

use crate::error::{DirectoryError, DirectoryResult};

/// Suffix that selects every value of an attribute in [`Entry::lookup`].
pub const VALUES_SUFFIX: &str = "Values";

/// Attribute names mapped to their raw values, in protocol result order.
///
/// Names are matched ASCII case-insensitively, as LDAP attribute descriptions
/// are. Values keep their order within each attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: Vec<(String, Vec<Vec<u8>>)>,
}

impl AttributeMap {
    /// Create an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append values to an attribute, adding the attribute at the end if new.
    pub fn push(&mut self, name: impl Into<String>, values: Vec<Vec<u8>>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.extend(values),
            None => self.entries.push((name, values)),
        }
    }

    /// Builder form of [`AttributeMap::push`] for text values.
    pub fn with<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.push(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Get the raw values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.position(name).map(|i| self.entries[i].1.as_slice())
    }

    /// Check if the attribute is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterate over (name, values) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<u8>])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
    }
}

impl<N, V> FromIterator<(N, Vec<V>)> for AttributeMap
where
    N: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<T: IntoIterator<Item = (N, Vec<V>)>>(iter: T) -> Self {
        let mut map = AttributeMap::new();
        for (name, values) in iter {
            map.push(name, values.into_iter().map(Into::into).collect());
        }
        map
    }
}

impl IntoIterator for AttributeMap {
    type Item = (String, Vec<Vec<u8>>);
    type IntoIter = std::vec::IntoIter<(String, Vec<Vec<u8>>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Kind of change carried by a [`Modification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    /// Remove the attribute (all values).
    Delete,
    /// Replace every value of the attribute.
    Replace,
}

/// One pending change to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: String,
    /// New values for a replace; `None` for a delete.
    pub values: Option<Vec<Vec<u8>>>,
}

impl Modification {
    /// Create a delete record.
    pub fn delete(attribute: impl Into<String>) -> Self {
        Self {
            op: ModOp::Delete,
            attribute: attribute.into(),
            values: None,
        }
    }

    /// Create a replace record.
    pub fn replace(attribute: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            op: ModOp::Replace,
            attribute: attribute.into(),
            values: Some(values),
        }
    }
}

/// New value for an attribute, as accepted by [`Entry::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeUpdate {
    /// Delete the attribute.
    Delete,
    /// Replace the attribute with these raw values.
    Replace(Vec<Vec<u8>>),
}

impl From<&str> for AttributeUpdate {
    fn from(value: &str) -> Self {
        AttributeUpdate::Replace(vec![value.as_bytes().to_vec()])
    }
}

impl From<String> for AttributeUpdate {
    fn from(value: String) -> Self {
        AttributeUpdate::Replace(vec![value.into_bytes()])
    }
}

impl From<Vec<Vec<u8>>> for AttributeUpdate {
    fn from(values: Vec<Vec<u8>>) -> Self {
        AttributeUpdate::Replace(values)
    }
}

impl From<Vec<&str>> for AttributeUpdate {
    fn from(values: Vec<&str>) -> Self {
        AttributeUpdate::Replace(values.into_iter().map(|v| v.as_bytes().to_vec()).collect())
    }
}

impl From<Vec<String>> for AttributeUpdate {
    fn from(values: Vec<String>) -> Self {
        AttributeUpdate::Replace(values.into_iter().map(String::into_bytes).collect())
    }
}

impl<T: Into<AttributeUpdate>> From<Option<T>> for AttributeUpdate {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttributeUpdate::Delete, Into::into)
    }
}

/// Result of a name-driven read through [`Entry::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<'a> {
    Dn(&'a str),
    Attributes(&'a AttributeMap),
    Entity(&'a str),
    Modifications(&'a [Modification]),
    /// Every raw value of an attribute, selected with the `Values` suffix.
    Values(&'a [Vec<u8>]),
    /// First value of an attribute, decoded as text.
    Value(String),
}

/// A directory record returned by a search, with pending changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: String,
    attributes: AttributeMap,
    entity: String,
    modifications: Vec<Modification>,
}

impl Entry {
    /// Wrap a search result resolved under `entity`.
    pub fn new(dn: impl Into<String>, attributes: AttributeMap, entity: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
            entity: entity.into(),
            modifications: Vec::new(),
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Attributes as returned by the search.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Entity name this entry was found under.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Pending changes, in the order they were made.
    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    /// First value of an attribute as text.
    ///
    /// Returns `None` when the attribute is absent or has no values.
    pub fn get(&self, name: &str) -> DirectoryResult<Option<String>> {
        match self.attributes.get(name).and_then(|values| values.first()) {
            Some(value) => decode(name, value).map(Some),
            None => Ok(None),
        }
    }

    /// Every value of an attribute as text, in order.
    ///
    /// `None` when the attribute is absent or has no values.
    pub fn get_values(&self, name: &str) -> DirectoryResult<Option<Vec<String>>> {
        self.raw_values(name)
            .map(|values| values.iter().map(|value| decode(name, value)).collect())
            .transpose()
    }

    /// Every raw value of an attribute, in order.
    ///
    /// `None` when the attribute is absent or has no values.
    pub fn raw_values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes.get(name).filter(|values| !values.is_empty())
    }

    /// Read a field or attribute chosen by name.
    ///
    /// `dn`, `attributes`, `entity` and `modifications` return the entry's own
    /// fields. A name ending in `Values` returns every raw value of the
    /// attribute named by the rest; any other name returns the first value of
    /// that attribute as text.
    pub fn lookup(&self, name: &str) -> DirectoryResult<Option<Field<'_>>> {
        match name {
            "dn" => return Ok(Some(Field::Dn(&self.dn))),
            "attributes" => return Ok(Some(Field::Attributes(&self.attributes))),
            "entity" => return Ok(Some(Field::Entity(&self.entity))),
            "modifications" => return Ok(Some(Field::Modifications(&self.modifications))),
            _ => {}
        }

        match name.strip_suffix(VALUES_SUFFIX) {
            Some(attribute) if !attribute.is_empty() => {
                Ok(self.raw_values(attribute).map(Field::Values))
            }
            _ => Ok(self.get(name)?.map(Field::Value)),
        }
    }

    /// Record a change to an attribute.
    ///
    /// Text becomes a single UTF-8 value, a list is sent as given and `None`
    /// deletes the attribute. The search snapshot is left untouched.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeUpdate>) {
        let modification = match value.into() {
            AttributeUpdate::Delete => Modification::delete(name),
            AttributeUpdate::Replace(values) => Modification::replace(name, values),
        };
        self.modifications.push(modification);
    }

    /// Record deletion of an attribute.
    pub fn unset(&mut self, name: impl Into<String>) {
        self.modifications.push(Modification::delete(name));
    }

    /// Drop every pending change.
    pub fn clear_modifications(&mut self) {
        self.modifications.clear();
    }

    /// Render the search snapshot as LDIF.
    ///
    /// Pending changes are not included. Values that are not safe LDIF
    /// strings (RFC 2849) are written base64-encoded after `::`.
    pub fn ldif(&self) -> String {
        let mut out = String::new();
        push_ldif_line(&mut out, "dn", self.dn.as_bytes());
        for (name, values) in self.attributes.iter() {
            for value in values {
                push_ldif_line(&mut out, name, value);
            }
        }
        out
    }
}

fn decode(attribute: &str, value: &[u8]) -> DirectoryResult<String> {
    String::from_utf8(value.to_vec()).map_err(|source| DirectoryError::Decoding {
        attribute: attribute.to_string(),
        source,
    })
}

fn push_ldif_line(out: &mut String, name: &str, value: &[u8]) {
    out.push_str(name);
    match std::str::from_utf8(value) {
        Ok(text) if is_safe_string(text) => {
            out.push_str(": ");
            out.push_str(text);
        }
        _ => {
            out.push_str(":: ");
            out.push_str(&base64::engine::general_purpose::STANDARD.encode(value));
        }
    }
    out.push('\n');
}

fn is_safe_string(text: &str) -> bool {
    if text.starts_with(&[' ', ':', '<'][..]) || text.ends_with(' ') {
        return false;
    }
    !text.contains(&['\0', '\n', '\r'][..])
}
