use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use super::ResourceKind;

/// Named parameters sent along with a create or update call.
///
/// Optional parameters that were not given are left out of the map entirely,
/// the remote service treats an omitted field differently from an explicit one.
pub type Fields = BTreeMap<String, FieldValue>;

/// A value carried by a [`Record`] field, shaped like the JSON the remote API returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
    /// An embedded object, such as the `namespace` of a repository.
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Field `name` of an embedded object.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Map(fields) => fields.get(name),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Str(value) => f.write_str(value),
            FieldValue::List(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            FieldValue::Map(fields) => match fields.get("name").or_else(|| fields.get("id")) {
                Some(value) => write!(f, "{value}"),
                None => Ok(()),
            },
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<RecordId> for FieldValue {
    fn from(value: RecordId) -> Self {
        match value {
            RecordId::Int(id) => FieldValue::Int(id),
            RecordId::Str(id) => FieldValue::Str(id),
        }
    }
}

/// Identity of a record within its resource kind.
///
/// Most kinds use the numeric `id` assigned by the remote service, branches are
/// identified by their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    fn from_field(value: &FieldValue) -> Option<RecordId> {
        match value {
            FieldValue::Int(id) => Some(RecordId::Int(*id)),
            FieldValue::Str(id) => Some(RecordId::Str(id.clone())),
            _ => None,
        }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Str(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Str(value)
    }
}

/// A remote resource as delivered by the API, kept as a schema-light field map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Overwrites the named fields with the given values, leaving all others as they are.
    pub fn merge(&mut self, fields: &Fields) {
        for (name, value) in fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Identity of this record when interpreted as a `kind`.
    pub fn id_for(&self, kind: ResourceKind) -> Option<RecordId> {
        self.get(kind.id_field()).and_then(RecordId::from_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn id_follows_resource_kind() {
        let branch = Record::new().with("name", "main").with("protected", true);
        let user = Record::new().with("id", 7i64).with("username", "alice");

        assert_eq!(branch.id_for(ResourceKind::Branch), Some(RecordId::from("main")));
        assert_eq!(branch.id_for(ResourceKind::User), None);
        assert_eq!(user.id_for(ResourceKind::User), Some(RecordId::Int(7)));
    }

    #[test]
    fn non_scalar_identifiers_are_rejected() {
        let record = Record::new().with("id", true);
        assert_eq!(record.id_for(ResourceKind::Group), None);
    }

    #[test]
    fn merge_overwrites_only_named_fields() {
        let mut record = Record::new()
            .with("id", 1i64)
            .with("username", "alice")
            .with("name", "Alice");
        let changes = Fields::from([("name".to_owned(), FieldValue::from("Alice Liddell"))]);

        record.merge(&changes);

        assert_eq!(record.get_str("username"), Some("alice"));
        assert_eq!(record.get_str("name"), Some("Alice Liddell"));
    }

    #[test]
    fn nested_payload_is_readable() {
        let record: Record = serde_json::from_str(
            r#"{"id":4,"path_with_namespace":"g/a","namespace":{"id":3,"owner_id":1},"tag_list":[],"star_count":1.5}"#,
        )
        .unwrap();

        assert_eq!(record.id_for(ResourceKind::Repository), Some(RecordId::Int(4)));
        assert_eq!(
            record
                .get("namespace")
                .and_then(|namespace| namespace.get("owner_id"))
                .and_then(FieldValue::as_int),
            Some(1)
        );
        assert_eq!(record.get("tag_list"), Some(&FieldValue::List(Vec::new())));
        assert_eq!(record.get("star_count"), Some(&FieldValue::Float(1.5)));
    }

    #[test]
    fn embedded_object_is_not_an_identifier() {
        let record = Record::new().with(
            "id",
            FieldValue::Map(Fields::from([("id".to_owned(), FieldValue::from(1i64))])),
        );
        assert_eq!(record.id_for(ResourceKind::User), None);
    }

    #[test]
    fn display_leaves_null_empty() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::from(false).to_string(), "false");
        assert_eq!(FieldValue::from(42i64).to_string(), "42");
    }
}
