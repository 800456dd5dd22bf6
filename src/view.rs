//! JSON rendering of entities with serialization groups and versioned fields.
//!
//! A field belongs to one or more groups and may carry a minimum API
//! version. A [`SerializationContext`] selects groups and, optionally, the
//! requested version; fields outside the selection are omitted.

use crate::entity::{Author, Book};
use crate::error::Result;
use crate::versioning::ApiVersion;
use serde_json::{Map, Value};

/// Named set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Group(&'static str);

impl Group {
    /// Fields exposed by every book and author read endpoint.
    pub const GET_BOOKS: Group = Group("getBooks");
}

#[derive(Debug, Clone, Default)]
pub struct SerializationContext {
    groups: Vec<Group>,
    version: Option<ApiVersion>,
    raw_version: Option<String>,
}

impl SerializationContext {
    /// All fields, no version gating.
    pub fn create() -> Self {
        Self::default()
    }

    pub fn with_groups(mut self, groups: &[Group]) -> Self {
        self.groups = groups.to_vec();
        self
    }

    /// Gate versioned fields on `version`. A version that does not parse
    /// hides every versioned field.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = ApiVersion::parse(version);
        self.raw_version = Some(version.to_string());
        self
    }

    fn includes(&self, groups: &[Group]) -> bool {
        self.groups.is_empty() || groups.iter().any(|group| self.groups.contains(group))
    }

    fn satisfies(&self, since: &ApiVersion) -> bool {
        match (&self.raw_version, &self.version) {
            (None, _) => true,
            (Some(_), Some(version)) => version >= since,
            (Some(_), None) => false,
        }
    }
}

/// Accumulates the fields a context exposes.
struct ObjectWriter<'a> {
    context: &'a SerializationContext,
    fields: Map<String, Value>,
}

impl<'a> ObjectWriter<'a> {
    fn new(context: &'a SerializationContext) -> Self {
        ObjectWriter {
            context,
            fields: Map::new(),
        }
    }

    fn field(mut self, name: &str, groups: &[Group], value: Value) -> Self {
        if self.context.includes(groups) {
            self.fields.insert(name.to_string(), value);
        }
        self
    }

    fn field_since(self, name: &str, groups: &[Group], since: &str, value: Value) -> Self {
        let visible = ApiVersion::parse(since).is_some_and(|since| self.context.satisfies(&since));
        if visible {
            self.field(name, groups, value)
        } else {
            self
        }
    }

    fn finish(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Entities that render through a [`SerializationContext`].
pub trait Normalize {
    fn normalize(&self, context: &SerializationContext) -> Value;
}

impl Normalize for Author {
    fn normalize(&self, context: &SerializationContext) -> Value {
        ObjectWriter::new(context)
            .field("id", &[Group::GET_BOOKS], Value::from(self.id))
            .field("firstName", &[Group::GET_BOOKS], Value::from(self.first_name.as_str()))
            .field("lastName", &[Group::GET_BOOKS], Value::from(self.last_name.as_str()))
            .finish()
    }
}

impl Normalize for Book {
    fn normalize(&self, context: &SerializationContext) -> Value {
        let author = self
            .author
            .as_ref()
            .map_or(Value::Null, |author| author.normalize(context));

        ObjectWriter::new(context)
            .field("id", &[Group::GET_BOOKS], Value::from(self.id))
            .field("title", &[Group::GET_BOOKS], Value::from(self.title.as_str()))
            .field("coverText", &[Group::GET_BOOKS], Value::from(self.cover_text.clone()))
            .field_since("comment", &[Group::GET_BOOKS], "2.0", Value::from(self.comment.clone()))
            .field("author", &[Group::GET_BOOKS], author)
            .finish()
    }
}

impl<T: Normalize> Normalize for [T] {
    fn normalize(&self, context: &SerializationContext) -> Value {
        Value::Array(self.iter().map(|item| item.normalize(context)).collect())
    }
}

/// Render `value` to JSON bytes.
pub fn to_json<T: Normalize + ?Sized>(value: &T, context: &SerializationContext) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&value.normalize(context))?)
}
