//! Table layouts and the field-mapping tables the adapters consult.
//!
//! Records are serialized with their logical (API) field names. Each table
//! lists which of those fields are persisted and under which attribute name;
//! anything not listed, such as the user views attached during enrichment,
//! never reaches the store.

use super::{Document, StoreError};
use serde_json::Value;

/// One persisted field: logical name, stored attribute name, and the mapping
/// for objects nested under it (a map, or a list of maps).
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub attribute: &'static str,
    pub nested: Option<&'static [Field]>,
}

impl Field {
    pub const fn plain(name: &'static str) -> Self {
        Self {
            name,
            attribute: name,
            nested: None,
        }
    }

    pub const fn renamed(name: &'static str, attribute: &'static str) -> Self {
        Self {
            name,
            attribute,
            nested: None,
        }
    }

    pub const fn nested(name: &'static str, fields: &'static [Field]) -> Self {
        Self {
            name,
            attribute: name,
            nested: Some(fields),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub name: &'static str,
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
}

/// Static description of a table: primary key, secondary indexes and the
/// field-mapping table. Key names are logical field names.
#[derive(Debug)]
pub struct TableSchema {
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
    pub indexes: &'static [IndexDef],
    pub fields: &'static [Field],
}

impl TableSchema {
    /// Logical document -> stored item. Unmapped fields are dropped.
    pub fn encode(&self, doc: &Document) -> Document {
        encode_object(self.fields, doc)
    }

    /// Stored item -> logical document. Unmapped attributes are dropped.
    pub fn decode(&self, item: &Document) -> Document {
        decode_object(self.fields, item)
    }

    pub fn attribute(&self, name: &str) -> Option<&'static str> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.attribute)
    }

    /// Logical `(partition, sort)` key names for the table or one of its indexes.
    pub fn key_for(
        &self,
        table: &str,
        index: Option<&str>,
    ) -> Result<(&'static str, Option<&'static str>), StoreError> {
        match index {
            None => Ok((self.partition_key, self.sort_key)),
            Some(name) => self
                .indexes
                .iter()
                .find(|i| i.name == name)
                .map(|i| (i.partition_key, i.sort_key))
                .ok_or_else(|| StoreError::UnknownIndex {
                    table: table.to_string(),
                    index: name.to_string(),
                }),
        }
    }

    /// Primary key fields of `doc`, still under logical names.
    pub fn primary_key(&self, table: &str, doc: &Document) -> Result<Document, StoreError> {
        let mut key = Document::new();
        for name in std::iter::once(self.partition_key).chain(self.sort_key) {
            let value = doc.get(name).ok_or_else(|| StoreError::MissingKey {
                table: table.to_string(),
                attribute: name.to_string(),
            })?;
            key.insert(name.to_string(), value.clone());
        }
        Ok(key)
    }
}

fn encode_object(fields: &[Field], doc: &Document) -> Document {
    fields
        .iter()
        .filter_map(|f| {
            let value = doc.get(f.name)?;
            let value = match f.nested {
                Some(inner) => map_nested(value, &|obj| encode_object(inner, obj)),
                None => value.clone(),
            };
            Some((f.attribute.to_string(), value))
        })
        .collect()
}

fn decode_object(fields: &[Field], item: &Document) -> Document {
    fields
        .iter()
        .filter_map(|f| {
            let value = item.get(f.attribute)?;
            let value = match f.nested {
                Some(inner) => map_nested(value, &|obj| decode_object(inner, obj)),
                None => value.clone(),
            };
            Some((f.name.to_string(), value))
        })
        .collect()
}

fn map_nested(value: &Value, convert: &dyn Fn(&Document) -> Document) -> Value {
    match value {
        Value::Object(obj) => Value::Object(convert(obj)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(convert(obj)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A configured table name bound to its schema.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub schema: &'static TableSchema,
}

impl TableDef {
    pub fn new(name: impl Into<String>, schema: &'static TableSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

pub const EXPENSES_BY_DATE_INDEX: &str = "groupId-dateTime-index";
pub const MEMBERS_BY_GROUP_INDEX: &str = "groupId-index";

pub static CHAT_MESSAGES: TableSchema = TableSchema {
    partition_key: "userId",
    sort_key: Some("createdAt"),
    indexes: &[],
    fields: &[
        Field::plain("id"),
        Field::plain("userId"),
        Field::plain("username"),
        Field::plain("role"),
        Field::plain("content"),
        Field::plain("createdAt"),
    ],
};

static PARTICIPANT_FIELDS: [Field; 2] = [Field::plain("userId"), Field::plain("share")];

pub static EXPENSES: TableSchema = TableSchema {
    partition_key: "groupId",
    sort_key: Some("expenseId"),
    indexes: &[IndexDef {
        name: EXPENSES_BY_DATE_INDEX,
        partition_key: "groupId",
        sort_key: Some("dateTime"),
    }],
    fields: &[
        Field::plain("expenseId"),
        Field::plain("groupId"),
        Field::plain("title"),
        Field::plain("category"),
        Field::plain("amount"),
        Field::plain("dateTime"),
        Field::plain("paidBy"),
        Field::plain("imageUrl"),
        Field::plain("splitType"),
        Field::nested("participants", &PARTICIPANT_FIELDS),
        Field::plain("createdBy"),
        Field::plain("createdAt"),
    ],
};

pub static GROUP_MEMBERS: TableSchema = TableSchema {
    partition_key: "userId",
    sort_key: Some("groupId"),
    indexes: &[IndexDef {
        name: MEMBERS_BY_GROUP_INDEX,
        partition_key: "groupId",
        sort_key: None,
    }],
    fields: &[
        Field::plain("userId"),
        Field::plain("groupId"),
        Field::plain("groupName"),
    ],
};

pub static USERS: TableSchema = TableSchema {
    partition_key: "userId",
    sort_key: None,
    indexes: &[],
    fields: &[
        Field::plain("userId"),
        Field::plain("username"),
        Field::plain("showableName"),
        Field::plain("role"),
    ],
};

/// Catalog
///
/// The four tables the service touches, with their configured names.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub messages: TableDef,
    pub expenses: TableDef,
    pub group_members: TableDef,
    pub users: TableDef,
}

impl Catalog {
    pub fn new(
        messages: impl Into<String>,
        expenses: impl Into<String>,
        group_members: impl Into<String>,
        users: impl Into<String>,
    ) -> Self {
        Self {
            messages: TableDef::new(messages, &CHAT_MESSAGES),
            expenses: TableDef::new(expenses, &EXPENSES),
            group_members: TableDef::new(group_members, &GROUP_MEMBERS),
            users: TableDef::new(users, &USERS),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(
            "chat",
            "splitter-expenses",
            "splitter-group-members",
            "vassistant-users",
        )
    }
}
