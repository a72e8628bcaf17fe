//! Catalog records and the capabilities that let them be stored generically.
//!
//! A record participates in storage by implementing [`Queryable`]; records
//! that other records point at also implement [`Parent`]. The persistence
//! layer only ever sees these traits, never the concrete types.

mod types;

pub use types::{Class, Department, MeetingTime, Section};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, comparable key identifying a row within one table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrimaryKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for PrimaryKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// SQL affinity of a stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

/// A stored field. `name` must match the serde field name of the record.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }
}

/// A record that can be written to and read back from a store.
///
/// Implementors describe their table and columns; the fields themselves are
/// moved in and out through serde, so no per-type SQL is ever written.
pub trait Queryable: Serialize + DeserializeOwned + Send + Sync {
    /// Name of the table holding records of this type.
    const TABLE: &'static str;

    /// Fields persisted as columns, in table order.
    const COLUMNS: &'static [Column];

    /// Unique identifier of this record within its table.
    fn primary_key(&self) -> PrimaryKey;

    /// Key of the parent record this one belongs to, if any.
    fn foreign_key(&self) -> Option<PrimaryKey> {
        None
    }

    fn table_name(&self) -> &'static str {
        Self::TABLE
    }
}

/// A record that other records reference.
pub trait Parent {
    /// The value a child stores to point back at this record.
    fn foreign_key_value(&self) -> PrimaryKey;
}

/// The closed set of record kinds the system knows how to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Department,
    Class,
    Section,
}

impl EntityKind {
    /// Every registered kind, parents before children.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Department,
        EntityKind::Class,
        EntityKind::Section,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Department => Department::TABLE,
            EntityKind::Class => Class::TABLE,
            EntityKind::Section => Section::TABLE,
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            EntityKind::Department => Department::COLUMNS,
            EntityKind::Class => Class::COLUMNS,
            EntityKind::Section => Section::COLUMNS,
        }
    }

    /// The kind a record of this kind points at through its foreign key.
    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::Department => None,
            EntityKind::Class => Some(EntityKind::Department),
            EntityKind::Section => Some(EntityKind::Class),
        }
    }

    pub fn from_table_name(table: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.table_name() == table)
    }
}

/// A record of any registered kind, as returned by type-erased lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Entity {
    Department(Department),
    Class(Class),
    Section(Section),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Department(_) => EntityKind::Department,
            Entity::Class(_) => EntityKind::Class,
            Entity::Section(_) => EntityKind::Section,
        }
    }

    pub fn primary_key(&self) -> PrimaryKey {
        match self {
            Entity::Department(d) => d.primary_key(),
            Entity::Class(c) => c.primary_key(),
            Entity::Section(s) => s.primary_key(),
        }
    }

    pub fn foreign_key(&self) -> Option<PrimaryKey> {
        match self {
            Entity::Department(d) => d.foreign_key(),
            Entity::Class(c) => c.foreign_key(),
            Entity::Section(s) => s.foreign_key(),
        }
    }

    pub fn table_name(&self) -> &'static str {
        self.kind().table_name()
    }
}

impl From<Department> for Entity {
    fn from(value: Department) -> Self {
        Entity::Department(value)
    }
}

impl From<Class> for Entity {
    fn from(value: Class) -> Self {
        Entity::Class(value)
    }
}

impl From<Section> for Entity {
    fn from(value: Section) -> Self {
        Entity::Section(value)
    }
}
