/// Database module for storing catalog snapshots
///
/// A [`Store`] is one physical SQLite database holding one table per record
/// kind. Every table has the same two leading columns, `primary_key` and
/// `foreign_key`, followed by the columns the record type declares.
mod error;
mod switch;

pub use error::StoreError;
pub use switch::{StoreId, SwitchController};

use crate::model::{
    Class, Column, ColumnKind, Department, Entity, EntityKind, PrimaryKey, Queryable, Section,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::{Map, Number, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct Store {
    id: StoreId,
    db: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the store at `db_path` and makes sure every table exists
    pub fn open(id: StoreId, db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(id, conn)
    }

    pub fn open_in_memory(id: StoreId) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(id, conn)
    }

    fn with_connection(id: StoreId, conn: Connection) -> Result<Self> {
        conn.execute_batch(&schema_sql(false))?;
        Ok(Self {
            id,
            db: Mutex::new(conn),
        })
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Connection {
            message: format!("store {} lock poisoned", self.id),
        })
    }

    /// Drops and recreates every table, leaving the store empty
    pub fn reset_schema(&self) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        tx.execute_batch(&schema_sql(true))?;
        tx.commit()?;
        Ok(())
    }

    /// Inserts a single record
    ///
    /// A record whose primary key is already present is rejected with
    /// [`StoreError::DuplicateKey`] and the existing row is left untouched.
    pub fn insert<Q: Queryable>(&self, record: &Q) -> Result<()> {
        let table = Q::TABLE;
        let key = record.primary_key();
        let mut values = vec![
            Value::Text(key.to_string()),
            record
                .foreign_key()
                .map_or(Value::Null, |fk| Value::Text(fk.to_string())),
        ];

        let fields = match serde_json::to_value(record) {
            Ok(JsonValue::Object(fields)) => fields,
            Ok(other) => {
                return Err(StoreError::malformed(
                    table,
                    format!("expected an object, got {other}"),
                ))
            }
            Err(e) => return Err(StoreError::malformed(table, e)),
        };
        for column in Q::COLUMNS {
            let field = fields.get(column.name).ok_or_else(|| {
                StoreError::malformed(table, format!("missing field '{}'", column.name))
            })?;
            values.push(to_sql_value(table, column, field)?);
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list(Q::COLUMNS),
            (1..=values.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let db = self.lock()?;
        match db.execute(&sql, params_from_iter(values)) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey {
                    table: table.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a record of a known type by primary key
    pub fn get<Q: Queryable>(&self, key: &PrimaryKey) -> Result<Q> {
        let fields = self.select_fields(Q::TABLE, Q::COLUMNS, key)?;
        serde_json::from_value(JsonValue::Object(fields))
            .map_err(|e| StoreError::malformed(Q::TABLE, e))
    }

    /// Looks up a record by table name, for callers that don't know the type
    pub fn get_entity(&self, table: &str, key: &PrimaryKey) -> Result<Entity> {
        let kind = EntityKind::from_table_name(table).ok_or_else(|| StoreError::UnknownTable {
            table: table.to_string(),
        })?;

        Ok(match kind {
            EntityKind::Department => Entity::Department(self.get::<Department>(key)?),
            EntityKind::Class => Entity::Class(self.get::<Class>(key)?),
            EntityKind::Section => Entity::Section(self.get::<Section>(key)?),
        })
    }

    fn select_fields(
        &self,
        table: &str,
        columns: &[Column],
        key: &PrimaryKey,
    ) -> Result<Map<String, JsonValue>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE primary_key = ?1",
            data_column_list(columns),
            table
        );

        let db = self.lock()?;
        let fields = db
            .query_row(&sql, [key.as_str()], |row| row_to_fields(row, columns, 0))
            .optional()?;

        fields.ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    /// Number of rows in `table`
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let kind = lookup_kind(table)?;
        let db = self.lock()?;
        let count: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Rows whose foreign key names no row in the parent table
    pub fn orphaned_rows(&self) -> Result<Vec<(EntityKind, PrimaryKey)>> {
        let db = self.lock()?;
        let mut orphans = Vec::new();

        for kind in EntityKind::ALL {
            let Some(parent) = kind.parent() else {
                continue;
            };
            let mut stmt = db.prepare(&format!(
                "SELECT c.primary_key FROM {} c
                 LEFT JOIN {} p ON c.foreign_key = p.primary_key
                 WHERE p.primary_key IS NULL
                 ORDER BY c.primary_key",
                kind.table_name(),
                parent.table_name(),
            ))?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            orphans.extend(keys.into_iter().map(|k| (kind, PrimaryKey::new(k))));
        }

        Ok(orphans)
    }

    /// Hex SHA-256 over every row of every table, in primary key order
    ///
    /// Two stores holding the same snapshot produce the same fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let db = self.lock()?;
        let mut hasher = Sha256::new();

        for kind in EntityKind::ALL {
            hasher.update(kind.table_name().as_bytes());
            hasher.update([0u8]);

            let mut stmt = db.prepare(&format!(
                "SELECT primary_key, foreign_key, {} FROM {} ORDER BY primary_key",
                data_column_list(kind.columns()),
                kind.table_name(),
            ))?;
            let width = kind.columns().len() + 2;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                for i in 0..width {
                    match row.get_ref(i)? {
                        ValueRef::Null => hasher.update([1u8]),
                        ValueRef::Integer(n) => hasher.update(n.to_le_bytes()),
                        ValueRef::Real(f) => hasher.update(f.to_le_bytes()),
                        ValueRef::Text(t) | ValueRef::Blob(t) => hasher.update(t),
                    }
                    hasher.update([0x1f]);
                }
                hasher.update([0x1e]);
            }
        }

        Ok(hex::encode(&hasher.finalize()))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("id", &self.id).finish()
    }
}

fn lookup_kind(table: &str) -> Result<EntityKind> {
    EntityKind::from_table_name(table).ok_or_else(|| StoreError::UnknownTable {
        table: table.to_string(),
    })
}

/// DDL for every registered table; `drop` recreates them from scratch
fn schema_sql(drop: bool) -> String {
    let mut sql = String::new();
    for kind in EntityKind::ALL {
        if drop {
            sql.push_str(&format!("DROP TABLE IF EXISTS {};\n", kind.table_name()));
        }
        let columns: Vec<String> = kind
            .columns()
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.kind.sql_type()))
            .collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                primary_key TEXT PRIMARY KEY NOT NULL,
                foreign_key TEXT,
                {}
            );\n",
            kind.table_name(),
            columns.join(",\n                "),
        ));
    }
    sql
}

fn column_list(columns: &[Column]) -> String {
    format!("primary_key, foreign_key, {}", data_column_list(columns))
}

fn data_column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql_value(table: &str, column: &Column, field: &JsonValue) -> Result<Value> {
    let value = match (column.kind, field) {
        (_, JsonValue::Null) => Value::Null,
        (ColumnKind::Integer, JsonValue::Number(n)) => {
            let n = n.as_i64().ok_or_else(|| {
                StoreError::malformed(table, format!("'{}' is not an integer", column.name))
            })?;
            Value::Integer(n)
        }
        (ColumnKind::Integer, JsonValue::Bool(b)) => Value::Integer(i64::from(*b)),
        (ColumnKind::Text, JsonValue::String(s)) => Value::Text(s.clone()),
        (ColumnKind::Text, other) => Value::Text(other.to_string()),
        (ColumnKind::Integer, other) => {
            return Err(StoreError::malformed(
                table,
                format!("'{}' expected an integer, got {other}", column.name),
            ))
        }
    };
    Ok(value)
}

fn row_to_fields(
    row: &Row,
    columns: &[Column],
    offset: usize,
) -> rusqlite::Result<Map<String, JsonValue>> {
    let mut fields = Map::new();
    for (i, column) in columns.iter().enumerate() {
        let value = match row.get_ref(offset + i)? {
            ValueRef::Null => JsonValue::Null,
            ValueRef::Integer(n) => JsonValue::Number(n.into()),
            ValueRef::Real(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                JsonValue::String(String::from_utf8_lossy(t).into_owned())
            }
        };
        fields.insert(column.name.to_string(), value);
    }
    Ok(fields)
}

/// Helper module for hex encoding (avoiding extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
