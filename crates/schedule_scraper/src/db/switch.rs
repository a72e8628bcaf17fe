//! Dual-store switch: one store serves reads while the other is rebuilt.
//!
//! Which store is live is recorded in a single row of a separate control
//! database. That row is read once at startup and rewritten by [`SwitchController::flip`],
//! which is the only place the live store ever changes.

use super::{Result, Store, StoreError};
use crate::model::{Entity, PrimaryKey, Queryable};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const CONTROL_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS switch (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        live TEXT NOT NULL CHECK (live IN ('a', 'b')),
        flipped_at TEXT
    );
    INSERT OR IGNORE INTO switch (id, live) VALUES (0, 'a');
";

/// Identifies one of the two physical stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreId {
    A,
    B,
}

impl StoreId {
    pub fn other(self) -> Self {
        match self {
            StoreId::A => StoreId::B,
            StoreId::B => StoreId::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreId::A => "a",
            StoreId::B => "b",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "a" => Some(StoreId::A),
            "b" => Some(StoreId::B),
            _ => None,
        }
    }

    pub fn file_name(self) -> String {
        format!("store_{}.db", self.as_str())
    }

    fn index(self) -> usize {
        match self {
            StoreId::A => 0,
            StoreId::B => 1,
        }
    }

    fn from_index(index: u8) -> Self {
        if index == 0 {
            StoreId::A
        } else {
            StoreId::B
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SwitchController {
    control: Mutex<Connection>,
    stores: [Arc<Store>; 2],
    live: AtomicU8,
}

impl fmt::Debug for SwitchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchController")
            .field("live", &self.live_id())
            .finish()
    }
}

impl SwitchController {
    /// Opens `switch.db`, `store_a.db` and `store_b.db` under `data_dir`,
    /// creating the directory and the pointer row on first boot.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let control = Connection::open(data_dir.join("switch.db"))?;
        let a = Store::open(StoreId::A, &data_dir.join(StoreId::A.file_name()))?;
        let b = Store::open(StoreId::B, &data_dir.join(StoreId::B.file_name()))?;

        Self::from_parts(control, a, b)
    }

    /// Builds a controller from already-open connections.
    pub fn from_parts(control: Connection, a: Store, b: Store) -> Result<Self> {
        if a.id() != StoreId::A || b.id() != StoreId::B {
            return Err(StoreError::Pointer {
                message: format!("stores passed as ({}, {}), expected (a, b)", a.id(), b.id()),
            });
        }

        control.execute_batch(CONTROL_SCHEMA)?;
        let live = read_pointer(&control)?;
        info!(live = %live, "Loaded live store pointer");

        Ok(Self {
            control: Mutex::new(control),
            stores: [Arc::new(a), Arc::new(b)],
            live: AtomicU8::new(live.index() as u8),
        })
    }

    pub fn live_id(&self) -> StoreId {
        StoreId::from_index(self.live.load(Ordering::Acquire))
    }

    pub fn staging_id(&self) -> StoreId {
        self.live_id().other()
    }

    /// The store readers should query right now.
    pub fn current_live(&self) -> Arc<Store> {
        Arc::clone(&self.stores[self.live_id().index()])
    }

    /// The store the next snapshot is written into.
    pub fn current_staging(&self) -> Arc<Store> {
        Arc::clone(&self.stores[self.staging_id().index()])
    }

    /// Empties the staging store and returns it, ready for a fresh snapshot.
    pub fn prepare_staging(&self) -> Result<Arc<Store>> {
        let staging = self.current_staging();
        staging.reset_schema()?;
        debug!(staging = %staging.id(), "Prepared staging store");
        Ok(staging)
    }

    /// Promotes the staging store to live.
    ///
    /// The durable pointer is written first; the in-memory value only changes
    /// once that write has succeeded.
    pub fn flip(&self) -> Result<StoreId> {
        let control = self.control.lock().map_err(|_| StoreError::Pointer {
            message: "control connection lock poisoned".to_string(),
        })?;

        let next = self.live_id().other();
        let updated = control.execute(
            "UPDATE switch SET live = ?1, flipped_at = ?2 WHERE id = 0",
            (next.as_str(), Utc::now()),
        )?;
        if updated != 1 {
            return Err(StoreError::Pointer {
                message: format!("expected to update one pointer row, updated {updated}"),
            });
        }

        self.live.store(next.index() as u8, Ordering::Release);
        info!(live = %next, "Flipped live store");
        Ok(next)
    }

    /// Reads a record from whichever store is live at the time of the call.
    pub fn get(&self, table: &str, key: &PrimaryKey) -> Result<Entity> {
        self.current_live().get_entity(table, key)
    }

    /// Typed variant of [`SwitchController::get`].
    pub fn get_as<Q: Queryable>(&self, key: &PrimaryKey) -> Result<Q> {
        self.current_live().get(key)
    }
}

fn read_pointer(control: &Connection) -> Result<StoreId> {
    let value: Option<String> = control
        .query_row("SELECT live FROM switch WHERE id = 0", [], |row| row.get(0))
        .optional()?;

    let value = value.ok_or_else(|| StoreError::Pointer {
        message: "pointer row is missing".to_string(),
    })?;
    StoreId::parse(&value).ok_or_else(|| StoreError::Pointer {
        message: format!("pointer holds unexpected value '{value}'"),
    })
}
