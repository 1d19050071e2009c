//! `SQLite` storage for actor positions.
//!
//! One row per actor. Updates rewrite that row in place, keeping its `id`
//! and `created_at`.

// SQLite operations need to hold the lock for the duration of the operation.
// Dropping the guard earlier would require restructuring all methods.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use super::error::{LocationError, LocationResult};
use super::geo::Bounds;
use super::types::{GeoPosition, LocationUpdate, UpsertOutcome, VisibilityChange};
use crate::identity::ActorId;
use crate::timestamp::{from_millis, to_millis};

const POSITION_COLUMNS: &str = "id, actor_id, latitude, longitude, altitude, accuracy, \
                                visible_to_friends, created_at, updated_at";

/// `SQLite`-based storage for positions.
pub struct LocationStorage {
    conn: Mutex<Connection>,
}

impl LocationStorage {
    /// Creates a new storage instance at the given path.
    ///
    /// Creates the database file and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> LocationResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    /// Creates an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> LocationResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> LocationResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LocationError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    fn initialize_schema(&self) -> LocationResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id TEXT NOT NULL UNIQUE,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                altitude REAL,
                accuracy REAL,
                visible_to_friends INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_positions_updated_at
                ON positions(updated_at);
            ",
        )?;

        Ok(())
    }

    // ==================== Write Operations ====================

    /// Records `update` as the actor's position, creating it if needed.
    ///
    /// The read of the previous visibility and the write happen in one
    /// transaction. The caller is expected to have validated `update`.
    ///
    /// Writes are last-write-wins by `now`: if the stored position is newer,
    /// nothing changes and the outcome reports `applied == false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert(
        &self,
        actor: &ActorId,
        update: &LocationUpdate,
        now: DateTime<Utc>,
    ) -> LocationResult<UpsertOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = position_in(&tx, actor)?;
        let previous_visibility = previous.as_ref().map(|p| p.visible_to_friends);
        let visible = update
            .visible_to_friends
            .or(previous_visibility)
            .unwrap_or(true);
        let ts = to_millis(now);

        let changed = tx.execute(
            r"
            INSERT INTO positions
                (actor_id, latitude, longitude, altitude, accuracy, visible_to_friends, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(actor_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                altitude = excluded.altitude,
                accuracy = excluded.accuracy,
                visible_to_friends = excluded.visible_to_friends,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= positions.updated_at
            ",
            params![
                actor.as_str(),
                update.latitude,
                update.longitude,
                update.altitude,
                update.accuracy,
                visible,
                ts,
            ],
        )?;
        let position = position_in(&tx, actor)?.ok_or_else(|| {
            LocationError::Storage(format!("Position for {actor} vanished during upsert"))
        })?;

        tx.commit()?;
        Ok(UpsertOutcome {
            position,
            previous_visibility,
            applied: changed > 0,
        })
    }

    /// Changes only the visibility of an existing position.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::NoPosition`] if the actor has no position.
    pub fn set_visibility(
        &self,
        actor: &ActorId,
        visible: bool,
        now: DateTime<Utc>,
    ) -> LocationResult<VisibilityChange> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let previous = position_in(&tx, actor)?
            .ok_or_else(|| LocationError::NoPosition(actor.clone()))?
            .visible_to_friends;
        tx.execute(
            "UPDATE positions SET visible_to_friends = ?1, updated_at = MAX(updated_at, ?2)
             WHERE actor_id = ?3",
            params![visible, to_millis(now), actor.as_str()],
        )?;
        let position =
            position_in(&tx, actor)?.ok_or_else(|| LocationError::NoPosition(actor.clone()))?;

        tx.commit()?;
        Ok(VisibilityChange { position, previous })
    }

    /// Deletes the actor's position. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_for(&self, actor: &ActorId) -> LocationResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM positions WHERE actor_id = ?1",
            params![actor.as_str()],
        )?)
    }

    /// Deletes positions last updated before `cutoff`. Returns the number of
    /// rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> LocationResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM positions WHERE updated_at < ?1",
            params![to_millis(cutoff)],
        )?)
    }

    // ==================== Read Operations ====================

    /// Returns the actor's position, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_for(&self, actor: &ActorId) -> LocationResult<Option<GeoPosition>> {
        let conn = self.lock()?;
        Ok(position_in(&conn, actor)?)
    }

    /// Returns the actor's position only if it is visible to friends.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_visible_for(&self, actor: &ActorId) -> LocationResult<Option<GeoPosition>> {
        Ok(self
            .latest_for(actor)?
            .filter(|position| position.visible_to_friends))
    }

    /// Returns the visible positions of the given actors, in no particular
    /// order. Actors without a visible position are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn latest_visible_for_many(&self, actors: &[ActorId]) -> LocationResult<Vec<GeoPosition>> {
        if actors.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut positions = Vec::with_capacity(actors.len());
        // Stay well under SQLITE_MAX_VARIABLE_NUMBER on large friend lists
        for chunk in actors.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {POSITION_COLUMNS} FROM positions
                 WHERE visible_to_friends = 1 AND actor_id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(
                params_from_iter(chunk.iter().map(ActorId::as_str)),
                position_from_row,
            )?;
            for row in rows {
                positions.push(row?);
            }
        }
        Ok(positions)
    }

    /// Returns visible positions inside `bounds`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn within_bounds(&self, bounds: &Bounds) -> LocationResult<Vec<GeoPosition>> {
        self.query(
            "visible_to_friends = 1
             AND latitude BETWEEN ?1 AND ?2
             AND longitude BETWEEN ?3 AND ?4",
            params![
                bounds.min_latitude,
                bounds.max_latitude,
                bounds.min_longitude,
                bounds.max_longitude
            ],
        )
    }

    /// Returns positions updated at or after `since`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn updated_since(&self, since: DateTime<Utc>) -> LocationResult<Vec<GeoPosition>> {
        self.query("updated_at >= ?1", params![to_millis(since)])
    }

    /// Returns positions last updated before `cutoff`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn not_updated_since(&self, cutoff: DateTime<Utc>) -> LocationResult<Vec<GeoPosition>> {
        self.query("updated_at < ?1", params![to_millis(cutoff)])
    }

    /// Returns true if the actor's position was updated at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn has_position_since(&self, actor: &ActorId, since: DateTime<Utc>) -> LocationResult<bool> {
        let conn = self.lock()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM positions WHERE actor_id = ?1 AND updated_at >= ?2)",
            params![actor.as_str(), to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn query(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> LocationResult<Vec<GeoPosition>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE {filter} ORDER BY updated_at DESC, id"
        ))?;
        let positions = stmt
            .query_map(params, position_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(positions)
    }
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<GeoPosition> {
    Ok(GeoPosition {
        id: row.get(0)?,
        actor_id: ActorId::from(row.get::<_, String>(1)?),
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        altitude: row.get(4)?,
        accuracy: row.get(5)?,
        visible_to_friends: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn position_in(conn: &Connection, actor: &ActorId) -> rusqlite::Result<Option<GeoPosition>> {
    conn.query_row(
        &format!("SELECT {POSITION_COLUMNS} FROM positions WHERE actor_id = ?1"),
        params![actor.as_str()],
        position_from_row,
    )
    .optional()
}
