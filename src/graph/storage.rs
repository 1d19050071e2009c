//! `SQLite` storage for the friend graph.
//!
//! Requests and friendships live in one database so that a status change
//! and its side effect (friendship creation on accept, request reopen on
//! removal) commit in a single transaction.
//!
//! # Pair uniqueness
//!
//! Both tables carry the canonical `(low, high)` pair with a `UNIQUE`
//! constraint. Checks run inside an immediate transaction while the
//! connection lock is held, and the constraint catches anything that slips
//! past them, so a lost race always surfaces as [`GraphError::Conflict`].

// SQLite operations need to hold the lock for the duration of the operation.
// Dropping the guard earlier would require restructuring all methods.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};

use super::error::{GraphError, GraphResult};
use super::types::{ActorPair, FriendRequest, Friendship, RequestId, RequestStatus};
use crate::identity::ActorId;
use crate::timestamp::{from_millis, to_millis};

const REQUEST_COLUMNS: &str = "id, requester_id, requested_id, status, created_at, updated_at";
const FRIENDSHIP_COLUMNS: &str = "id, user_a_id, user_b_id, created_at";

/// `SQLite`-based storage for friend requests and friendships.
///
/// Thread-safe wrapper around a `SQLite` connection. Every public method
/// is atomic with respect to every other.
pub struct GraphStorage {
    conn: Mutex<Connection>,
}

impl GraphStorage {
    /// Creates a new storage instance at the given path.
    ///
    /// Creates the database file and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> GraphResult<Self> {
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
    pub fn in_memory() -> GraphResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> GraphResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GraphError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    /// Initializes the database schema.
    fn initialize_schema(&self) -> GraphResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            -- One request per unordered pair, whatever its direction
            CREATE TABLE IF NOT EXISTS friend_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id TEXT NOT NULL,
                requested_id TEXT NOT NULL,
                pair_low TEXT NOT NULL,
                pair_high TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                CHECK (requester_id <> requested_id),
                CHECK (pair_low < pair_high),
                UNIQUE (pair_low, pair_high)
            );

            CREATE INDEX IF NOT EXISTS idx_friend_requests_requester
                ON friend_requests(requester_id, status);
            CREATE INDEX IF NOT EXISTS idx_friend_requests_requested
                ON friend_requests(requested_id, status);

            -- Undirected edge stored canonically
            CREATE TABLE IF NOT EXISTS friendships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_a_id TEXT NOT NULL,
                user_b_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                CHECK (user_a_id < user_b_id),
                UNIQUE (user_a_id, user_b_id)
            );

            CREATE INDEX IF NOT EXISTS idx_friendships_user_b
                ON friendships(user_b_id);

            -- IDs of cancelled (deleted) requests
            CREATE TABLE IF NOT EXISTS cancelled_requests (
                id INTEGER PRIMARY KEY
            );
            ",
        )?;

        Ok(())
    }

    // ==================== Request Operations ====================

    /// Inserts a new pending request from `requester` to `requested`.
    ///
    /// The friendship and duplicate checks run in the same transaction as
    /// the insert.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for a self-request and
    /// [`GraphError::Conflict`] if the actors are already friends or any
    /// request exists between them.
    pub fn insert_request(
        &self,
        requester: &ActorId,
        requested: &ActorId,
        now: DateTime<Utc>,
    ) -> GraphResult<FriendRequest> {
        let pair = ActorPair::new(requester, requested)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if friendship_exists_in(&tx, &pair)? {
            return Err(GraphError::Conflict(format!(
                "{requester} and {requested} are already friends"
            )));
        }
        if request_between_in(&tx, &pair)?.is_some() {
            return Err(GraphError::Conflict(format!(
                "A friend request between {requester} and {requested} already exists"
            )));
        }

        let ts = to_millis(now);
        tx.execute(
            r"
            INSERT INTO friend_requests
                (requester_id, requested_id, pair_low, pair_high, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ",
            params![
                requester.as_str(),
                requested.as_str(),
                pair.low().as_str(),
                pair.high().as_str(),
                RequestStatus::Pending.as_str(),
                ts,
            ],
        )
        .map_err(|e| {
            conflict_or(e, || {
                format!("A friend request between {requester} and {requested} already exists")
            })
        })?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(FriendRequest {
            id,
            requester_id: requester.clone(),
            requested_id: requested.clone(),
            status: RequestStatus::Pending,
            created_at: from_millis(ts),
            updated_at: from_millis(ts),
        })
    }

    /// Retrieves a request by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_request(&self, id: RequestId) -> GraphResult<Option<FriendRequest>> {
        let conn = self.lock()?;
        Ok(request_in(&conn, id)?)
    }

    /// Returns true if the request existed and was cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn was_cancelled(&self, id: RequestId) -> GraphResult<bool> {
        let conn = self.lock()?;
        Ok(was_cancelled_in(&conn, id)?)
    }

    /// Retrieves the request between two actors, in either direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or `a == b`.
    pub fn find_request_between(
        &self,
        a: &ActorId,
        b: &ActorId,
    ) -> GraphResult<Option<FriendRequest>> {
        let pair = ActorPair::new(a, b)?;
        let conn = self.lock()?;
        Ok(request_between_in(&conn, &pair)?)
    }

    /// Returns true if any request exists between two actors.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or `a == b`.
    pub fn request_exists_between(&self, a: &ActorId, b: &ActorId) -> GraphResult<bool> {
        Ok(self.find_request_between(a, b)?.is_some())
    }

    /// Moves a pending request to `Accepted` and creates the friendship.
    ///
    /// Both writes commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::RequestNotFound`] if the request is missing and
    /// [`GraphError::Conflict`] if it is no longer pending or the friendship
    /// already exists.
    pub fn accept_request(
        &self,
        id: RequestId,
        now: DateTime<Utc>,
    ) -> GraphResult<(FriendRequest, Friendship)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ts = to_millis(now);
        transition_pending_in(&tx, id, RequestStatus::Accepted, ts)?;
        let request = match request_in(&tx, id)? {
            Some(request) => request,
            None => return Err(missing_request_in(&tx, id)?),
        };
        let pair = ActorPair::new(&request.requester_id, &request.requested_id)?;

        tx.execute(
            "INSERT INTO friendships (user_a_id, user_b_id, created_at) VALUES (?1, ?2, ?3)",
            params![pair.low().as_str(), pair.high().as_str(), ts],
        )
        .map_err(|e| {
            conflict_or(e, || {
                format!("{} and {} are already friends", pair.low(), pair.high())
            })
        })?;
        let friendship = Friendship {
            id: tx.last_insert_rowid(),
            user_a_id: pair.low().clone(),
            user_b_id: pair.high().clone(),
            created_at: from_millis(ts),
        };

        tx.commit()?;
        Ok((request, friendship))
    }

    /// Moves a pending request to `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::RequestNotFound`] if the request is missing and
    /// [`GraphError::Conflict`] if it is no longer pending.
    pub fn reject_request(&self, id: RequestId, now: DateTime<Utc>) -> GraphResult<FriendRequest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        transition_pending_in(&tx, id, RequestStatus::Rejected, to_millis(now))?;
        let request = match request_in(&tx, id)? {
            Some(request) => request,
            None => return Err(missing_request_in(&tx, id)?),
        };

        tx.commit()?;
        Ok(request)
    }

    /// Deletes a request that is still pending, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::RequestNotFound`] if the request is missing and
    /// [`GraphError::Conflict`] if it is no longer pending.
    pub fn delete_pending_request(&self, id: RequestId) -> GraphResult<FriendRequest> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let request = match request_in(&tx, id)? {
            Some(request) => request,
            None => return Err(missing_request_in(&tx, id)?),
        };
        let deleted = tx.execute(
            "DELETE FROM friend_requests WHERE id = ?1 AND status = ?2",
            params![id, RequestStatus::Pending.as_str()],
        )?;
        if deleted == 0 {
            return Err(not_pending(&request));
        }
        tx.execute(
            "INSERT OR IGNORE INTO cancelled_requests (id) VALUES (?1)",
            params![id],
        )?;

        tx.commit()?;
        Ok(request)
    }

    /// Resets the request between two actors back to `Pending`.
    ///
    /// Returns the reopened request, or `None` if no request exists for the
    /// pair. A request that is already pending is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or `a == b`.
    pub fn reopen_request(
        &self,
        a: &ActorId,
        b: &ActorId,
        now: DateTime<Utc>,
    ) -> GraphResult<Option<FriendRequest>> {
        let pair = ActorPair::new(a, b)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let reopened = reopen_request_in(&tx, &pair, to_millis(now))?;

        tx.commit()?;
        Ok(reopened)
    }

    /// Lists requests addressed to `actor` with the given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn requests_received(
        &self,
        actor: &ActorId,
        status: RequestStatus,
    ) -> GraphResult<Vec<FriendRequest>> {
        self.query_requests("requested_id", actor, status)
    }

    /// Lists requests sent by `actor` with the given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn requests_sent(
        &self,
        actor: &ActorId,
        status: RequestStatus,
    ) -> GraphResult<Vec<FriendRequest>> {
        self.query_requests("requester_id", actor, status)
    }

    /// Counts requests addressed to `actor` with the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_requests_received(
        &self,
        actor: &ActorId,
        status: RequestStatus,
    ) -> GraphResult<u64> {
        self.count_requests("requested_id", actor, status)
    }

    /// Counts requests sent by `actor` with the given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_requests_sent(&self, actor: &ActorId, status: RequestStatus) -> GraphResult<u64> {
        self.count_requests("requester_id", actor, status)
    }

    // `column` is always one of two literals chosen by the callers above.
    fn query_requests(
        &self,
        column: &str,
        actor: &ActorId,
        status: RequestStatus,
    ) -> GraphResult<Vec<FriendRequest>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests
             WHERE {column} = ?1 AND status = ?2
             ORDER BY created_at, id"
        ))?;
        let requests = stmt
            .query_map(params![actor.as_str(), status.as_str()], request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    fn count_requests(
        &self,
        column: &str,
        actor: &ActorId,
        status: RequestStatus,
    ) -> GraphResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM friend_requests WHERE {column} = ?1 AND status = ?2"),
            params![actor.as_str(), status.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // ==================== Friendship Operations ====================

    /// Deletes the friendship between two actors and reopens their request.
    ///
    /// Returns the reopened request if one existed.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::FriendshipNotFound`] if the actors are not
    /// friends, or [`GraphError::Validation`] if `a == b`.
    pub fn remove_friendship(
        &self,
        a: &ActorId,
        b: &ActorId,
        now: DateTime<Utc>,
    ) -> GraphResult<Option<FriendRequest>> {
        let pair = ActorPair::new(a, b)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = tx.execute(
            "DELETE FROM friendships WHERE user_a_id = ?1 AND user_b_id = ?2",
            params![pair.low().as_str(), pair.high().as_str()],
        )?;
        if deleted == 0 {
            return Err(GraphError::FriendshipNotFound(a.clone(), b.clone()));
        }
        let reopened = reopen_request_in(&tx, &pair, to_millis(now))?;

        tx.commit()?;
        Ok(reopened)
    }

    /// Retrieves the friendship between two actors.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or `a == b`.
    pub fn friendship_between(&self, a: &ActorId, b: &ActorId) -> GraphResult<Option<Friendship>> {
        let pair = ActorPair::new(a, b)?;
        let conn = self.lock()?;
        let friendship = conn
            .query_row(
                &format!(
                    "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
                     WHERE user_a_id = ?1 AND user_b_id = ?2"
                ),
                params![pair.low().as_str(), pair.high().as_str()],
                friendship_from_row,
            )
            .optional()?;
        Ok(friendship)
    }

    /// Returns true if the two actors are friends.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or `a == b`.
    pub fn friendship_exists(&self, a: &ActorId, b: &ActorId) -> GraphResult<bool> {
        let pair = ActorPair::new(a, b)?;
        let conn = self.lock()?;
        Ok(friendship_exists_in(&conn, &pair)?)
    }

    /// Lists the friends of `actor` in the order the friendships were made.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn friends_of(&self, actor: &ActorId) -> GraphResult<Vec<ActorId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT CASE WHEN user_a_id = ?1 THEN user_b_id ELSE user_a_id END
            FROM friendships
            WHERE user_a_id = ?1 OR user_b_id = ?1
            ORDER BY created_at, id
            ",
        )?;
        let friends = stmt
            .query_map(params![actor.as_str()], |row| {
                row.get::<_, String>(0).map(ActorId::from)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(friends)
    }

    /// Lists the friendships of `actor`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn friendships_of(&self, actor: &ActorId) -> GraphResult<Vec<Friendship>> {
        self.friendships_since(actor, DateTime::<Utc>::MIN_UTC)
    }

    /// Lists the friendships of `actor` created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn friendships_since(
        &self,
        actor: &ActorId,
        since: DateTime<Utc>,
    ) -> GraphResult<Vec<Friendship>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships
             WHERE (user_a_id = ?1 OR user_b_id = ?1) AND created_at >= ?2
             ORDER BY created_at, id"
        ))?;
        let friendships = stmt
            .query_map(params![actor.as_str(), to_millis(since)], friendship_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(friendships)
    }

    /// Counts the friends of `actor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_friends(&self, actor: &ActorId) -> GraphResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_a_id = ?1 OR user_b_id = ?1",
            params![actor.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// ==================== Row helpers ====================

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRequest> {
    let status: String = row.get(3)?;
    let status = RequestStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, "status".to_string(), rusqlite::types::Type::Text)
    })?;

    Ok(FriendRequest {
        id: row.get(0)?,
        requester_id: ActorId::from(row.get::<_, String>(1)?),
        requested_id: ActorId::from(row.get::<_, String>(2)?),
        status,
        created_at: from_millis(row.get(4)?),
        updated_at: from_millis(row.get(5)?),
    })
}

fn friendship_from_row(row: &Row<'_>) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: row.get(0)?,
        user_a_id: ActorId::from(row.get::<_, String>(1)?),
        user_b_id: ActorId::from(row.get::<_, String>(2)?),
        created_at: from_millis(row.get(3)?),
    })
}

fn request_in(conn: &Connection, id: RequestId) -> rusqlite::Result<Option<FriendRequest>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1"),
        params![id],
        request_from_row,
    )
    .optional()
}

fn request_between_in(
    conn: &Connection,
    pair: &ActorPair,
) -> rusqlite::Result<Option<FriendRequest>> {
    conn.query_row(
        &format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests
             WHERE pair_low = ?1 AND pair_high = ?2"
        ),
        params![pair.low().as_str(), pair.high().as_str()],
        request_from_row,
    )
    .optional()
}

fn friendship_exists_in(conn: &Connection, pair: &ActorPair) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_a_id = ?1 AND user_b_id = ?2)",
        params![pair.low().as_str(), pair.high().as_str()],
        |row| row.get(0),
    )
}

/// Compare-and-set from `Pending` to `next`. Zero affected rows means the
/// request is missing or another caller already moved it.
fn transition_pending_in(
    conn: &Connection,
    id: RequestId,
    next: RequestStatus,
    ts: i64,
) -> GraphResult<()> {
    let updated = conn.execute(
        "UPDATE friend_requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![next.as_str(), ts, id, RequestStatus::Pending.as_str()],
    )?;
    if updated == 0 {
        return Err(match request_in(conn, id)? {
            Some(request) => not_pending(&request),
            None => missing_request_in(conn, id)?,
        });
    }
    Ok(())
}

fn reopen_request_in(
    conn: &Connection,
    pair: &ActorPair,
    ts: i64,
) -> rusqlite::Result<Option<FriendRequest>> {
    conn.execute(
        "UPDATE friend_requests SET status = ?1, updated_at = ?2
         WHERE pair_low = ?3 AND pair_high = ?4 AND status <> ?1",
        params![
            RequestStatus::Pending.as_str(),
            ts,
            pair.low().as_str(),
            pair.high().as_str()
        ],
    )?;
    request_between_in(conn, pair)
}

fn was_cancelled_in(conn: &Connection, id: RequestId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cancelled_requests WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// Error for a request ID with no row: a cancelled request is no longer
/// pending, anything else never existed.
fn missing_request_in(conn: &Connection, id: RequestId) -> GraphResult<GraphError> {
    if was_cancelled_in(conn, id)? {
        Ok(cancelled(id))
    } else {
        Ok(GraphError::RequestNotFound(id))
    }
}

pub(super) fn cancelled(id: RequestId) -> GraphError {
    GraphError::Conflict(format!("Friend request {id} was cancelled, not pending"))
}

fn not_pending(request: &FriendRequest) -> GraphError {
    GraphError::Conflict(format!(
        "Friend request {} is {}, not pending",
        request.id, request.status
    ))
}

fn conflict_or(err: rusqlite::Error, message: impl FnOnce() -> String) -> GraphError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
            GraphError::Conflict(message())
        }
        other => GraphError::Database(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn actor(id: &str) -> ActorId {
        ActorId::from(id)
    }

    #[test]
    fn new_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let _storage = GraphStorage::new(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn reopening_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let storage = GraphStorage::new(&path).unwrap();
            storage
                .insert_request(&actor("a"), &actor("b"), Utc::now())
                .unwrap();
        }

        let storage = GraphStorage::new(&path).unwrap();
        assert!(storage
            .request_exists_between(&actor("b"), &actor("a"))
            .unwrap());
    }

    #[test]
    fn insert_and_get_request() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        let loaded = storage.get_request(request.id).unwrap().unwrap();
        assert_eq!(loaded, request);
    }

    #[test]
    fn get_missing_request_returns_none() {
        let storage = GraphStorage::in_memory().unwrap();
        assert!(storage.get_request(999).unwrap().is_none());
    }

    #[test]
    fn duplicate_request_in_either_direction_conflicts() {
        let storage = GraphStorage::in_memory().unwrap();
        storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();

        let same = storage.insert_request(&actor("a"), &actor("b"), Utc::now());
        assert!(matches!(same, Err(GraphError::Conflict(_))));

        let reverse = storage.insert_request(&actor("b"), &actor("a"), Utc::now());
        assert!(matches!(reverse, Err(GraphError::Conflict(_))));
    }

    #[test]
    fn self_request_is_validation_error() {
        let storage = GraphStorage::in_memory().unwrap();
        let result = storage.insert_request(&actor("a"), &actor("a"), Utc::now());
        assert!(matches!(result, Err(GraphError::Validation(_))));
    }

    #[test]
    fn accept_creates_friendship_atomically() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("b"), &actor("a"), Utc::now())
            .unwrap();

        let (accepted, friendship) = storage.accept_request(request.id, Utc::now()).unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(friendship.user_a_id, actor("a"));
        assert_eq!(friendship.user_b_id, actor("b"));
        assert!(storage.friendship_exists(&actor("a"), &actor("b")).unwrap());
        assert!(storage.friendship_exists(&actor("b"), &actor("a")).unwrap());
    }

    #[test]
    fn second_accept_conflicts() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage.accept_request(request.id, Utc::now()).unwrap();

        let again = storage.accept_request(request.id, Utc::now());
        assert!(matches!(again, Err(GraphError::Conflict(_))));
        assert_eq!(storage.count_friends(&actor("a")).unwrap(), 1);
    }

    #[test]
    fn accept_missing_request_is_not_found() {
        let storage = GraphStorage::in_memory().unwrap();
        let result = storage.accept_request(7, Utc::now());
        assert!(matches!(result, Err(GraphError::RequestNotFound(7))));
    }

    #[test]
    fn reject_then_accept_conflicts() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();

        let rejected = storage.reject_request(request.id, Utc::now()).unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);

        let result = storage.accept_request(request.id, Utc::now());
        assert!(matches!(result, Err(GraphError::Conflict(_))));
        assert!(!storage.friendship_exists(&actor("a"), &actor("b")).unwrap());
    }

    #[test]
    fn delete_pending_request() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();

        let deleted = storage.delete_pending_request(request.id).unwrap();
        assert_eq!(deleted.id, request.id);
        assert!(storage.get_request(request.id).unwrap().is_none());

        let again = storage.delete_pending_request(request.id);
        assert!(matches!(again, Err(GraphError::Conflict(_))));
        assert!(storage.was_cancelled(request.id).unwrap());
    }

    #[test]
    fn transitions_on_cancelled_request_conflict() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage.delete_pending_request(request.id).unwrap();

        let accepted = storage.accept_request(request.id, Utc::now());
        assert!(matches!(accepted, Err(GraphError::Conflict(_))));
        let rejected = storage.reject_request(request.id, Utc::now());
        assert!(matches!(rejected, Err(GraphError::Conflict(_))));
        assert!(!storage.was_cancelled(request.id + 1).unwrap());
    }

    #[test]
    fn delete_answered_request_conflicts() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage.reject_request(request.id, Utc::now()).unwrap();

        let result = storage.delete_pending_request(request.id);
        assert!(matches!(result, Err(GraphError::Conflict(_))));
        assert!(storage.get_request(request.id).unwrap().is_some());
    }

    #[test]
    fn remove_friendship_reopens_request() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage.accept_request(request.id, Utc::now()).unwrap();

        let reopened = storage
            .remove_friendship(&actor("b"), &actor("a"), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(reopened.id, request.id);
        assert_eq!(reopened.status, RequestStatus::Pending);
        assert!(!storage.friendship_exists(&actor("a"), &actor("b")).unwrap());
    }

    #[test]
    fn remove_missing_friendship_is_not_found() {
        let storage = GraphStorage::in_memory().unwrap();
        let result = storage.remove_friendship(&actor("a"), &actor("b"), Utc::now());
        assert!(matches!(result, Err(GraphError::FriendshipNotFound(..))));
    }

    #[test]
    fn reopen_without_request_returns_none() {
        let storage = GraphStorage::in_memory().unwrap();
        let reopened = storage
            .reopen_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        assert!(reopened.is_none());
    }

    #[test]
    fn reopen_rejected_request() {
        let storage = GraphStorage::in_memory().unwrap();
        let request = storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage.reject_request(request.id, Utc::now()).unwrap();

        let reopened = storage
            .reopen_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap()
            .unwrap();
        assert!(reopened.is_pending());
    }

    #[test]
    fn friends_of_lists_both_directions() {
        let storage = GraphStorage::in_memory().unwrap();
        for (from, to) in [("b", "a"), ("a", "c")] {
            let request = storage
                .insert_request(&actor(from), &actor(to), Utc::now())
                .unwrap();
            storage.accept_request(request.id, Utc::now()).unwrap();
        }

        let friends = storage.friends_of(&actor("a")).unwrap();
        assert_eq!(friends, vec![actor("b"), actor("c")]);
        assert_eq!(storage.friends_of(&actor("c")).unwrap(), vec![actor("a")]);
        assert_eq!(storage.count_friends(&actor("a")).unwrap(), 2);
        assert_eq!(storage.friendships_of(&actor("a")).unwrap().len(), 2);
    }

    #[test]
    fn friendships_since_filters_by_creation() {
        let storage = GraphStorage::in_memory().unwrap();
        let old = Utc::now() - Duration::days(10);
        let request = storage.insert_request(&actor("a"), &actor("b"), old).unwrap();
        storage.accept_request(request.id, old).unwrap();

        let request = storage
            .insert_request(&actor("a"), &actor("c"), Utc::now())
            .unwrap();
        storage.accept_request(request.id, Utc::now()).unwrap();

        let recent = storage
            .friendships_since(&actor("a"), Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].involves(&actor("c")));
    }

    #[test]
    fn request_listing_and_counts() {
        let storage = GraphStorage::in_memory().unwrap();
        storage
            .insert_request(&actor("a"), &actor("b"), Utc::now())
            .unwrap();
        storage
            .insert_request(&actor("c"), &actor("b"), Utc::now())
            .unwrap();
        let answered = storage
            .insert_request(&actor("d"), &actor("b"), Utc::now())
            .unwrap();
        storage.reject_request(answered.id, Utc::now()).unwrap();

        let received = storage
            .requests_received(&actor("b"), RequestStatus::Pending)
            .unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(
            storage
                .count_requests_received(&actor("b"), RequestStatus::Pending)
                .unwrap(),
            2
        );
        assert_eq!(
            storage
                .count_requests_received(&actor("b"), RequestStatus::Rejected)
                .unwrap(),
            1
        );
        assert_eq!(
            storage
                .requests_sent(&actor("a"), RequestStatus::Pending)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            storage
                .count_requests_sent(&actor("b"), RequestStatus::Pending)
                .unwrap(),
            0
        );
    }
}
