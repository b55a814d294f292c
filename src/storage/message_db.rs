use rusqlite::{Connection, Result as SqlResult, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::ensure_data_dir;
use crate::common::ChatMessage;
use crate::error::{StoreError, StoreResult};

type MessageRow = (String, String, String, String, String);

const SELECT_COLUMNS: &str = "SELECT timestamp, author, direction, content, status FROM messages";

/// Append-only chat log.
///
/// All access goes through one mutex-guarded connection, so writers are
/// serialized and readers never see a half-applied batch.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Open (or create) the log at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        ensure_data_dir(&path)?;
        let conn = Connection::open(path)?;
        // WAL lets history reads run while a writer holds the lock.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert one message.
    ///
    /// Returns the assigned row id, or `None` when a message with the same
    /// `(author, timestamp, content)` is already stored.
    pub fn append(&self, message: &ChatMessage) -> StoreResult<Option<i64>> {
        Ok(insert_message(&self.lock(), message)?)
    }

    /// Insert a batch atomically, skipping messages already present.
    /// Returns the messages that were actually new, in input order.
    pub fn append_batch(&self, messages: &[ChatMessage]) -> StoreResult<Vec<ChatMessage>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut inserted = Vec::new();
        for message in messages {
            if insert_message(&tx, message)?.is_some() {
                inserted.push(message.clone());
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Full history, oldest first
    pub fn query_all(&self) -> StoreResult<Vec<ChatMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY timestamp ASC, id ASC"))?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        rows.into_iter().map(into_message).collect()
    }

    /// Messages with `timestamp` strictly greater than `timestamp`, oldest first
    pub fn query_since(&self, timestamp: &str) -> StoreResult<Vec<ChatMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE timestamp > ?1 ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![timestamp], read_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        rows.into_iter().map(into_message).collect()
    }

    pub fn message_count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn init_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            author TEXT NOT NULL,
            direction TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'delivered'
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp)",
        [],
    )?;

    // Cross-peer identity; merges and relays rely on it to stay duplicate-free.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_identity
         ON messages(author, timestamp, content)",
        [],
    )?;

    Ok(())
}

fn insert_message(conn: &Connection, message: &ChatMessage) -> SqlResult<Option<i64>> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO messages (timestamp, author, direction, content, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.timestamp,
            message.author,
            message.direction.as_str(),
            message.content,
            message.status.as_str()
        ],
    )?;
    if changed == 0 {
        Ok(None)
    } else {
        Ok(Some(conn.last_insert_rowid()))
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> SqlResult<MessageRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_message(
    (timestamp, author, direction, content, status): MessageRow,
) -> StoreResult<ChatMessage> {
    Ok(ChatMessage {
        direction: direction.parse().map_err(StoreError::InvalidRow)?,
        status: status.parse().map_err(StoreError::InvalidRow)?,
        timestamp,
        author,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DeliveryStatus, Direction};

    fn ts(seconds: u32) -> String {
        format!("2024-06-01T12:00:{seconds:02}.000000Z")
    }

    #[test]
    fn query_all_orders_by_timestamp_then_insertion() {
        let store = MessageStore::in_memory().unwrap();
        store.append(&ChatMessage::sent("bob", "third", ts(30))).unwrap();
        store.append(&ChatMessage::sent("bob", "first", ts(10))).unwrap();
        store.append(&ChatMessage::received("amy", "tie-a", ts(20))).unwrap();
        store.append(&ChatMessage::received("cal", "tie-b", ts(20))).unwrap();

        let contents: Vec<_> = store
            .query_all()
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["first", "tie-a", "tie-b", "third"]);
    }

    #[test]
    fn query_since_is_a_strict_suffix() {
        let store = MessageStore::in_memory().unwrap();
        for second in [5, 10, 15, 20] {
            store
                .append(&ChatMessage::sent("bob", format!("m{second}"), ts(second)))
                .unwrap();
        }

        let all = store.query_all().unwrap();
        let since = store.query_since(&ts(10)).unwrap();
        assert_eq!(since, all[2..].to_vec());
        assert!(store.query_since(&ts(20)).unwrap().is_empty());
        assert_eq!(store.query_since(crate::common::time::EPOCH).unwrap(), all);
    }

    #[test]
    fn duplicate_identity_is_ignored() {
        let store = MessageStore::in_memory().unwrap();
        let original = ChatMessage::sent("alice", "hello", ts(1));
        let relayed = ChatMessage::received("alice", "hello", ts(1));

        assert!(store.append(&original).unwrap().is_some());
        assert_eq!(store.append(&relayed).unwrap(), None);
        assert_eq!(store.message_count().unwrap(), 1);
        assert_eq!(store.query_all().unwrap()[0].direction, Direction::Sent);
    }

    #[test]
    fn append_batch_reports_only_new_messages() {
        let store = MessageStore::in_memory().unwrap();
        let a = ChatMessage::sent("alice", "a", ts(1));
        let b = ChatMessage::sent("alice", "b", ts(2));
        store.append(&a).unwrap();

        let inserted = store.append_batch(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(inserted, vec![b]);
        assert_eq!(store.message_count().unwrap(), 2);
    }

    #[test]
    fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");

        {
            let store = MessageStore::open(&path).unwrap();
            store
                .append(&ChatMessage::sent("alice", "kept", ts(3)).with_status(DeliveryStatus::Pending))
                .unwrap();
        }

        let reopened = MessageStore::open(&path).unwrap();
        let all = reopened.query_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "kept");
        assert_eq!(all[0].status, DeliveryStatus::Pending);
    }
}
