//! Units of work
//!
//! A [`UnitOfWork`] wraps one SQLite transaction and a log of staged row
//! changes. Changes are written to the transaction in staging order when the
//! unit flushes: before reads while autoflush is on, and always on commit.
//! Playlist mutations also stage [`MirrorChange`]s, which are written to the
//! XML mirror inside the commit so the file and the database advance
//! together.
//!
//! Dropping a unit of work without committing rolls everything back.

use std::collections::HashSet;

use rusqlite::types::Value;
use rusqlite::{Connection, Transaction};
use tracing::{debug, warn};

use crate::catalog::{self, Entity, Record, Table, USN_COLUMN};
use crate::error::{Error, Result};
use crate::mirror::{MirrorChange, PlaylistMirror};
use crate::storage::persistence::FileBackup;
use crate::usn;

/// One staged row change
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert(Entity),
    Update {
        table: Table,
        id: String,
        column: String,
        value: Value,
    },
    Delete {
        table: Table,
        id: String,
    },
}

impl Change {
    pub fn table(&self) -> Table {
        match self {
            Change::Insert(entity) => entity.table(),
            Change::Update { table, .. } | Change::Delete { table, .. } => *table,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Change::Insert(entity) => entity.id(),
            Change::Update { id, .. } | Change::Delete { id, .. } => id.as_str(),
        }
    }

    fn is_stamp(&self) -> bool {
        matches!(self, Change::Update { column, .. } if column == USN_COLUMN)
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        match self {
            Change::Insert(entity) => catalog::insert_entity(conn, entity)?,
            Change::Update {
                table,
                id,
                column,
                value,
            } => {
                if catalog::update_column(conn, *table, id, column, value)? == 0 {
                    return Err(Error::not_found(table.name(), id.clone()));
                }
            }
            Change::Delete { table, id } => {
                if catalog::delete_row(conn, *table, id)? == 0 {
                    return Err(Error::not_found(table.name(), id.clone()));
                }
            }
        }
        Ok(())
    }
}

/// A transaction plus the row changes staged in it
pub struct UnitOfWork<'a> {
    tx: Transaction<'a>,
    mirror: Option<&'a mut PlaylistMirror>,
    autoflush: bool,
    changes: Vec<Change>,
    /// Index of the first change not yet written to the transaction
    flushed: usize,
    /// Index of the first change not yet covered by a USN stamp
    usn_mark: usize,
    mirror_changes: Vec<MirrorChange>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(tx: Transaction<'a>, mirror: Option<&'a mut PlaylistMirror>) -> Self {
        Self {
            tx,
            mirror,
            autoflush: true,
            changes: Vec::new(),
            flushed: 0,
            usn_mark: 0,
            mirror_changes: Vec::new(),
        }
    }

    /// The transaction's connection, for queries that bypass staging
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Whether a mirror document is attached
    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// The mirror as it was when the unit of work started
    pub fn mirror(&self) -> Option<&PlaylistMirror> {
        self.mirror.as_deref()
    }

    // ==================== Staging ====================

    /// Stage a new row
    pub fn insert(&mut self, entity: impl Into<Entity>) {
        self.changes.push(Change::Insert(entity.into()));
    }

    /// Stage a single-column update
    ///
    /// Fails without staging anything when the column is not writable.
    pub fn update(
        &mut self,
        table: Table,
        id: impl Into<String>,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        if !table.is_writable(column) {
            return Err(Error::validation(format!(
                "column '{column}' of {table} is not writable"
            )));
        }
        self.changes.push(Change::Update {
            table,
            id: id.into(),
            column: column.to_string(),
            value: value.into(),
        });
        Ok(())
    }

    /// Stage a row deletion
    pub fn delete(&mut self, table: Table, id: impl Into<String>) {
        self.changes.push(Change::Delete {
            table,
            id: id.into(),
        });
    }

    /// Every change staged so far, flushed or not
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Changes not yet written to the transaction
    pub fn pending(&self) -> &[Change] {
        &self.changes[self.flushed..]
    }

    /// Stage a mirror update for the commit
    pub fn stage_mirror(&mut self, change: MirrorChange) {
        self.mirror_changes.push(change);
    }

    // ==================== Flushing ====================

    pub fn autoflush(&self) -> bool {
        self.autoflush
    }

    pub fn set_autoflush(&mut self, autoflush: bool) {
        self.autoflush = autoflush;
    }

    /// Run `f` with autoflush off, restoring the previous setting afterwards
    pub fn no_autoflush<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.autoflush;
        self.autoflush = false;
        let result = f(self);
        self.autoflush = previous;
        result
    }

    /// Write pending changes to the transaction in staging order
    ///
    /// A failed flush leaves the transaction partially written; the unit of
    /// work must then be dropped or rolled back.
    pub fn flush(&mut self) -> Result<()> {
        let pending = self.changes.len() - self.flushed;
        if pending == 0 {
            return Ok(());
        }
        for change in &self.changes[self.flushed..] {
            change.apply(&self.tx)?;
        }
        self.flushed = self.changes.len();
        debug!("Flushed {} staged changes", pending);
        Ok(())
    }

    fn autoflush_before_read(&mut self) -> Result<()> {
        if self.autoflush {
            self.flush()?;
        }
        Ok(())
    }

    // ==================== Reads ====================

    /// Fetch a typed row as the transaction currently sees it
    pub fn get<T: Record>(&mut self, id: &str) -> Result<Option<T>> {
        self.autoflush_before_read()?;
        catalog::fetch(&self.tx, id)
    }

    /// Fetch a typed row or fail with a not-found error
    pub fn require<T: Record>(&mut self, id: &str) -> Result<T> {
        self.get(id)?.ok_or_else(|| Error::not_found(T::KIND, id))
    }

    /// Fetch typed rows matching a SQL condition
    pub fn select<T: Record>(&mut self, condition: &str, params: &[Value]) -> Result<Vec<T>> {
        self.autoflush_before_read()?;
        catalog::fetch_where(&self.tx, condition, params)
    }

    // ==================== USN ====================

    /// Current local USN inside this transaction
    pub fn local_usn(&self) -> Result<i64> {
        usn::read_local_usn(&self.tx)
    }

    /// Add `amount` (>= 1) to the local USN
    pub fn increment_local_usn(&mut self, amount: i64) -> Result<i64> {
        usn::increment_local_usn(&self.tx, amount)
    }

    /// Stamp every row changed since the last stamp with its own USN
    ///
    /// Rows are counted once no matter how many of their columns changed,
    /// in order of their first staged change. Deleted rows and tables
    /// without a version column are skipped. The local USN advances by the
    /// number of stamped rows, and the new value is returned; with nothing
    /// to stamp it is returned unchanged.
    pub fn autoincrement_usn(&mut self) -> Result<i64> {
        let rows = self.unstamped_rows();

        let start = usn::read_local_usn(&self.tx)?;
        if rows.is_empty() {
            self.usn_mark = self.changes.len();
            return Ok(start);
        }

        let mut next = start;
        for (table, id) in rows {
            next += 1;
            self.changes.push(Change::Update {
                table,
                id,
                column: USN_COLUMN.to_string(),
                value: Value::Integer(next),
            });
        }
        self.usn_mark = self.changes.len();

        usn::write_local_usn(&self.tx, next)?;
        debug!("Stamped {} rows, local USN {} -> {}", next - start, start, next);
        Ok(next)
    }

    /// Distinct rows changed since the last stamp, in first-change order
    fn unstamped_rows(&self) -> Vec<(Table, String)> {
        let deleted: HashSet<(Table, &str)> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::Delete { table, id } => Some((*table, id.as_str())),
                _ => None,
            })
            .collect();

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for change in &self.changes[self.usn_mark..] {
            if change.is_stamp() || matches!(change, Change::Delete { .. }) {
                continue;
            }
            let key = (change.table(), change.id());
            if !key.0.is_versioned() || deleted.contains(&key) {
                continue;
            }
            if seen.insert(key) {
                rows.push((key.0, key.1.to_string()));
            }
        }
        rows
    }

    // ==================== Completion ====================

    /// Flush, write the mirror and commit
    ///
    /// The mirror file is replaced before the database commits; if the
    /// commit fails the previous document is put back and the in-memory
    /// mirror is left untouched.
    pub fn commit(mut self) -> Result<()> {
        self.flush()?;

        let UnitOfWork {
            tx,
            mirror,
            mirror_changes,
            ..
        } = self;

        let staged = match mirror {
            Some(current) if !mirror_changes.is_empty() => {
                let mut next = current.clone();
                for change in &mirror_changes {
                    change.apply(&mut next)?;
                }
                let xml = next.to_xml()?;
                let backup = FileBackup::replace(next.path(), xml.as_bytes())?;
                debug!("Wrote {} mirror changes to {:?}", mirror_changes.len(), next.path());
                Some((current, next, backup))
            }
            Some(_) => None,
            None => {
                if !mirror_changes.is_empty() {
                    debug!("No playlist mirror attached, skipping {} changes", mirror_changes.len());
                }
                None
            }
        };

        if let Err(e) = tx.commit() {
            if let Some((_, next, backup)) = staged {
                if let Err(restore_err) = backup.restore() {
                    warn!("Failed to restore mirror {:?}: {}", next.path(), restore_err);
                }
            }
            return Err(Error::Transaction(e));
        }

        if let Some((current, next, backup)) = staged {
            backup.release();
            *current = next;
        }
        Ok(())
    }

    /// Discard every staged change
    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, Playlist, PlaylistKind, ROOT_PLAYLIST_ID};
    use crate::storage::schema::init_schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for (id, title) in [("1", "A"), ("2", "B"), ("3", "C")] {
            catalog::insert_entity(&conn, &Content::new(id, title).into()).unwrap();
        }
        catalog::insert_entity(
            &conn,
            &Playlist::new("10", "List", PlaylistKind::Playlist, ROOT_PLAYLIST_ID, 1).into(),
        )
        .unwrap();
        conn
    }

    fn content(conn: &Connection, id: &str) -> Option<Content> {
        catalog::fetch(conn, id).unwrap()
    }

    #[test]
    fn test_autoincrement_counts_rows_not_fields() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();
        let c_usn = content(&conn, "3").unwrap().usn;

        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        let new_usn = uow.no_autoflush(|uow| {
            uow.update(Table::Content, "1", "Title", "A2".to_string()).unwrap();
            uow.update(Table::Content, "2", "Title", "B2".to_string()).unwrap();
            uow.update(Table::Content, "2", "BPM", 12800i64).unwrap();
            uow.delete(Table::Content, "3");

            let c: Content = uow.get("3").unwrap().unwrap();
            assert_eq!(c.usn, c_usn);

            uow.autoincrement_usn().unwrap()
        });
        uow.commit().unwrap();

        assert_eq!(new_usn, old_usn + 2);
        assert_eq!(usn::read_local_usn(&conn).unwrap(), old_usn + 2);

        let a = content(&conn, "1").unwrap();
        let b = content(&conn, "2").unwrap();
        assert_eq!(a.usn, Some(old_usn + 1));
        assert_eq!(b.usn, Some(old_usn + 2));
        assert_eq!(b.title.as_deref(), Some("B2"));
        assert_eq!(b.bpm, Some(12800));
        assert!(content(&conn, "3").is_none());
    }

    #[test]
    fn test_autoincrement_with_no_changes() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();

        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn);
        uow.commit().unwrap();

        assert_eq!(usn::read_local_usn(&conn).unwrap(), old_usn);
    }

    #[test]
    fn test_inserts_are_stamped() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();

        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        uow.insert(Content::new("4", "D"));
        uow.update(Table::Playlist, "10", "Name", "Renamed".to_string()).unwrap();
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn + 2);
        uow.commit().unwrap();

        assert_eq!(content(&conn, "4").unwrap().usn, Some(old_usn + 1));
        let playlist: Playlist = catalog::fetch(&conn, "10").unwrap().unwrap();
        assert_eq!(playlist.usn, Some(old_usn + 2));
    }

    #[test]
    fn test_second_autoincrement_only_counts_new_changes() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();

        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        uow.update(Table::Content, "1", "Title", "A2".to_string()).unwrap();
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn + 1);
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn + 1);
        uow.update(Table::Content, "2", "Title", "B2".to_string()).unwrap();
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn + 2);
        uow.commit().unwrap();
    }

    #[test]
    fn test_registry_changes_are_not_stamped() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();

        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        uow.update(Table::AgentRegistry, "localUpdateCount", "str_1", "x".to_string())
            .unwrap();
        assert_eq!(uow.autoincrement_usn().unwrap(), old_usn);
    }

    #[test]
    fn test_drop_rolls_back() {
        let mut conn = test_conn();
        let old_usn = usn::read_local_usn(&conn).unwrap();

        {
            let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
            uow.update(Table::Content, "1", "Title", "Gone".to_string()).unwrap();
            uow.autoincrement_usn().unwrap();
            uow.flush().unwrap();
        }

        assert_eq!(content(&conn, "1").unwrap().title.as_deref(), Some("A"));
        assert_eq!(usn::read_local_usn(&conn).unwrap(), old_usn);
    }

    #[test]
    fn test_autoflush_makes_staged_rows_visible() {
        let mut conn = test_conn();
        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);

        uow.insert(Content::new("4", "D"));
        uow.no_autoflush(|uow| {
            assert!(uow.get::<Content>("4").unwrap().is_none());
            assert_eq!(uow.pending().len(), 1);
        });
        assert!(uow.autoflush());
        assert!(uow.get::<Content>("4").unwrap().is_some());
        assert!(uow.pending().is_empty());
    }

    #[test]
    fn test_update_rejects_unknown_column() {
        let mut conn = test_conn();
        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);

        let err = uow
            .update(Table::Content, "1", "NoSuchColumn", 1i64)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(uow.changes().is_empty());
    }

    #[test]
    fn test_update_missing_row_fails_on_flush() {
        let mut conn = test_conn();
        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);

        uow.update(Table::Content, "999", "Title", "X".to_string()).unwrap();
        assert!(matches!(uow.flush(), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_rollback() {
        let mut conn = test_conn();
        let mut uow = UnitOfWork::new(conn.transaction().unwrap(), None);
        uow.delete(Table::Content, "1");
        uow.flush().unwrap();
        uow.rollback().unwrap();

        assert!(content(&conn, "1").is_some());
    }
}
