//! Local USN ledger
//!
//! The database-wide update sequence number lives in the `agentRegistry`
//! row `localUpdateCount` (column `int_1`). Rows carry their own stamp in
//! `rb_local_usn`; stamping happens in [`crate::UnitOfWork::autoincrement_usn`],
//! this module only reads and writes the counter.

use rusqlite::{params, Connection, OptionalExtension};

use crate::catalog::{format_timestamp, now};
use crate::error::{Error, Result};
use crate::storage::schema::LOCAL_USN_REGISTRY_ID;

/// Read the current local USN
pub fn read_local_usn(conn: &Connection) -> Result<i64> {
    let usn: Option<Option<i64>> = conn
        .query_row(
            "SELECT int_1 FROM agentRegistry WHERE registry_id = ?1",
            [LOCAL_USN_REGISTRY_ID],
            |row| row.get(0),
        )
        .optional()?;

    match usn {
        Some(Some(value)) => Ok(value),
        _ => Err(Error::not_found("Registry entry", LOCAL_USN_REGISTRY_ID)),
    }
}

/// Overwrite the local USN
pub fn write_local_usn(conn: &Connection, usn: i64) -> Result<()> {
    if usn < 1 {
        return Err(Error::validation(format!("local USN must be >= 1, got {usn}")));
    }
    let updated = conn.execute(
        "UPDATE agentRegistry SET int_1 = ?1, updated_at = ?2 WHERE registry_id = ?3",
        params![usn, format_timestamp(&now()), LOCAL_USN_REGISTRY_ID],
    )?;
    if updated == 0 {
        return Err(Error::not_found("Registry entry", LOCAL_USN_REGISTRY_ID));
    }
    Ok(())
}

/// Reject increments below one
pub fn check_increment(amount: i64) -> Result<()> {
    if amount < 1 {
        return Err(Error::validation(format!(
            "USN increment must be >= 1, got {amount}"
        )));
    }
    Ok(())
}

/// Add `amount` to the local USN and return the new value
pub fn increment_local_usn(conn: &Connection, amount: i64) -> Result<i64> {
    check_increment(amount)?;
    let usn = read_local_usn(conn)? + amount;
    write_local_usn(conn, usn)?;
    Ok(usn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{init_schema, INITIAL_LOCAL_USN};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_read_initial() {
        let conn = test_conn();
        assert_eq!(read_local_usn(&conn).unwrap(), INITIAL_LOCAL_USN);
    }

    #[test]
    fn test_increment() {
        let conn = test_conn();
        let old = read_local_usn(&conn).unwrap();

        assert_eq!(increment_local_usn(&conn, 1).unwrap(), old + 1);
        assert_eq!(increment_local_usn(&conn, 2).unwrap(), old + 3);
        assert_eq!(read_local_usn(&conn).unwrap(), old + 3);
    }

    #[test]
    fn test_increment_rejects_non_positive() {
        let conn = test_conn();
        let old = read_local_usn(&conn).unwrap();

        assert!(matches!(increment_local_usn(&conn, 0), Err(Error::Validation(_))));
        assert!(matches!(increment_local_usn(&conn, -1), Err(Error::Validation(_))));
        assert_eq!(read_local_usn(&conn).unwrap(), old);
    }

    #[test]
    fn test_write_rejects_zero() {
        let conn = test_conn();
        assert!(write_local_usn(&conn, 0).is_err());
        write_local_usn(&conn, 77).unwrap();
        assert_eq!(read_local_usn(&conn).unwrap(), 77);
    }

    #[test]
    fn test_missing_registry_row() {
        let conn = test_conn();
        conn.execute("DELETE FROM agentRegistry", []).unwrap();

        assert!(matches!(read_local_usn(&conn), Err(Error::NotFound { .. })));
        assert!(matches!(write_local_usn(&conn, 5), Err(Error::NotFound { .. })));
    }
}
