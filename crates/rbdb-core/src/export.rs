//! JSON export of raw table rows

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Number, Value as Json};
use tracing::info;

use crate::catalog::{table_exists, Table};
use crate::error::Result;
use crate::storage::persistence::atomic_write;

/// A row as column name to JSON value
pub type JsonRow = Map<String, Json>;

fn to_json(value: ValueRef<'_>) -> Json {
    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null),
        ValueRef::Text(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Json::String(bytes.iter().map(|b| format!("{b:02x}")).collect()),
    }
}

/// Every row of `table` in storage order, with all of its columns
pub fn rows(conn: &Connection, table: Table) -> Result<Vec<JsonRow>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table.name()))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut out = Vec::new();
    let mut result = stmt.query([])?;
    while let Some(row) = result.next()? {
        let mut map = JsonRow::new();
        for (i, name) in columns.iter().enumerate() {
            map.insert(name.clone(), to_json(row.get_ref(i)?));
        }
        out.push(map);
    }
    Ok(out)
}

/// Every catalog table present in the file, keyed by table name
pub fn dump(conn: &Connection) -> Result<JsonRow> {
    let mut tables = JsonRow::new();
    for &table in Table::ALL {
        if !table_exists(conn, table)? {
            continue;
        }
        let rows = rows(conn, table)?.into_iter().map(Json::Object).collect();
        tables.insert(table.name().to_string(), Json::Array(rows));
    }
    Ok(tables)
}

/// Write [`dump`] to `path` as pretty-printed JSON
pub fn write_json(conn: &Connection, path: &Path) -> Result<()> {
    let tables = dump(conn)?;
    let data = serde_json::to_vec_pretty(&Json::Object(tables))?;
    atomic_write(path, &data)?;
    info!("Exported library to {:?}", path);
    Ok(())
}
