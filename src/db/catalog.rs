//! Access to the Lightroom catalog: image enumeration and the
//! `Adobe_variablesTable` key-value store.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{Result, TransferError};
use crate::geometry::Orientation;

pub const ENTITY_ID_COUNTER: &str = "Adobe_entityIDCounter";
pub const ROOT_KEYWORD_ID: &str = "AgLibraryKeyword_rootTagID";
pub const NEW_PERSON_KEYWORD_PARENT: &str = "AgLibraryKeywords_newPersonKeywordParent";
pub const NEW_KEYWORD_PARENT: &str = "AgLibraryKeywords_newKeywordParent";
pub const POPULARITY_INCREMENT: &str = "LibraryKeywordSuggestions_popularityIncrement";

/// An image of the destination catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: i64,
    pub file_name: String,
    /// `AgLibraryFile.externalModTime`, whole seconds.
    pub modified: i64,
    /// The raw orientation code, written back verbatim into face rows.
    pub orientation_code: String,
    pub copy_name: String,
}

impl MediaRecord {
    pub fn orientation(&self) -> Orientation {
        Orientation::from_code(&self.orientation_code)
    }
}

/// Open an existing catalog for writing. The catalog is never created.
pub fn open(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(TransferError::CatalogNotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Every image reachable through file, folder and root folder.
pub fn list_images(conn: &Connection) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT F.originalFilename, I.id_local, I.orientation,
               CAST(F.externalModTime AS INTEGER), I.copyName
        FROM Adobe_images I, AgLibraryFile F, AgLibraryFolder O, AgLibraryRootFolder R
        WHERE F.id_local = I.rootFile
        AND O.id_local = F.folder
        AND R.id_local = O.rootFolder
        ORDER BY I.id_local
        "#,
    )?;
    let images = stmt
        .query_map([], |row| {
            Ok(MediaRecord {
                file_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                id: row.get(1)?,
                orientation_code: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                modified: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                copy_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(images)
}

pub fn variable_i64(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT CAST(value AS INTEGER) FROM Adobe_variablesTable WHERE name = ?",
            [name],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

pub fn variable_f64(conn: &Connection, name: &str) -> Result<Option<f64>> {
    let value = conn
        .query_row(
            "SELECT CAST(value AS REAL) FROM Adobe_variablesTable WHERE name = ?",
            [name],
            |row| row.get::<_, Option<f64>>(0),
        )
        .optional()?;
    Ok(value.flatten())
}

/// Update an existing variable. Returns whether a row was changed.
pub fn set_variable<V: rusqlite::ToSql>(conn: &Connection, name: &str, value: V) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE Adobe_variablesTable SET value = ? WHERE name = ?",
        params![value, name],
    )?;
    Ok(changed > 0)
}

/// A fresh `id_global`: Lightroom uses uppercase UUIDs.
pub fn new_global_id() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// Insert a variable row. `id_local` comes from the entity counter.
pub fn insert_variable<V: rusqlite::ToSql>(
    conn: &Connection,
    id_local: i64,
    name: &str,
    value: V,
) -> Result<()> {
    conn.execute(
        "INSERT INTO Adobe_variablesTable (id_local, id_global, name, type, value) VALUES (?, ?, ?, NULL, ?)",
        params![id_local, new_global_id(), name, value],
    )?;
    Ok(())
}
