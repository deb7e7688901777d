//! Fixture catalogs for the transfer tests.

use rusqlite::{params, Connection};

use crate::db::catalog::{self, ENTITY_ID_COUNTER, ROOT_KEYWORD_ID};
use crate::db::schema::{CATALOG_SCHEMA, FACES_SCHEMA, LIBRARY_SCHEMA};
use crate::db::source::SourceLibrary;

pub(crate) const ROOT_KEYWORD: i64 = 7;
pub(crate) const FIRST_ID: i64 = 1000;

/// An empty catalog with the entity counter and keyword root configured.
pub(crate) fn catalog() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(CATALOG_SCHEMA).unwrap();
    catalog::insert_variable(&conn, 1, ENTITY_ID_COUNTER, FIRST_ID).unwrap();
    catalog::insert_variable(&conn, 2, ROOT_KEYWORD_ID, ROOT_KEYWORD).unwrap();
    conn
}

/// Add an image below a single root folder. File ids are `id + 100`.
pub(crate) fn add_image(conn: &Connection, id: i64, file_name: &str, modified: i64, orientation: &str, copy_name: Option<&str>) {
    conn.execute_batch(
        r#"
        INSERT OR IGNORE INTO AgLibraryRootFolder (id_local, id_global, absolutePath) VALUES (1, 'root', '/photos/');
        INSERT OR IGNORE INTO AgLibraryFolder (id_local, id_global, rootFolder) VALUES (2, 'folder', 1);
        "#,
    )
    .unwrap();
    conn.execute(
        "INSERT INTO AgLibraryFile (id_local, id_global, folder, originalFilename, externalModTime) VALUES (?, ?, 2, ?, ?)",
        params![id + 100, format!("file-{}", id), file_name, modified as f64],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO Adobe_images (id_local, id_global, rootFile, orientation, copyName) VALUES (?, ?, ?, ?, ?)",
        params![id, format!("image-{}", id), id + 100, orientation, copy_name],
    )
    .unwrap();
}

/// An Aperture library seeded with the given statements.
pub(crate) fn source(library_rows: &str, face_rows: &str) -> SourceLibrary {
    let library = Connection::open_in_memory().unwrap();
    library.execute_batch(LIBRARY_SCHEMA).unwrap();
    library.execute_batch(library_rows).unwrap();
    let faces = Connection::open_in_memory().unwrap();
    faces.execute_batch(FACES_SCHEMA).unwrap();
    faces.execute_batch(face_rows).unwrap();
    SourceLibrary::from_connections(library, faces)
}

pub(crate) fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}
