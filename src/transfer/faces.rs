//! Replaces the faces Lightroom detected on an image with the ones named in
//! Aperture.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error};

use super::keywords;
use super::popularity;
use super::session::TransferSession;
use crate::db::catalog::MediaRecord;
use crate::db::source::DetectedFace;
use crate::error::Result;
use crate::geometry::FaceRegion;

/// Statements removing everything attached to an image's faces. The order
/// matters: the subqueries need the face rows, which go last.
const PURGE_STATEMENTS: [&str; 5] = [
    "DELETE FROM Adobe_libraryImageFaceProcessHistory WHERE image = ?",
    "DELETE FROM AgLibraryFaceCluster WHERE id_local IN (SELECT cluster FROM AgLibraryFace WHERE image = ?)",
    "DELETE FROM AgLibraryFaceData WHERE face IN (SELECT id_local FROM AgLibraryFace WHERE image = ?)",
    "DELETE FROM AgLibraryKeywordFace WHERE face IN (SELECT id_local FROM AgLibraryFace WHERE image = ?)",
    "DELETE FROM AgLibraryFace WHERE image = ?",
];

/// Remove all face information Lightroom stored for an image, including the
/// keyword assignments made through those faces.
pub fn purge_faces_for_image(conn: &Connection, image_id: i64) -> Result<()> {
    conn.execute(
        r#"
        DELETE FROM AgLibraryKeywordImage
        WHERE image = ?
        AND tag IN (
            SELECT tag FROM AgLibraryKeywordFace
            WHERE face IN (SELECT id_local FROM AgLibraryFace WHERE image = ?)
        )
        "#,
        params![image_id, image_id],
    )?;
    for statement in PURGE_STATEMENTS {
        conn.execute(statement, [image_id])?;
    }
    Ok(())
}

fn create_cluster(session: &mut TransferSession<'_>) -> Result<i64> {
    let id = session.next_id()?;
    session.conn().execute(
        "INSERT INTO AgLibraryFaceCluster (id_local, keyFace) VALUES (?, NULL)",
        [id],
    )?;
    Ok(id)
}

fn create_face(
    session: &mut TransferSession<'_>,
    region: &FaceRegion,
    cluster_id: i64,
    image: &MediaRecord,
) -> Result<i64> {
    let id = session.next_id()?;
    session.conn().execute(
        r#"
        INSERT INTO AgLibraryFace
            (id_local,
             bl_x, bl_y, br_x, br_y, tl_x, tl_y, tr_x, tr_y,
             cluster, compatibleVersion, ignored, image, imageOrientation,
             orientation, origination, propertiesCache, regionType,
             skipSuggestion, version)
        VALUES (?,
                ?, ?, ?, ?, ?, ?, ?, ?,
                ?, 3.0, NULL, ?, ?,
                0, 1.0, NULL, 1.0,
                NULL, 2.0)
        "#,
        params![
            id,
            region.bottom_left.x,
            region.bottom_left.y,
            region.bottom_right.x,
            region.bottom_right.y,
            region.top_left.x,
            region.top_left.y,
            region.top_right.x,
            region.top_right.y,
            cluster_id,
            image.id,
            image.orientation_code
        ],
    )?;
    Ok(id)
}

/// Lightroom keeps face biometry here. An empty row is what Lightroom
/// writes for a face the user drew by hand.
fn create_face_data(session: &mut TransferSession<'_>, face_id: i64) -> Result<()> {
    let id = session.next_id()?;
    session.conn().execute(
        "INSERT INTO AgLibraryFaceData (id_local, data, face) VALUES (?, NULL, ?)",
        params![id, face_id],
    )?;
    Ok(())
}

/// Attach a person to a face, marked as confirmed by the user.
fn link_face_keyword(session: &mut TransferSession<'_>, face_id: i64, keyword_id: i64) -> Result<()> {
    let id = session.next_id()?;
    session.conn().execute(
        r#"
        INSERT INTO AgLibraryKeywordFace (id_local, face, keyFace, rankOrder, tag, userPick, userReject)
        VALUES (?, ?, NULL, NULL, ?, 1, 0)
        "#,
        params![id, face_id, keyword_id],
    )?;
    Ok(())
}

/// Mark the image as processed and touched by the user so Lightroom does
/// not run its own detection over it again.
fn record_process_history(session: &mut TransferSession<'_>, image: &MediaRecord) -> Result<()> {
    let existing: Option<i64> = session
        .conn()
        .query_row(
            "SELECT id_local FROM Adobe_libraryImageFaceProcessHistory WHERE image = ?",
            [image.id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            session.conn().execute(
                r#"
                UPDATE Adobe_libraryImageFaceProcessHistory
                SET userTouched = 1.0, lastTryStatus = 1.0, lastImageOrientation = ?
                WHERE id_local = ?
                "#,
                params![image.orientation_code, id],
            )?;
        }
        None => {
            let id = session.next_id()?;
            session.conn().execute(
                r#"
                INSERT INTO Adobe_libraryImageFaceProcessHistory
                    (id_local, image, lastFaceDetector, lastFaceRecognizer, lastImageIndexer,
                     lastImageOrientation, lastTryStatus, userTouched)
                VALUES (?, ?, 2.0, 3.0, NULL, ?, 1.0, 1.0)
                "#,
                params![id, image.id, image.orientation_code],
            )?;
        }
    }
    Ok(())
}

/// Create every row Lightroom needs for one face.
pub fn create_face_entry(session: &mut TransferSession<'_>, face: &DetectedFace, image: &MediaRecord) -> Result<()> {
    let keyword_id = match &face.name {
        Some(name) => Some(keywords::person_keyword(session, name)?),
        None => None,
    };

    let cluster_id = create_cluster(session)?;
    let region = face.region.transformed(image.orientation());
    let face_id = create_face(session, &region, cluster_id, image)?;
    create_face_data(session, face_id)?;

    if let Some(keyword_id) = keyword_id {
        link_face_keyword(session, face_id, keyword_id)?;
        popularity::assign_keyword(session, image.id, keyword_id)?;
    }

    record_process_history(session, image)
}

/// Replace the faces of one image. Returns how many faces were inserted.
///
/// The purge must succeed; a face that fails afterwards is logged and the
/// remaining faces are still transferred.
pub fn transfer_faces(session: &mut TransferSession<'_>, image: &MediaRecord, faces: &[DetectedFace]) -> Result<u64> {
    purge_faces_for_image(session.conn(), image.id)?;

    let mut inserted = 0;
    for face in faces {
        if face.name.is_none() {
            session.stats.unknown_faces += 1;
        }

        match create_face_entry(session, face, image) {
            Ok(()) => {
                inserted += 1;
                session.stats.faces_inserted += 1;
                if let Some(name) = &face.name {
                    *session.stats.people.entry(name.clone()).or_default() += 1;
                }
                debug!(
                    "Added face {} to {}",
                    face.name.as_deref().unwrap_or("<unknown>"),
                    image.file_name
                );
            }
            Err(e) => {
                session.stats.faces_failed += 1;
                error!(
                    "Failed to add face {} to {}: {}",
                    face.name.as_deref().unwrap_or("<unknown>"),
                    image.file_name,
                    e
                );
            }
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::transfer::keywords::ensure_roots;
    use crate::transfer::test_support::{catalog, count};

    fn image(orientation: &str) -> MediaRecord {
        MediaRecord {
            id: 10,
            file_name: "IMG_0001.jpg".to_string(),
            modified: 100,
            orientation_code: orientation.to_string(),
            copy_name: String::new(),
        }
    }

    fn face(name: Option<&str>) -> DetectedFace {
        DetectedFace {
            region: FaceRegion {
                bottom_left: Point::new(0.25, 0.5),
                bottom_right: Point::new(0.5, 0.5),
                top_left: Point::new(0.25, 0.75),
                top_right: Point::new(0.5, 0.75),
            },
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_transfer_faces_creates_rows() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        let inserted = transfer_faces(&mut session, &image("AB"), &[face(Some("Alice")), face(None)]).unwrap();
        assert_eq!(inserted, 2);

        assert_eq!(count(&conn, "AgLibraryFace"), 2);
        assert_eq!(count(&conn, "AgLibraryFaceCluster"), 2);
        assert_eq!(count(&conn, "AgLibraryFaceData"), 2);
        assert_eq!(count(&conn, "AgLibraryKeywordFace"), 1);
        assert_eq!(count(&conn, "AgLibraryKeywordImage"), 1);
        assert_eq!(count(&conn, "Adobe_libraryImageFaceProcessHistory"), 1);

        let (bl_y, tl_y, orientation): (f64, f64, String) = conn
            .query_row(
                "SELECT bl_y, tl_y, imageOrientation FROM AgLibraryFace ORDER BY id_local LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((bl_y, tl_y), (0.5, 0.25));
        assert_eq!(orientation, "AB");

        assert_eq!(session.stats.faces_inserted, 2);
        assert_eq!(session.stats.unknown_faces, 1);
        assert_eq!(session.stats.people.get("Alice"), Some(&1));
    }

    #[test]
    fn test_transfer_replaces_previous_faces() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        transfer_faces(&mut session, &image("AB"), &[face(Some("Alice")), face(Some("Bob"))]).unwrap();
        transfer_faces(&mut session, &image("BC"), &[face(Some("Alice"))]).unwrap();

        assert_eq!(count(&conn, "AgLibraryFace"), 1);
        assert_eq!(count(&conn, "AgLibraryFaceCluster"), 1);
        assert_eq!(count(&conn, "AgLibraryFaceData"), 1);
        assert_eq!(count(&conn, "AgLibraryKeywordFace"), 1);
        // Bob's assignment went with his face.
        assert_eq!(count(&conn, "AgLibraryKeywordImage"), 1);
        assert_eq!(count(&conn, "Adobe_libraryImageFaceProcessHistory"), 1);

        let last_orientation: String = conn
            .query_row(
                "SELECT lastImageOrientation FROM Adobe_libraryImageFaceProcessHistory",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last_orientation, "BC");
    }

    #[test]
    fn test_process_history_is_reused() {
        let conn = catalog();
        conn.execute(
            "INSERT INTO Adobe_libraryImageFaceProcessHistory (id_local, image, lastTryStatus, userTouched) VALUES (3, 10, 0, 0)",
            [],
        )
        .unwrap();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        record_process_history(&mut session, &image("DA")).unwrap();
        let (id, touched, orientation): (i64, f64, String) = conn
            .query_row(
                "SELECT id_local, userTouched, lastImageOrientation FROM Adobe_libraryImageFaceProcessHistory",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((id, touched, orientation.as_str()), (3, 1.0, "DA"));
    }

    #[test]
    fn test_failed_face_does_not_stop_siblings() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        // No roots: every named face fails, unnamed ones still go in.
        let inserted = transfer_faces(&mut session, &image("AB"), &[face(Some("Alice")), face(None)]).unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(session.stats.faces_failed, 1);
        assert_eq!(session.stats.unknown_faces, 1);
        assert!(session.stats.people.is_empty());
        assert_eq!(count(&conn, "AgLibraryFace"), 1);
    }
}
