use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use super::session::TransferSession;
use super::xmp;
use crate::db::catalog::MediaRecord;
use crate::error::Result;

/// Store an Aperture position on an image: in the harvested EXIF columns
/// Lightroom filters by and in the cached XMP it writes back to files.
pub fn transfer_gps(session: &mut TransferSession<'_>, image: &MediaRecord, latitude: f64, longitude: f64) -> Result<()> {
    let conn = session.conn();
    conn.execute(
        r#"
        UPDATE AgHarvestedExifMetadata
        SET gpsLatitude = ?, gpsLongitude = ?, gpsSequence = 1, hasGPS = 1
        WHERE image = ?
        "#,
        params![latitude, longitude, image.id],
    )?;

    let packet: Option<String> = conn
        .query_row(
            "SELECT xmp FROM Adobe_AdditionalMetadata WHERE image = ?",
            [image.id],
            |row| row.get(0),
        )
        .optional()?;

    match packet {
        Some(packet) => {
            let patched = xmp::patch_gps(&packet, latitude, longitude)?;
            conn.execute(
                "UPDATE Adobe_AdditionalMetadata SET xmp = ? WHERE image = ?",
                params![patched, image.id],
            )?;
            debug!("Set position of {} to {}, {}", image.file_name, latitude, longitude);
        }
        None => warn!("No additional metadata for {}, XMP left unchanged", image.file_name),
    }

    session.stats.gps_updated += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::test_support::catalog;

    const PACKET: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description rdf:about=""/></rdf:RDF></x:xmpmeta>"#;

    fn image() -> MediaRecord {
        MediaRecord {
            id: 10,
            file_name: "IMG_0001.jpg".to_string(),
            modified: 100,
            orientation_code: "AB".to_string(),
            copy_name: String::new(),
        }
    }

    #[test]
    fn test_transfer_gps_updates_exif_and_xmp() {
        let conn = catalog();
        conn.execute(
            "INSERT INTO AgHarvestedExifMetadata (id_local, image, hasGPS) VALUES (1, 10, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO Adobe_AdditionalMetadata (id_local, id_global, image, xmp) VALUES (2, 'meta', 10, ?)",
            [PACKET],
        )
        .unwrap();

        let mut session = TransferSession::new(&conn);
        transfer_gps(&mut session, &image(), 48.1, -11.5).unwrap();

        let (lat, lon, sequence, has_gps): (f64, f64, i64, i64) = conn
            .query_row(
                "SELECT gpsLatitude, gpsLongitude, gpsSequence, hasGPS FROM AgHarvestedExifMetadata WHERE image = 10",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!((lat, lon, sequence, has_gps), (48.1, -11.5, 1, 1));

        let packet: String = conn
            .query_row("SELECT xmp FROM Adobe_AdditionalMetadata WHERE image = 10", [], |row| row.get(0))
            .unwrap();
        assert!(packet.contains(r#"exif:GPSLatitude="48,6.0000000000N""#));
        assert_eq!(session.stats.gps_updated, 1);
    }

    #[test]
    fn test_transfer_gps_without_metadata_row() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        transfer_gps(&mut session, &image(), 1.0, 2.0).unwrap();
        assert_eq!(session.stats.gps_updated, 1);
    }

    #[test]
    fn test_broken_packet_is_an_error() {
        let conn = catalog();
        conn.execute(
            "INSERT INTO Adobe_AdditionalMetadata (id_local, id_global, image, xmp) VALUES (2, 'meta', 10, '<x/>')",
            [],
        )
        .unwrap();
        let mut session = TransferSession::new(&conn);
        assert!(transfer_gps(&mut session, &image(), 1.0, 2.0).is_err());
        assert_eq!(session.stats.gps_updated, 0);
    }
}
