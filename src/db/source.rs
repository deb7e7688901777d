//! Read-only access to an Aperture library: `Library.apdb` for masters,
//! versions and keywords, `Faces.db` for detected faces.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use unicode_normalization::UnicodeNormalization;

use crate::config::LibraryConfig;
use crate::error::{Result, TransferError};
use crate::geometry::{FaceRegion, Point};

/// A master matched by file name and modification date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterCandidate {
    pub uuid: String,
    pub is_missing: bool,
}

/// The version row selected for a destination image.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVersion {
    pub model_id: i64,
    pub version_number: i64,
    pub stack_uuid: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SourceVersion {
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A detected, non-rejected face and the name attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub region: FaceRegion,
    /// NFC-normalized; `None` for faces nobody named.
    pub name: Option<String>,
}

pub struct SourceLibrary {
    library: Connection,
    faces: Connection,
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(TransferError::SourceNotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

impl SourceLibrary {
    /// Open both stores below an `.aplibrary` bundle.
    pub fn open(bundle: &Path, config: &LibraryConfig) -> Result<Self> {
        let library = open_read_only(&bundle.join(&config.database))?;
        let faces = open_read_only(&bundle.join(&config.faces_database))?;
        Ok(Self { library, faces })
    }

    pub fn from_connections(library: Connection, faces: Connection) -> Self {
        Self { library, faces }
    }

    /// Masters with this exact file name and date, one per image path,
    /// present masters first.
    pub fn masters_by_name_and_date(&self, file_name: &str, modified: i64) -> Result<Vec<MasterCandidate>> {
        let mut stmt = self.library.prepare(
            r#"
            SELECT uuid, isMissing
            FROM RKMaster
            WHERE fileName = ?
            AND fileModificationDate = ?
            GROUP BY imagePath
            ORDER BY isMissing
            "#,
        )?;
        let masters = stmt
            .query_map(params![file_name, modified], |row| {
                Ok(MasterCandidate {
                    uuid: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    is_missing: row.get::<_, Option<i64>>(1)?.unwrap_or(0) != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(masters)
    }

    /// Masters with this modification date, whatever their file name.
    pub fn masters_by_date(&self, modified: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .library
            .prepare("SELECT uuid FROM RKMaster WHERE fileModificationDate = ?")?;
        let uuids = stmt
            .query_map([modified], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(uuids.into_iter().flatten().collect())
    }

    /// The newest version of a master whose number does not exceed
    /// `max_version_number`.
    pub fn find_version(&self, master_uuid: &str, max_version_number: i64) -> Result<Option<SourceVersion>> {
        let version = self
            .library
            .query_row(
                r#"
                SELECT modelId, versionNumber, stackUuid, exifLatitude, exifLongitude
                FROM RKVersion
                WHERE masterUuid = ?
                AND versionNumber <= ?
                ORDER BY versionNumber DESC
                LIMIT 1
                "#,
                params![master_uuid, max_version_number],
                |row| {
                    Ok(SourceVersion {
                        model_id: row.get(0)?,
                        version_number: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        stack_uuid: row
                            .get::<_, Option<String>>(2)?
                            .filter(|s| !s.is_empty()),
                        latitude: row.get(3)?,
                        longitude: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(version)
    }

    pub fn faces_for_master(&self, master_uuid: &str) -> Result<Vec<DetectedFace>> {
        let mut stmt = self.faces.prepare(
            r#"
            SELECT d.bottomLeftX, d.bottomLeftY, d.bottomRightX, d.bottomRightY,
                   d.topLeftX, d.topLeftY, d.topRightX, d.topRightY,
                   (SELECT n.name FROM RKFaceName n WHERE n.faceKey = d.faceKey LIMIT 1)
            FROM RKDetectedFace d
            WHERE d.masterUuid = ?
            AND d.rejected = 0
            ORDER BY d.modelId
            "#,
        )?;
        let faces = stmt
            .query_map([master_uuid], |row| {
                let point = |x: usize, y: usize| -> rusqlite::Result<Point> {
                    Ok(Point::new(
                        row.get::<_, Option<f64>>(x)?.unwrap_or(0.0),
                        row.get::<_, Option<f64>>(y)?.unwrap_or(0.0),
                    ))
                };
                Ok(DetectedFace {
                    region: FaceRegion {
                        bottom_left: point(0, 1)?,
                        bottom_right: point(2, 3)?,
                        top_left: point(4, 5)?,
                        top_right: point(6, 7)?,
                    },
                    name: row
                        .get::<_, Option<String>>(8)?
                        .map(|name| name.nfc().collect::<String>())
                        .filter(|name| !name.is_empty()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(faces)
    }

    /// Keyword names as stored, not yet normalized.
    pub fn keywords_for_version(&self, version_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.library.prepare(
            r#"
            SELECT K.name
            FROM RKKeyword K, RKKeywordForVersion V
            WHERE K.modelId = V.keywordId
            AND V.versionId = ?
            ORDER BY V.modelId
            "#,
        )?;
        let names = stmt
            .query_map([version_id], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.into_iter().flatten().collect())
    }
}
