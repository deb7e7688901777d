//! Matching catalog images to Aperture masters.

use tracing::{error, warn};

use crate::db::catalog::MediaRecord;
use crate::db::source::SourceLibrary;
use crate::error::Result;

/// Finds the Aperture master a catalog image was imported from.
///
/// `Ok(None)` means no usable match; the image is skipped. Errors are
/// reserved for store failures.
pub trait IdentityResolver {
    fn resolve_master(&self, source: &SourceLibrary, image: &MediaRecord) -> Result<Option<String>>;
}

/// Matches on file name and modification date. Without an exact match, a
/// master with the same date is accepted if it is the only one.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampFallbackResolver;

impl IdentityResolver for TimestampFallbackResolver {
    fn resolve_master(&self, source: &SourceLibrary, image: &MediaRecord) -> Result<Option<String>> {
        let masters = source.masters_by_name_and_date(&image.file_name, image.modified)?;
        if let Some(first) = masters.first() {
            if masters.len() > 1 {
                warn!(
                    "{} masters match {}, using {}",
                    masters.len(),
                    image.file_name,
                    first.uuid
                );
            }
            if first.is_missing {
                warn!("Master {} of {} is marked missing in the library", first.uuid, image.file_name);
            }
            return Ok(Some(first.uuid.clone()));
        }

        let mut by_date = source.masters_by_date(image.modified)?;
        match by_date.len() {
            0 => {
                error!("No master found for {}", image.file_name);
                Ok(None)
            }
            1 => {
                warn!("Matched {} by modification date only", image.file_name);
                Ok(by_date.pop())
            }
            n => {
                error!(
                    "No master named {} and {} masters share its modification date",
                    image.file_name, n
                );
                Ok(None)
            }
        }
    }
}

/// Highest Aperture version number a catalog copy may map to. Copy names
/// count from 1 (`VERSION-3` is version 2); anything else means the newest.
pub fn version_limit(copy_name: &str) -> i64 {
    copy_name
        .strip_prefix("VERSION-")
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .map(|n| (n - 1).max(0))
        .unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::test_support::source;

    fn image(file_name: &str, modified: i64) -> MediaRecord {
        MediaRecord {
            id: 1,
            file_name: file_name.to_string(),
            modified,
            orientation_code: "AB".to_string(),
            copy_name: String::new(),
        }
    }

    #[test]
    fn test_version_limit() {
        assert_eq!(version_limit("VERSION-3"), 2);
        assert_eq!(version_limit("VERSION-1"), 0);
        assert_eq!(version_limit("VERSION-0"), 0);
        assert_eq!(version_limit(""), i64::MAX);
        assert_eq!(version_limit("VERSION-x"), i64::MAX);
        assert_eq!(version_limit("Copy 2"), i64::MAX);
    }

    #[test]
    fn test_exact_name_wins_among_same_date() {
        let library = source(
            r#"
            INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate) VALUES ('a', 'a.jpg', '/a.jpg', 500);
            INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate) VALUES ('b', 'b.jpg', '/b.jpg', 500);
            INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate) VALUES ('c', 'c.jpg', '/c.jpg', 500);
            "#,
            "",
        );
        let resolver = TimestampFallbackResolver;
        assert_eq!(resolver.resolve_master(&library, &image("b.jpg", 500)).unwrap().as_deref(), Some("b"));
        // Renamed, and the date is shared: ambiguous.
        assert_eq!(resolver.resolve_master(&library, &image("d.jpg", 500)).unwrap(), None);
    }

    #[test]
    fn test_date_only_fallback() {
        let library = source(
            "INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate) VALUES ('a', 'a.jpg', '/a.jpg', 500);",
            "",
        );
        let resolver = TimestampFallbackResolver;
        assert_eq!(resolver.resolve_master(&library, &image("renamed.jpg", 500)).unwrap().as_deref(), Some("a"));
        assert_eq!(resolver.resolve_master(&library, &image("a.jpg", 501)).unwrap(), None);
    }

    #[test]
    fn test_present_master_preferred() {
        let library = source(
            r#"
            INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate, isMissing) VALUES ('old', 'a.jpg', '/x/a.jpg', 500, 1);
            INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate, isMissing) VALUES ('new', 'a.jpg', '/y/a.jpg', 500, 0);
            "#,
            "",
        );
        let resolved = TimestampFallbackResolver.resolve_master(&library, &image("a.jpg", 500)).unwrap();
        assert_eq!(resolved.as_deref(), Some("new"));
    }

    #[test]
    fn test_missing_master_still_resolves() {
        let library = source(
            "INSERT INTO RKMaster (uuid, fileName, imagePath, fileModificationDate, isMissing) VALUES ('gone', 'a.jpg', '/x/a.jpg', 500, 1);",
            "",
        );
        let resolved = TimestampFallbackResolver.resolve_master(&library, &image("a.jpg", 500)).unwrap();
        assert_eq!(resolved.as_deref(), Some("gone"));
    }
}
