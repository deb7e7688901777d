//! Keyword assignment and the two statistics Lightroom derives from it:
//! per-keyword popularity and pairwise co-occurrence.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::session::TransferSession;
use crate::db::catalog::{self, POPULARITY_INCREMENT};
use crate::error::Result;

/// Each use weighs 10% more than the one before.
const POPULARITY_GROWTH: f64 = 1.1;

/// Record one more use of a keyword.
pub fn increment_popularity(session: &mut TransferSession<'_>, keyword_id: i64) -> Result<()> {
    let conn = session.conn();

    let step = match catalog::variable_f64(conn, POPULARITY_INCREMENT)? {
        Some(step) => step,
        None => {
            let id = session.next_id()?;
            catalog::insert_variable(conn, id, POPULARITY_INCREMENT, 1.0f64)?;
            1.0
        }
    };
    catalog::set_variable(conn, POPULARITY_INCREMENT, step * POPULARITY_GROWTH)?;

    let existing: Option<(i64, i64, f64)> = conn
        .query_row(
            r#"
            SELECT id_local, CAST(occurrences AS INTEGER), CAST(popularity AS REAL)
            FROM AgLibraryKeywordPopularity
            WHERE tag = ?
            "#,
            [keyword_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let (id, occurrences, popularity) = match existing {
        Some(row) => row,
        None => (session.next_id()?, 0, 0.0),
    };

    conn.execute(
        "INSERT OR REPLACE INTO AgLibraryKeywordPopularity (id_local, occurrences, popularity, tag) VALUES (?, ?, ?, ?)",
        params![id, occurrences + 1, popularity + step, keyword_id],
    )?;
    Ok(())
}

/// Link a keyword to an image. Returns false if the link already existed,
/// in which case popularity is left alone.
pub fn assign_keyword(session: &mut TransferSession<'_>, image_id: i64, keyword_id: i64) -> Result<bool> {
    let linked: i64 = session.conn().query_row(
        "SELECT COUNT(*) FROM AgLibraryKeywordImage WHERE image = ? AND tag = ?",
        params![image_id, keyword_id],
        |row| row.get(0),
    )?;
    if linked > 0 {
        return Ok(false);
    }

    let id = session.next_id()?;
    session.conn().execute(
        "INSERT INTO AgLibraryKeywordImage (id_local, image, tag) VALUES (?, ?, ?)",
        params![id, image_id, keyword_id],
    )?;
    increment_popularity(session, keyword_id)?;
    session.stats.keyword_links += 1;
    Ok(true)
}

/// Replace the co-occurrence table with counts derived from the current
/// keyword assignments. Every unordered pair of distinct keywords on an
/// image adds one to both directed rows. Returns the number of rows.
pub fn rebuild_cooccurrences(session: &mut TransferSession<'_>) -> Result<u64> {
    let conn = session.conn();
    conn.execute("DELETE FROM AgLibraryKeywordCooccurrence", [])?;

    let mut tags_by_image: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare("SELECT DISTINCT image, tag FROM AgLibraryKeywordImage ORDER BY image, tag")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (image, tag) = row?;
            tags_by_image.entry(image).or_default().push(tag);
        }
    }

    let mut counts: BTreeMap<(i64, i64), i64> = BTreeMap::new();
    for tags in tags_by_image.values().filter(|tags| tags.len() > 1) {
        for (i, first) in tags.iter().enumerate() {
            for second in &tags[i + 1..] {
                *counts.entry((*first, *second)).or_default() += 1;
                *counts.entry((*second, *first)).or_default() += 1;
            }
        }
    }

    for ((tag1, tag2), value) in &counts {
        let id = session.next_id()?;
        conn.execute(
            "INSERT INTO AgLibraryKeywordCooccurrence (id_local, tag1, tag2, value) VALUES (?, ?, ?, ?)",
            params![id, tag1, tag2, value],
        )?;
    }

    let rows = counts.len() as u64;
    session.stats.cooccurrences = rows;
    debug!("Rebuilt {} keyword co-occurrences", rows);
    Ok(rows)
}
