//! The keyword tree of the catalog.
//!
//! Lightroom stores the position of every keyword in a `genealogy` column:
//! the parent's genealogy followed by `/<number of digits><id>`. A keyword
//! with id 42 below a root with genealogy `/41234` gets `/41234/242`.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error, info};
use unicode_normalization::UnicodeNormalization;

use super::popularity;
use super::session::TransferSession;
use crate::db::catalog::{self, NEW_KEYWORD_PARENT, NEW_PERSON_KEYWORD_PARENT, ROOT_KEYWORD_ID};
use crate::error::{Result, TransferError};

/// Seconds between the Unix epoch and 2001-01-01, Lightroom's epoch.
const COCOA_EPOCH_OFFSET: i64 = 978_307_200;

/// Tables cleared before the keyword tree is rebuilt.
const KEYWORD_TABLES: [&str; 6] = [
    "AgLibraryKeyword",
    "AgLibraryKeywordCooccurrence",
    "AgLibraryKeywordFace",
    "AgLibraryKeywordImage",
    "AgLibraryKeywordPopularity",
    "AgLibraryKeywordSynonym",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordType {
    Untyped,
    Person,
}

impl KeywordType {
    fn as_sql(self) -> Option<&'static str> {
        match self {
            KeywordType::Untyped => None,
            KeywordType::Person => Some("person"),
        }
    }
}

/// A keyword's id together with its genealogy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordNode {
    pub id: i64,
    pub genealogy: String,
}

/// The nodes created by [`ensure_roots`]. `person` and `tags` fall back to
/// `global` when their configured name is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRoots {
    pub global: KeywordNode,
    pub person: KeywordNode,
    pub tags: KeywordNode,
}

pub fn child_genealogy(parent: &str, id: i64) -> String {
    let digits = id.to_string();
    format!("{}/{}{}", parent, digits.len(), digits)
}

/// Aperture stores keywords in decomposed form. Everything written to the
/// catalog is composed (NFC) so that SQLite's byte comparison finds it.
pub fn normalize(name: &str) -> String {
    name.nfc().collect()
}

fn cocoa_now() -> f64 {
    (Utc::now().timestamp_millis() - COCOA_EPOCH_OFFSET * 1000) as f64 / 1000.0
}

pub fn remove_all_keywords(conn: &Connection) -> Result<()> {
    for table in KEYWORD_TABLES {
        conn.execute(&format!("DELETE FROM {}", table), [])?;
    }
    Ok(())
}

/// Insert a keyword below `parent`. The genealogy needs the new id, so it is
/// written in a second statement.
pub fn create_keyword(
    session: &mut TransferSession<'_>,
    name: &str,
    parent: &KeywordNode,
    kind: KeywordType,
) -> Result<KeywordNode> {
    let id = session.next_id()?;
    let conn = session.conn();
    let now = cocoa_now();

    conn.execute(
        r#"
        INSERT INTO AgLibraryKeyword
            (id_local, id_global, dateCreated, imageCountCache, keywordType, lastApplied, lc_name, name, parent)
        VALUES (?, ?, ?, NULL, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            catalog::new_global_id(),
            now,
            kind.as_sql(),
            now,
            name.to_lowercase(),
            name,
            parent.id
        ],
    )?;

    let genealogy = child_genealogy(&parent.genealogy, id);
    conn.execute(
        "UPDATE AgLibraryKeyword SET genealogy = ? WHERE id_local = ?",
        params![genealogy, id],
    )?;

    Ok(KeywordNode { id, genealogy })
}

/// Recreate the catalog's keyword root and the two folders every transferred
/// keyword goes into. Must run after [`remove_all_keywords`].
pub fn ensure_roots(session: &mut TransferSession<'_>, person_root: &str, tag_root: &str) -> Result<()> {
    let conn = session.conn();
    let root_id = catalog::variable_i64(conn, ROOT_KEYWORD_ID)?
        .filter(|id| *id >= 0)
        .ok_or(TransferError::MissingVariable(ROOT_KEYWORD_ID))?;

    conn.execute(
        r#"
        INSERT INTO AgLibraryKeyword
            (id_local, id_global, dateCreated, imageCountCache, keywordType, lastApplied, lc_name, name, parent)
        VALUES (?, ?, ?, NULL, NULL, NULL, NULL, NULL, NULL)
        "#,
        params![root_id, catalog::new_global_id(), cocoa_now()],
    )?;
    let global = KeywordNode {
        id: root_id,
        genealogy: child_genealogy("", root_id),
    };
    conn.execute(
        "UPDATE AgLibraryKeyword SET genealogy = ? WHERE id_local = ?",
        params![global.genealogy, root_id],
    )?;

    let person = if person_root.is_empty() {
        global.clone()
    } else {
        let node = create_keyword(session, person_root, &global, KeywordType::Untyped)?;
        register_default_parent(session, NEW_PERSON_KEYWORD_PARENT, node.id)?;
        info!("Created person keyword root {:?} ({})", person_root, node.genealogy);
        node
    };

    let tags = if tag_root.is_empty() {
        global.clone()
    } else {
        let node = create_keyword(session, tag_root, &global, KeywordType::Untyped)?;
        register_default_parent(session, NEW_KEYWORD_PARENT, node.id)?;
        info!("Created tag keyword root {:?} ({})", tag_root, node.genealogy);
        node
    };

    session.set_roots(KeywordRoots { global, person, tags });
    Ok(())
}

/// Point one of Lightroom's "new keywords go here" settings at `keyword_id`.
fn register_default_parent(session: &mut TransferSession<'_>, variable: &str, keyword_id: i64) -> Result<()> {
    if !catalog::set_variable(session.conn(), variable, keyword_id)? {
        let id_local = session.next_id()?;
        catalog::insert_variable(session.conn(), id_local, variable, keyword_id)?;
    }
    Ok(())
}

/// A person keyword below the person root with exactly this name.
pub fn find_person_keyword(session: &TransferSession<'_>, name: &str) -> Result<Option<i64>> {
    let prefix = format!("{}%", session.roots()?.person.genealogy);
    let id = session
        .conn()
        .query_row(
            r#"
            SELECT id_local
            FROM AgLibraryKeyword
            WHERE genealogy LIKE ?
            AND name IS ?
            AND keywordType = 'person'
            ORDER BY id_local
            LIMIT 1
            "#,
            params![prefix, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Find or create the person keyword for a face name.
pub fn person_keyword(session: &mut TransferSession<'_>, name: &str) -> Result<i64> {
    if let Some(id) = find_person_keyword(session, name)? {
        return Ok(id);
    }
    let parent = session.roots()?.person.clone();
    let node = create_keyword(session, name, &parent, KeywordType::Person)?;
    session.stats.keywords_created += 1;
    debug!("Created person keyword {:?} ({})", name, node.genealogy);
    Ok(node.id)
}

/// Find or create a free keyword below the tag root. `name` must already be
/// normalized.
pub fn tag_keyword(session: &mut TransferSession<'_>, name: &str) -> Result<i64> {
    if let Some(id) = session.tag_keywords.get(name) {
        return Ok(*id);
    }
    let parent = session.roots()?.tags.clone();
    let node = create_keyword(session, name, &parent, KeywordType::Untyped)?;
    session.tag_keywords.insert(name.to_string(), node.id);
    session.stats.keywords_created += 1;
    info!("Created keyword `{}'", name);
    Ok(node.id)
}

/// Assign the collected Aperture keywords to their images.
///
/// A keyword that cannot be created aborts the run; a failed assignment is
/// logged and skipped.
pub fn recreate_tag_keywords(
    session: &mut TransferSession<'_>,
    keywords_by_image: &BTreeMap<i64, Vec<String>>,
) -> Result<()> {
    for (image_id, names) in keywords_by_image {
        for raw in names {
            let name = normalize(raw);
            if name.is_empty() {
                continue;
            }
            let keyword_id = tag_keyword(session, &name)?;
            if let Err(e) = popularity::assign_keyword(session, *image_id, keyword_id) {
                error!("Failed to connect image {} with keyword {:?}: {}", image_id, name, e);
            }
        }
    }
    Ok(())
}

/// Rewrite every keyword name in composed form. Empty names become NULL.
/// Returns the number of rows changed.
pub fn normalize_keyword_names(conn: &Connection) -> Result<usize> {
    let rows = {
        let mut stmt = conn.prepare("SELECT id_local, lc_name, name FROM AgLibraryKeyword")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    let composed = |value: &Option<String>| -> Option<String> {
        value.as_deref().filter(|s| !s.is_empty()).map(normalize)
    };

    let mut update = conn.prepare("UPDATE AgLibraryKeyword SET lc_name = ?, name = ? WHERE id_local = ?")?;
    let mut changed = 0;
    for (id, lc_name, name) in rows {
        let new_lc_name = composed(&lc_name);
        let new_name = composed(&name);
        if new_lc_name == lc_name && new_name == name {
            continue;
        }
        if let Some(name) = &new_name {
            debug!("Normalizing keyword {:?}", name);
        }
        update.execute(params![new_lc_name, new_name, id])?;
        changed += 1;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::test_support::{catalog, ROOT_KEYWORD};

    fn keyword(conn: &Connection, id: i64) -> (Option<String>, Option<String>, Option<String>, Option<i64>, String) {
        conn.query_row(
            "SELECT lc_name, name, keywordType, parent, genealogy FROM AgLibraryKeyword WHERE id_local = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_child_genealogy_prefixes_digit_count() {
        assert_eq!(child_genealogy("/1R", 42), "/1R/242");
        assert_eq!(child_genealogy("", 7), "/17");
        assert_eq!(child_genealogy("/17", 123456), "/17/6123456");
    }

    #[test]
    fn test_create_keyword_writes_genealogy() {
        let conn = catalog();
        conn.execute("UPDATE Adobe_variablesTable SET value = 42 WHERE name = 'Adobe_entityIDCounter'", [])
            .unwrap();
        let mut session = TransferSession::new(&conn);
        let parent = KeywordNode {
            id: 1,
            genealogy: "/1R".to_string(),
        };

        let node = create_keyword(&mut session, "Beach", &parent, KeywordType::Untyped).unwrap();
        assert_eq!(node, KeywordNode { id: 42, genealogy: "/1R/242".to_string() });

        let (lc_name, name, kind, parent_id, genealogy) = keyword(&conn, 42);
        assert_eq!(lc_name.as_deref(), Some("beach"));
        assert_eq!(name.as_deref(), Some("Beach"));
        assert_eq!(kind, None);
        assert_eq!(parent_id, Some(1));
        assert_eq!(genealogy, "/1R/242");
    }

    #[test]
    fn test_ensure_roots_builds_tree_and_registers_parents() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        let roots = session.roots().unwrap().clone();
        assert_eq!(roots.global, KeywordNode { id: ROOT_KEYWORD, genealogy: "/17".to_string() });
        assert_eq!(roots.person.genealogy, format!("/17/4{}", roots.person.id));
        assert_eq!(roots.tags.genealogy, format!("/17/4{}", roots.tags.id));

        let (_, name, kind, parent, _) = keyword(&conn, ROOT_KEYWORD);
        assert_eq!((name, kind, parent), (None, None, None));
        let (_, name, _, parent, _) = keyword(&conn, roots.person.id);
        assert_eq!(name.as_deref(), Some("Faces"));
        assert_eq!(parent, Some(ROOT_KEYWORD));

        assert_eq!(
            catalog::variable_i64(&conn, NEW_PERSON_KEYWORD_PARENT).unwrap(),
            Some(roots.person.id)
        );
        assert_eq!(
            catalog::variable_i64(&conn, NEW_KEYWORD_PARENT).unwrap(),
            Some(roots.tags.id)
        );
    }

    #[test]
    fn test_ensure_roots_updates_existing_setting() {
        let conn = catalog();
        catalog::insert_variable(&conn, 5, NEW_PERSON_KEYWORD_PARENT, 3i64).unwrap();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "").unwrap();

        let roots = session.roots().unwrap().clone();
        assert_eq!(roots.tags, roots.global);
        assert_eq!(
            catalog::variable_i64(&conn, NEW_PERSON_KEYWORD_PARENT).unwrap(),
            Some(roots.person.id)
        );
        assert_eq!(catalog::variable_i64(&conn, NEW_KEYWORD_PARENT).unwrap(), None);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM Adobe_variablesTable WHERE name = ?",
                [NEW_PERSON_KEYWORD_PARENT],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_person_root_uses_global_root() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "", "Tags").unwrap();

        let roots = session.roots().unwrap().clone();
        assert_eq!(roots.person, roots.global);
        assert_ne!(roots.tags, roots.global);
        assert_eq!(catalog::variable_i64(&conn, NEW_PERSON_KEYWORD_PARENT).unwrap(), None);

        let alice = person_keyword(&mut session, "Alice").unwrap();
        let (_, name, kind, parent, genealogy) = keyword(&conn, alice);
        assert_eq!(name.as_deref(), Some("Alice"));
        assert_eq!(kind.as_deref(), Some("person"));
        assert_eq!(parent, Some(ROOT_KEYWORD));
        assert_eq!(genealogy, format!("/17/4{}", alice));
    }

    #[test]
    fn test_ensure_roots_without_root_variable() {
        let conn = catalog();
        conn.execute("DELETE FROM Adobe_variablesTable WHERE name = ?", [ROOT_KEYWORD_ID])
            .unwrap();
        let mut session = TransferSession::new(&conn);
        assert!(matches!(
            ensure_roots(&mut session, "Faces", "Tags"),
            Err(TransferError::MissingVariable(ROOT_KEYWORD_ID))
        ));
    }

    #[test]
    fn test_person_keyword_lookup_is_scoped_and_exact() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        let alice = person_keyword(&mut session, "Alice").unwrap();
        assert_eq!(person_keyword(&mut session, "Alice").unwrap(), alice);
        assert_eq!(find_person_keyword(&session, "alice").unwrap(), None);

        // A free keyword with the same name is not a person.
        let tag = tag_keyword(&mut session, "Bob").unwrap();
        assert_eq!(find_person_keyword(&session, "Bob").unwrap(), None);
        assert_ne!(person_keyword(&mut session, "Bob").unwrap(), tag);

        let (lc_name, _, kind, parent, _) = keyword(&conn, alice);
        assert_eq!(lc_name.as_deref(), Some("alice"));
        assert_eq!(kind.as_deref(), Some("person"));
        assert_eq!(parent, Some(session.roots().unwrap().person.id));
        assert_eq!(session.stats.keywords_created, 3);
    }

    #[test]
    fn test_tag_keywords_are_created_once() {
        let conn = catalog();
        let mut session = TransferSession::new(&conn);
        ensure_roots(&mut session, "Faces", "Tags").unwrap();

        let mut keywords_by_image = BTreeMap::new();
        keywords_by_image.insert(1, vec!["Mu\u{308}nchen".to_string(), "".to_string()]);
        keywords_by_image.insert(2, vec!["M\u{fc}nchen".to_string(), "Bier".to_string()]);
        recreate_tag_keywords(&mut session, &keywords_by_image).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM AgLibraryKeyword WHERE name = ?",
                ["M\u{fc}nchen"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        let links: i64 = conn
            .query_row("SELECT COUNT(*) FROM AgLibraryKeywordImage", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 3);
        assert_eq!(session.stats.keywords_created, 2);
    }

    #[test]
    fn test_normalize_keyword_names() {
        let conn = catalog();
        conn.execute_batch(
            r#"
            INSERT INTO AgLibraryKeyword (id_local, id_global, lc_name, name)
                VALUES (1, 'a', 'jo' || char(776) || 'rg', 'Jo' || char(776) || 'rg');
            INSERT INTO AgLibraryKeyword (id_local, id_global, lc_name, name) VALUES (2, 'b', 'plain', 'Plain');
            INSERT INTO AgLibraryKeyword (id_local, id_global, lc_name, name) VALUES (3, 'c', '', NULL);
            "#,
        )
        .unwrap();

        assert_eq!(normalize_keyword_names(&conn).unwrap(), 2);
        let (lc_name, name, _, _, _) = keyword(&conn, 1);
        assert_eq!(lc_name.as_deref(), Some("j\u{f6}rg"));
        assert_eq!(name.as_deref(), Some("J\u{f6}rg"));
        let (lc_name, name, _, _, _) = keyword(&conn, 3);
        assert_eq!((lc_name, name), (None, None));
    }

    #[test]
    fn test_remove_all_keywords() {
        let conn = catalog();
        conn.execute_batch(
            r#"
            INSERT INTO AgLibraryKeyword (id_local, id_global, name) VALUES (1, 'a', 'x');
            INSERT INTO AgLibraryKeywordImage (id_local, image, tag) VALUES (2, 5, 1);
            INSERT INTO AgLibraryKeywordPopularity (id_local, occurrences, popularity, tag) VALUES (3, 1, 1.0, 1);
            INSERT INTO AgLibraryKeywordSynonym (id_local, keyword, name) VALUES (4, 1, 'y');
            "#,
        )
        .unwrap();
        remove_all_keywords(&conn).unwrap();
        for table in KEYWORD_TABLES {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "{} not empty", table);
        }
    }
}
