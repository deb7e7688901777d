use std::collections::{BTreeMap, HashMap};

use rusqlite::Connection;

use super::ids::IdAllocator;
use super::keywords::KeywordRoots;
use crate::error::{Result, TransferError};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferStats {
    pub images: u64,
    pub unmatched_images: u64,
    pub images_without_faces: u64,
    /// Matched images whose faces could not be read from the source.
    pub face_read_errors: u64,
    pub faces_inserted: u64,
    pub faces_failed: u64,
    /// Unnamed faces seen in the source, inserted or not.
    pub unknown_faces: u64,
    /// Inserted faces per person name.
    pub people: BTreeMap<String, u64>,
    pub keywords_created: u64,
    pub keyword_links: u64,
    pub stacks_created: u64,
    pub gps_updated: u64,
    pub cooccurrences: u64,
}

/// State shared by every step of one transfer: the destination connection,
/// the id counter, the keyword roots once created and the keyword cache.
pub struct TransferSession<'c> {
    conn: &'c Connection,
    ids: IdAllocator,
    roots: Option<KeywordRoots>,
    /// Normalized tag keyword name to id, so each name is created once.
    pub(crate) tag_keywords: HashMap<String, i64>,
    pub stats: TransferStats,
}

impl<'c> TransferSession<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            ids: IdAllocator::new(),
            roots: None,
            tag_keywords: HashMap::new(),
            stats: TransferStats::default(),
        }
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn next_id(&mut self) -> Result<i64> {
        self.ids.next_id(self.conn)
    }

    pub fn ids_issued(&self) -> u64 {
        self.ids.issued()
    }

    pub fn roots(&self) -> Result<&KeywordRoots> {
        self.roots.as_ref().ok_or(TransferError::KeywordRootsNotInitialized)
    }

    pub(crate) fn set_roots(&mut self, roots: KeywordRoots) {
        self.roots = Some(roots);
    }
}
