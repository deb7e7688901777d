//! Drives one transfer run over every catalog image inside a single
//! transaction.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use super::faces;
use super::geo;
use super::keywords;
use super::popularity;
use super::resolver::{version_limit, IdentityResolver};
use super::session::{TransferSession, TransferStats};
use super::stacks;
use crate::config::Config;
use crate::db::catalog::{self, MediaRecord};
use crate::db::source::SourceLibrary;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub face_root: String,
    pub tag_root: String,
    pub normalize_names: bool,
    pub faces: bool,
    pub keywords: bool,
    pub stacks: bool,
    pub gps: bool,
    /// Roll back instead of committing.
    pub dry_run: bool,
}

impl TransferOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            face_root: config.keywords.face_root.clone(),
            tag_root: config.keywords.tag_root.clone(),
            normalize_names: config.keywords.normalize_names,
            faces: config.transfer.faces,
            keywords: config.transfer.keywords,
            stacks: config.transfer.stacks,
            gps: config.transfer.gps,
            dry_run: false,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What happened to one catalog image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub image_id: i64,
    pub file_name: String,
    pub copy_name: String,
    pub master_uuid: Option<String>,
    pub faces: u64,
    /// The source faces store could not be read for this image.
    pub faces_unreadable: bool,
    pub keywords: usize,
    pub stack: Option<String>,
    pub gps: bool,
}

impl ImageOutcome {
    fn new(image: &MediaRecord) -> Self {
        Self {
            image_id: image.id,
            file_name: image.file_name.clone(),
            copy_name: image.copy_name.clone(),
            master_uuid: None,
            faces: 0,
            faces_unreadable: false,
            keywords: 0,
            stack: None,
            gps: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub stats: TransferStats,
    pub images: Vec<ImageOutcome>,
    pub ids_allocated: u64,
    /// False for dry runs.
    pub committed: bool,
}

/// Transfer everything from `source` into `catalog`.
///
/// On error the transaction is rolled back and the catalog is left as it
/// was found.
pub fn run(
    catalog: &mut Connection,
    source: &SourceLibrary,
    resolver: &dyn IdentityResolver,
    options: &TransferOptions,
) -> Result<TransferSummary> {
    let tx = catalog.transaction()?;

    match transfer_all(&tx, source, resolver, options) {
        Ok(mut summary) => {
            if options.dry_run {
                tx.rollback()?;
                info!("Dry run, all changes rolled back");
            } else {
                tx.commit()?;
                summary.committed = true;
            }
            Ok(summary)
        }
        Err(e) => {
            error!("Transfer failed, rolling back: {}", e);
            if let Err(rollback) = tx.rollback() {
                error!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

fn transfer_all(
    conn: &Connection,
    source: &SourceLibrary,
    resolver: &dyn IdentityResolver,
    options: &TransferOptions,
) -> Result<TransferSummary> {
    let mut session = TransferSession::new(conn);

    keywords::remove_all_keywords(conn)?;
    keywords::ensure_roots(&mut session, &options.face_root, &options.tag_root)?;
    if options.stacks {
        stacks::remove_all_stacks(conn)?;
    }

    let images = catalog::list_images(conn)?;
    info!("Found {} images in catalog", images.len());

    let mut keywords_by_image: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    let mut stack_groups: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(images.len());

    for image in &images {
        session.stats.images += 1;
        let outcome = transfer_image(
            &mut session,
            source,
            resolver,
            options,
            image,
            &mut keywords_by_image,
            &mut stack_groups,
        )?;
        outcomes.push(outcome);
    }

    if options.stacks {
        stacks::create_stacks(&mut session, &stack_groups)?;
    }
    if options.keywords {
        keywords::recreate_tag_keywords(&mut session, &keywords_by_image)?;
    }
    if options.normalize_names {
        let changed = keywords::normalize_keyword_names(conn)?;
        debug!("Normalized {} keyword names", changed);
    }
    popularity::rebuild_cooccurrences(&mut session)?;

    let ids_allocated = session.ids_issued();
    debug!("Allocated {} ids", ids_allocated);

    Ok(TransferSummary {
        stats: session.stats,
        images: outcomes,
        ids_allocated,
        committed: false,
    })
}

/// Resolve one image once and transfer each enabled feature from the
/// matched version. Only the face purge can fail the run from here.
fn transfer_image(
    session: &mut TransferSession<'_>,
    source: &SourceLibrary,
    resolver: &dyn IdentityResolver,
    options: &TransferOptions,
    image: &MediaRecord,
    keywords_by_image: &mut BTreeMap<i64, Vec<String>>,
    stack_groups: &mut BTreeMap<String, Vec<i64>>,
) -> Result<ImageOutcome> {
    let mut outcome = ImageOutcome::new(image);

    let master = match resolver.resolve_master(source, image) {
        Ok(master) => master,
        Err(e) => {
            error!("Failed to look up {}: {}", image.file_name, e);
            None
        }
    };
    let Some(master) = master else {
        session.stats.unmatched_images += 1;
        return Ok(outcome);
    };
    outcome.master_uuid = Some(master.clone());

    if options.faces {
        match source.faces_for_master(&master) {
            Ok(detected) if detected.is_empty() => session.stats.images_without_faces += 1,
            Ok(detected) => {
                outcome.faces = faces::transfer_faces(session, image, &detected)?;
                info!("{}: {} faces", image.file_name, outcome.faces);
            }
            Err(e) => {
                error!("Failed to read faces of {}: {}", image.file_name, e);
                session.stats.face_read_errors += 1;
                outcome.faces_unreadable = true;
            }
        }
    }

    let version = match source.find_version(&master, version_limit(&image.copy_name)) {
        Ok(Some(version)) => version,
        Ok(None) => {
            warn!("No version of {} matches copy {:?}", image.file_name, image.copy_name);
            return Ok(outcome);
        }
        Err(e) => {
            error!("Failed to read version of {}: {}", image.file_name, e);
            return Ok(outcome);
        }
    };

    debug!(
        "{} ({:?}) maps to version {} of {}",
        image.file_name, image.copy_name, version.version_number, master
    );

    if options.keywords {
        match source.keywords_for_version(version.model_id) {
            Ok(names) if !names.is_empty() => {
                outcome.keywords = names.len();
                keywords_by_image.insert(image.id, names);
            }
            Ok(_) => {}
            Err(e) => error!("Failed to read keywords of {}: {}", image.file_name, e),
        }
    }

    if options.stacks {
        if let Some(stack) = &version.stack_uuid {
            stack_groups.entry(stack.clone()).or_default().push(image.id);
            outcome.stack = Some(stack.clone());
        }
    }

    if options.gps {
        if let Some((latitude, longitude)) = version.location() {
            match geo::transfer_gps(session, image, latitude, longitude) {
                Ok(()) => outcome.gps = true,
                Err(e) => warn!("Failed to transfer position of {}: {}", image.file_name, e),
            }
        }
    }

    Ok(outcome)
}
