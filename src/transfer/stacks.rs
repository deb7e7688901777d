//! Rebuilds Lightroom stacks from Aperture's stack ids.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use tracing::info;

use super::session::TransferSession;
use crate::db::catalog;
use crate::error::Result;

pub fn remove_all_stacks(conn: &Connection) -> Result<()> {
    for table in ["AgLibraryFolderStack", "AgLibraryFolderStackData", "AgLibraryFolderStackImage"] {
        conn.execute(&format!("DELETE FROM {}", table), [])?;
    }
    Ok(())
}

/// Create one collapsed stack holding `images` in the given order.
pub fn create_stack(session: &mut TransferSession<'_>, images: &[i64]) -> Result<i64> {
    let stack_id = session.next_id()?;
    session.conn().execute(
        "INSERT INTO AgLibraryFolderStack (id_local, id_global, collapsed, text) VALUES (?, ?, 1, '')",
        params![stack_id, catalog::new_global_id()],
    )?;

    for (position, image_id) in images.iter().enumerate() {
        let id = session.next_id()?;
        session.conn().execute(
            "INSERT INTO AgLibraryFolderStackImage (id_local, collapsed, image, position, stack) VALUES (?, 1, ?, ?, ?)",
            params![id, image_id, position as i64 + 1, stack_id],
        )?;
    }

    session.stats.stacks_created += 1;
    info!("Created stack of {} images", images.len());
    Ok(stack_id)
}

/// Create a stack per Aperture stack id, in id order.
pub fn create_stacks(session: &mut TransferSession<'_>, groups: &BTreeMap<String, Vec<i64>>) -> Result<()> {
    for images in groups.values() {
        create_stack(session, images)?;
    }
    Ok(())
}
