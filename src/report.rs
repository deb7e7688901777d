//! CSV audit of a transfer run, one row per catalog image.

use std::path::Path;

use crate::error::Result;
use crate::transfer::ImageOutcome;

pub fn write_csv(images: &[ImageOutcome], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "image_id",
        "file_name",
        "copy_name",
        "master_uuid",
        "faces",
        "keywords",
        "stack",
        "gps",
    ])?;

    for image in images {
        let faces = if image.faces_unreadable {
            "error".to_string()
        } else {
            image.faces.to_string()
        };
        wtr.write_record([
            image.image_id.to_string().as_str(),
            image.file_name.as_str(),
            image.copy_name.as_str(),
            image.master_uuid.as_deref().unwrap_or(""),
            faces.as_str(),
            image.keywords.to_string().as_str(),
            image.stack.as_deref().unwrap_or(""),
            if image.gps { "yes" } else { "no" },
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
