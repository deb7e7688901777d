mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use catalog_bridge::db::{catalog, SourceLibrary};
use catalog_bridge::report;
use catalog_bridge::transfer::{self, TimestampFallbackResolver, TransferOptions, TransferSummary};
use catalog_bridge::Config;

/// Transfers faces, keywords, stacks and GPS positions from an Aperture
/// library into a Lightroom catalog
#[derive(Parser, Debug)]
#[command(name = "catalog-bridge", version, about)]
struct Cli {
    /// Lightroom catalog to write to
    #[arg(short = 'l', long, default_value = "./Lightroom Catalog.lrcat")]
    catalog: PathBuf,

    /// Aperture library bundle to read from
    /// [default: ~/Pictures/Aperture Library.aplibrary]
    #[arg(short = 'a', long)]
    library: Option<PathBuf>,

    /// Keyword that person keywords are created under; empty for the top level
    #[arg(short = 'f', long)]
    face_root: Option<String>,

    /// Keyword that Aperture keywords are created under; empty for the top level
    #[arg(short = 't', long)]
    tag_root: Option<String>,

    /// Write a CSV line per catalog image to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Do everything, then roll back instead of saving
    #[arg(long)]
    dry_run: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn default_library_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Pictures")
        .join("Aperture Library.aplibrary")
}

fn banner(title: &str) {
    println!();
    println!("=== {} ===", title);
}

fn print_summary(summary: &TransferSummary) {
    banner("Faces");
    for image in summary.images.iter().filter(|image| image.faces > 0) {
        println!("{}: {} faces", image.file_name, image.faces);
    }

    let stats = &summary.stats;
    banner("People");
    for (name, faces) in &stats.people {
        println!("{}: {}", name, faces);
    }

    banner("Summary");
    println!("Images:               {}", stats.images);
    println!("Not found in library: {}", stats.unmatched_images);
    println!("Without faces:        {}", stats.images_without_faces);
    println!("Face read errors:     {}", stats.face_read_errors);
    println!("Faces transferred:    {}", stats.faces_inserted);
    println!("Faces failed:         {}", stats.faces_failed);
    println!("Unknown faces:        {}", stats.unknown_faces);
    println!("People:               {}", stats.people.len());
    println!("Keywords created:     {}", stats.keywords_created);
    println!("Keyword assignments:  {}", stats.keyword_links);
    println!("Co-occurrences:       {}", stats.cooccurrences);
    println!("Stacks:               {}", stats.stacks_created);
    println!("Positions:            {}", stats.gps_updated);
    println!("Ids allocated:        {}", summary.ids_allocated);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).with_context(|| format!("Failed to load config {:?}", path))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(root) = cli.face_root {
        config.keywords.face_root = root;
    }
    if let Some(root) = cli.tag_root {
        config.keywords.tag_root = root;
    }

    if let Err(e) = logging::init(config.logging.directory.clone(), cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let library_path = cli.library.unwrap_or_else(default_library_path);
    let source = SourceLibrary::open(&library_path, &config.library)
        .with_context(|| format!("Failed to open Aperture library {:?}", library_path))?;
    let mut catalog = catalog::open(&cli.catalog)
        .with_context(|| format!("Failed to open Lightroom catalog {:?}", cli.catalog))?;

    let mut options = TransferOptions::from_config(&config);
    options.dry_run = cli.dry_run;

    banner("Transfer");
    println!("From: {}", library_path.display());
    println!("To:   {}", cli.catalog.display());

    let summary = transfer::run(&mut catalog, &source, &TimestampFallbackResolver, &options)
        .context("Transfer failed, the catalog was not changed")?;

    print_summary(&summary);

    if let Some(path) = &cli.report {
        report::write_csv(&summary.images, path)
            .with_context(|| format!("Failed to write report {:?}", path))?;
        println!();
        println!("Report written to {}", path.display());
    }

    println!();
    if summary.committed {
        println!("Looks good.");
    } else {
        println!("Dry run, nothing was saved.");
    }
    Ok(())
}
