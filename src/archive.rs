//! Zip assembly for the resolved manifest set.
//!
//! Every downloaded file lands at its original tree path, plus one
//! generated credits entry. Assembly is a single step at the end of the
//! flow; nothing is written until the whole batch is in memory.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::download::DownloadBatch;
use crate::release::format_size;
use crate::sources::Source;

/// Name of the generated credits entry.
pub const README_NAME: &str = "README.txt";

#[derive(Debug)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entry count including the credits file.
    pub entries: usize,
    pub bytes_written: u64,
}

/// Write `<appid>.zip` into `out_dir`.
pub fn build_archive(
    appid: &str,
    source: &Source,
    batch: &DownloadBatch,
    out_dir: &Path,
) -> Result<ArchiveSummary> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let zip_path = out_dir.join(format!("{appid}.zip"));
    let file = File::create(&zip_path)
        .with_context(|| format!("Failed to create {}", zip_path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for fetched in &batch.files {
        zip.start_file(fetched.path.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", fetched.path))?;
        zip.write_all(&fetched.bytes)
            .with_context(|| format!("Failed to write {} to archive", fetched.path))?;
    }

    zip.start_file(README_NAME, options)
        .context("Failed to add credits entry")?;
    zip.write_all(readme_text(appid, source, batch).as_bytes())
        .context("Failed to write credits entry")?;

    let finished = zip.finish().context("Failed to finalize archive")?;
    let bytes_written = finished
        .metadata()
        .context("Failed to stat finished archive")?
        .len();

    Ok(ArchiveSummary {
        path: zip_path,
        entries: batch.files.len() + 1,
        bytes_written,
    })
}

fn readme_text(appid: &str, source: &Source, batch: &DownloadBatch) -> String {
    format!(
        "Manifest bundle for app id {appid}\n\
         Source repository: {repo}\n\
         Files: {count}\n\
         Total size: {size}\n\
         Generated: {when} by manifetch v{version}\n",
        repo = source.repo,
        count = batch.files.len(),
        size = format_size(batch.total_bytes),
        when = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        version = env!("CARGO_PKG_VERSION"),
    )
}
