//! Packaging of the Report2BQ Python application into `report2bq.zip`
//!
//! The archive is what every Cloud Function deploys from. It is rebuilt on
//! each run; entries are written in a fixed order with a fixed timestamp, so
//! an unchanged source tree produces an identical archive.

use anyhow::{Context, Result, bail};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const ARCHIVE_NAME: &str = "report2bq.zip";

const ENTRY_POINT: &str = "main.py";
const REQUIREMENTS: &str = "requirements.txt";
const PACKAGE_DIRS: [&str; 3] = ["classes", "cloud_functions", "postprocessors"];

/// A built archive
#[derive(Debug)]
pub struct Package {
    pub path: PathBuf,
    /// Archive entry names, in archive order
    pub files: Vec<String>,
    pub size: u64,
}

/// List the files that go into the archive, relative to `source_dir`
pub fn collect_sources(source_dir: &Path) -> Result<Vec<String>> {
    if !source_dir.join(ENTRY_POINT).is_file() {
        bail!(
            "{} not found in {}: point --source-dir at the Report2BQ application",
            ENTRY_POINT,
            source_dir.display()
        );
    }

    let mut files = vec![ENTRY_POINT.to_string()];
    if source_dir.join(REQUIREMENTS).is_file() {
        files.push(REQUIREMENTS.to_string());
    } else {
        log::warn!("No {REQUIREMENTS} in {}", source_dir.display());
    }

    for dir in PACKAGE_DIRS {
        let root = source_dir.join(dir);
        if !root.is_dir() {
            log::debug!("Skipping missing package directory {}", root.display());
            continue;
        }

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Could not walk {}", root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|e| e != "py") {
                continue;
            }
            let relative = path
                .strip_prefix(source_dir)
                .with_context(|| format!("{} is outside the source dir", path.display()))?;
            files.push(archive_name(relative));
        }
    }

    Ok(files)
}

/// Build the archive at `dest`
pub fn build(source_dir: &Path, dest: &Path) -> Result<Package> {
    let files = collect_sources(source_dir)?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }

    let file =
        File::create(dest).with_context(|| format!("Could not create {}", dest.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    for name in &files {
        let source = source_dir.join(name);
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Could not add {name} to archive"))?;
        let mut input =
            File::open(&source).with_context(|| format!("Could not read {}", source.display()))?;
        io::copy(&mut input, &mut zip).with_context(|| format!("Could not compress {name}"))?;
    }

    zip.finish().context("Could not finish archive")?;
    let size = fs::metadata(dest)?.len();
    log::info!("Packaged {} files into {}", files.len(), dest.display());

    Ok(Package {
        path: dest.to_path_buf(),
        files,
        size,
    })
}

/// Archive entry name: `/`-separated, whatever the platform
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
