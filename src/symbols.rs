//! Symbols preparation
//!
//! A single symbols file is uploaded as-is. Anything else (several paths, a
//! directory, or an input type that always needs an archive) is zipped into
//! one archive whose entries are relative to the common parent of the inputs.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::debug;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Archive name used when the inputs have no common parent
const DEFAULT_ARCHIVE_NAME: &str = "symbols";

/// Longest common prefix of `/`-separated paths, compared segment by segment
///
/// `["/a/b/c", "/a/b/d"]` gives `"/a/b"`, `["/a/b", "/x/y"]` gives `""` and a
/// single path is its own common parent.
pub fn find_common_parent<S: AsRef<str>>(paths: &[S]) -> String {
    let Some((first, rest)) = paths.split_first() else {
        return String::new();
    };

    let mut common: Vec<&str> = first.as_ref().split('/').collect();
    for path in rest {
        let shared = common
            .iter()
            .zip(path.as_ref().split('/'))
            .take_while(|(a, b)| *a == b)
            .count();
        common.truncate(shared);
    }
    common.join("/")
}

/// Name of `path` inside an archive rooted at `root`
///
/// Without a root the path is kept whole, minus leading separators and the
/// drive-letter colon.
pub fn archive_entry_name(path: &str, root: &str) -> String {
    if !root.is_empty() {
        if let Some(relative) = path.strip_prefix(root) {
            return relative.trim_start_matches('/').to_string();
        }
    }

    let trimmed = path.trim_start_matches(['/', '\\']);
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            let rest = &trimmed[2..];
            format!("{drive}{rest}")
        }
        _ => trimmed.to_string(),
    }
}

/// Where the archive for `root` is written: `{archive_dir}/{basename(root)}.zip`
pub fn archive_path(root: &str, archive_dir: &Path) -> PathBuf {
    let name = root
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_ARCHIVE_NAME);
    archive_dir.join(format!("{name}.zip"))
}

/// Turn resolved symbol paths into the single file to upload
///
/// Returns `None` when there is nothing to upload. `force_archive` zips even a
/// single file (Breakpad native libraries).
pub async fn prepare_symbols(
    paths: &[PathBuf],
    force_archive: bool,
    archive_dir: &Path,
) -> Result<Option<PathBuf>> {
    if paths.is_empty() {
        return Ok(None);
    }

    if !force_archive && paths.len() == 1 && paths[0].is_file() {
        debug!(path = %paths[0].display(), "single symbols file");
        return Ok(Some(paths[0].clone()));
    }

    let normalized: Vec<String> = paths.iter().map(|p| normalize(p)).collect();
    let mut root = find_common_parent(&normalized);
    // A lone file is archived next to its name, not as an empty entry
    if paths.len() == 1 && paths[0].is_file() {
        root = parent_of(&root);
    }

    let zip_path = archive_path(&root, archive_dir);
    debug!(root = %root, archive = %zip_path.display(), inputs = paths.len(), "archiving symbols");

    let inputs = paths.to_vec();
    let target = zip_path.clone();
    spawn_blocking(move || write_archive(&inputs, &root, &target))
        .await
        .map_err(|e| Error::Other(format!("symbols archive task failed: {e}")))??;

    Ok(Some(zip_path))
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn parent_of(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default()
}

fn write_archive(inputs: &[PathBuf], root: &str, target: &Path) -> Result<()> {
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut writer = ZipWriter::new(BufWriter::new(File::create(target)?));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for input in inputs {
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let name = archive_entry_name(&normalize(entry.path()), root);
            if name.is_empty() {
                continue;
            }

            if entry.file_type().is_dir() {
                writer.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(name, options)?;
                let mut source = File::open(entry.path())?;
                std::io::copy(&mut source, &mut writer)?;
            }
        }
    }

    writer.finish()?.flush()?;
    Ok(())
}
