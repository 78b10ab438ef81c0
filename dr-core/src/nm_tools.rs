//! Operator batch tools for notification messages.
//!
//! None of these touch ingestion state: they write new manifests next to the
//! original, or relocate a manifest together with the files it lists.

use std::path::{Path, PathBuf};

use crate::error::{io_err, ManifestError};
use crate::filename::{batch_prefix, tagged_name};
use crate::manifest::{FileEntry, Manifest};

/// Paths written by a copy or move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub manifest: PathBuf,
    pub files: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

/// Partition `files` into chunks of at most `max_files` entries without ever
/// separating a run of entries that share a batch prefix.
///
/// A prefix run longer than `max_files` becomes a chunk of its own.
pub fn split_entries(files: &[FileEntry], max_files: usize) -> Vec<Vec<FileEntry>> {
    let mut chunks = Vec::new();
    let mut current: Vec<FileEntry> = Vec::new();
    let mut start = 0;

    while start < files.len() {
        let prefix = batch_prefix(&files[start].filename);
        let end = files[start..]
            .iter()
            .position(|f| batch_prefix(&f.filename) != prefix)
            .map(|offset| start + offset)
            .unwrap_or(files.len());
        let group = &files[start..end];

        if !current.is_empty() && current.len() + group.len() > max_files {
            chunks.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(group);
        start = end;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split the manifest at `path` into manifests of at most `max_files` entries,
/// written alongside it as `<stem>-split001<suffix>`, `<stem>-split002<suffix>`, …
pub fn split(path: &Path, max_files: usize) -> Result<Vec<PathBuf>, ManifestError> {
    if max_files == 0 {
        return Err(ManifestError::InvalidArgument(
            "maximum files per manifest must be at least 1".to_string(),
        ));
    }
    let manifest = Manifest::load(path)?;
    let (dir, name) = dir_and_name(path)?;

    let mut written = Vec::new();
    for (idx, files) in split_entries(&manifest.files, max_files)
        .into_iter()
        .enumerate()
    {
        let out_name = tagged_name(&name, &format!("split{:03}", idx + 1));
        let out_path = dir.join(&out_name);
        Manifest {
            message_type: manifest.message_type.clone(),
            identifier: out_name,
            files,
        }
        .save(&out_path)?;
        written.push(out_path);
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

/// Entries in ascending filename order, which is chronological order under the
/// naming convention.
pub fn sort_entries(files: &[FileEntry]) -> Vec<FileEntry> {
    let mut sorted = files.to_vec();
    sorted.sort_by(|a, b| a.filename.cmp(&b.filename));
    sorted
}

/// Write a filename-sorted copy of the manifest at `path` as `<stem>-sorted<suffix>`.
pub fn sort(path: &Path) -> Result<PathBuf, ManifestError> {
    let manifest = Manifest::load(path)?;
    let (dir, name) = dir_and_name(path)?;

    let out_name = tagged_name(&name, "sorted");
    let out_path = dir.join(&out_name);
    Manifest {
        message_type: manifest.message_type,
        identifier: out_name,
        files: sort_entries(&manifest.files),
    }
    .save(&out_path)?;
    Ok(out_path)
}

// ---------------------------------------------------------------------------
// Copy / move
// ---------------------------------------------------------------------------

/// Copy a manifest and every file it lists into `dest_dir`.
///
/// Data files land first and the manifest last, so a watcher on `dest_dir`
/// never sees a manifest before its files.
pub fn copy(path: &Path, dest_dir: &Path) -> Result<Relocation, ManifestError> {
    relocate(path, dest_dir, |from, to| {
        std::fs::copy(from, to).map(|_| ())
    })
}

/// Move a manifest and every file it lists into `dest_dir`, data files first.
///
/// Falls back to copy + delete when a rename is not possible (e.g. across volumes).
pub fn move_to(path: &Path, dest_dir: &Path) -> Result<Relocation, ManifestError> {
    relocate(path, dest_dir, |from, to| match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    })
}

fn relocate(
    path: &Path,
    dest_dir: &Path,
    transfer: impl Fn(&Path, &Path) -> std::io::Result<()>,
) -> Result<Relocation, ManifestError> {
    let manifest = Manifest::load(path)?;
    let (src_dir, name) = dir_and_name(path)?;
    std::fs::create_dir_all(dest_dir).map_err(|e| io_err(dest_dir, e))?;

    let mut files = Vec::with_capacity(manifest.files.len());
    for entry in &manifest.files {
        let from = src_dir.join(&entry.filename);
        let to = dest_dir.join(&entry.filename);
        transfer(&from, &to).map_err(|e| io_err(&from, e))?;
        files.push(to);
    }

    // Published under a temporary name first; no watcher suffix matches `.tmp`.
    let manifest_dest = dest_dir.join(&name);
    let manifest_tmp = dest_dir.join(format!("{name}.tmp"));
    transfer(path, &manifest_tmp).map_err(|e| io_err(path, e))?;
    std::fs::rename(&manifest_tmp, &manifest_dest).map_err(|e| io_err(&manifest_tmp, e))?;

    Ok(Relocation {
        manifest: manifest_dest,
        files,
    })
}

fn dir_and_name(path: &Path) -> Result<(PathBuf, String), ManifestError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ManifestError::InvalidArgument(format!("{} has no file name", path.display()))
        })?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, name))
}
