//! Enumerate the image + label pairs of a Darknet dataset directory.

use glob::glob;
use log::warn;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::codec::{is_tag_index_file, read_label_file, TagIndex};
use crate::error::{Error, Result};
use crate::types::{get_image_extensions_set, Sample, SampleImage};

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Log and skip label files that have no image instead of failing.
    pub skip_orphan_labels: bool,
}

/// A listed image with its optional label file, not yet read.
#[derive(Debug, Clone)]
struct Entry {
    id: String,
    image_path: PathBuf,
    label_path: Option<PathBuf>,
}

/// Lazy, restartable sequence of samples sorted by file name.
///
/// The directory is listed once up front; label files are decoded as the
/// iterator advances and images are left on disk as [`SampleImage::File`].
#[derive(Debug, Clone)]
pub struct Walker {
    entries: Vec<Entry>,
    next: usize,
    tag_index: TagIndex,
}

impl Walker {
    /// Number of samples in the listing, independent of iteration progress.
    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

impl Iterator for Walker {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.next)?;
        self.next += 1;
        Some(load_entry(entry, &self.tag_index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.entries.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Walker {}

fn load_entry(entry: &Entry, tag_index: &TagIndex) -> Result<Sample> {
    let regions = match &entry.label_path {
        Some(label_path) => read_label_file(label_path, tag_index)?,
        None => Vec::new(),
    };
    Ok(Sample::new(
        entry.id.clone(),
        SampleImage::File(entry.image_path.clone()),
        regions,
    ))
}

/// List the files of `dir` (non-recursive), sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = glob(&pattern).map_err(|e| {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_owned)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| get_image_extensions_set().contains(&e.to_lowercase()))
}

fn is_label(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "txt") && !is_tag_index_file(path)
}

/// Pair every supported image in `directory` with its same-stem `.txt` label.
///
/// Fails with [`Error::MissingImage`] when a label file has no image, unless
/// `options.skip_orphan_labels` is set.
pub fn enumerate(directory: &Path, tag_index: &TagIndex, options: WalkOptions) -> Result<Walker> {
    let files = list_files(directory)?;

    let mut labels: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in files.iter().filter(|p| is_label(p)) {
        if let Some(stem) = stem_of(path) {
            labels.insert(stem, path.clone());
        }
    }

    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    for image_path in files.iter().filter(|p| is_image(p)) {
        let Some(id) = stem_of(image_path) else {
            warn!("Skipping image with non UTF-8 name: {:?}", image_path);
            continue;
        };
        if !seen.insert(id.clone()) {
            warn!(
                "Skipping {:?}: another image already uses the stem \"{}\"",
                image_path, id
            );
            continue;
        }
        entries.push(Entry {
            label_path: labels.get(&id).cloned(),
            id,
            image_path: image_path.clone(),
        });
    }

    for (stem, label_path) in &labels {
        if seen.contains(stem) {
            continue;
        }
        if options.skip_orphan_labels {
            warn!("Skipping label file without image: {:?}", label_path);
        } else {
            return Err(Error::MissingImage(label_path.clone()));
        }
    }

    Ok(Walker {
        entries,
        next: 0,
        tag_index: tag_index.clone(),
    })
}
