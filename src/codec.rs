//! Conversion between service regions, Darknet label lines and the class-index file.
//!
//! Darknet lines have the form `<class> <center_x> <center_y> <width> <height>`
//! with every coordinate a fraction of the image size. Service regions carry a
//! tag id and the top-left corner instead of the center.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Location, Result};
use crate::types::{Region, ServiceRegion, CLASS_FILE_NAMES};

/// Ordered tag names. Line N of the class file is class index N.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from names in index order. Duplicate names are rejected.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for name in names {
            let name = name.into();
            if index.by_name.contains_key(&name) {
                return Err(Error::malformed(format!("duplicate tag name \"{}\"", name)));
            }
            index.insert(name);
        }
        Ok(index)
    }

    /// Return the index of `name`, appending it if it is new.
    pub fn insert(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = self.names.len();
        self.by_name.insert(name.clone(), id);
        self.names.push(name);
        id
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Convert service regions to [`Region`]s, resolving tag ids through `tag_lookup`.
pub fn decode_service_regions(
    regions: &[ServiceRegion],
    tag_lookup: &HashMap<String, String>,
) -> Result<Vec<Region>> {
    regions
        .iter()
        .map(|r| {
            let tag = tag_lookup
                .get(&r.tag_id)
                .ok_or_else(|| Error::UnknownTag(r.tag_id.clone()))?;
            Ok(Region::new(tag.clone(), r.left, r.top, r.width, r.height))
        })
        .collect()
}

/// Convert [`Region`]s to service regions, resolving tag names through `tag_ids`.
pub fn encode_service_regions(
    regions: &[Region],
    tag_ids: &HashMap<String, String>,
) -> Result<Vec<ServiceRegion>> {
    regions
        .iter()
        .map(|r| {
            let tag_id = tag_ids
                .get(&r.tag)
                .ok_or_else(|| Error::UnknownTag(r.tag.clone()))?;
            Ok(ServiceRegion {
                tag_id: tag_id.clone(),
                left: r.left,
                top: r.top,
                width: r.width,
                height: r.height,
            })
        })
        .collect()
}

/// Encode one region as a Darknet line (no trailing newline).
pub fn encode_darknet_line(region: &Region, tag_index: &TagIndex) -> Result<String> {
    let class_id = tag_index
        .index_of(&region.tag)
        .ok_or_else(|| Error::UnknownTag(region.tag.clone()))?;
    let (center_x, center_y) = region.center();
    Ok(format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        class_id, center_x, center_y, region.width, region.height
    ))
}

/// Decode one Darknet line. Either the whole line decodes or nothing does.
///
/// Boxes must have a positive size and lie inside the image.
pub fn decode_darknet_line(line: &str, tag_index: &TagIndex) -> Result<Region> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(Error::malformed(format!(
            "expected 5 fields, found {}",
            fields.len()
        )));
    }

    let class_id: usize = fields[0]
        .parse()
        .map_err(|_| Error::malformed(format!("invalid class index \"{}\"", fields[0])))?;
    let tag = tag_index.name_of(class_id).ok_or_else(|| {
        Error::malformed(format!(
            "class index {} out of range for {} tags",
            class_id,
            tag_index.len()
        ))
    })?;

    let mut values = [0.0f64; 4];
    for (value, field) in values.iter_mut().zip(&fields[1..]) {
        *value = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::malformed(format!("invalid coordinate \"{}\"", field)))?;
    }
    let [center_x, center_y, width, height] = values;
    if width <= 0.0 || height <= 0.0 {
        return Err(Error::malformed(format!(
            "box size {}x{} is not positive",
            fields[3], fields[4]
        )));
    }

    let region = Region::from_center(tag, center_x, center_y, width, height);
    if !region.is_within_bounds() {
        return Err(Error::malformed(format!(
            "box {} {} {} {} extends outside the image",
            fields[1], fields[2], fields[3], fields[4]
        )));
    }
    Ok(region)
}

/// Read a Darknet label file. Blank lines are skipped; the first malformed
/// line aborts the whole file.
pub fn read_label_file(path: &Path, tag_index: &TagIndex) -> Result<Vec<Region>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| decode_darknet_line(line, tag_index).map_err(|e| e.at(path, i + 1)))
        .collect()
}

/// Render regions as the contents of a Darknet label file.
pub fn format_label_file(regions: &[Region], tag_index: &TagIndex) -> Result<String> {
    let mut yolo_data = String::with_capacity(regions.len() * 48);
    for region in regions {
        yolo_data.push_str(&encode_darknet_line(region, tag_index)?);
        yolo_data.push('\n');
    }
    Ok(yolo_data)
}

/// Load a class-index file: one tag name per line, blank lines ignored.
pub fn load_tag_index(path: &Path) -> Result<TagIndex> {
    let content = fs::read_to_string(path)?;
    let mut index = TagIndex::new();
    for (i, line) in content.lines().enumerate() {
        let name = line.trim_end();
        if name.is_empty() {
            continue;
        }
        if index.index_of(name).is_some() {
            return Err(Error::MalformedAnnotation {
                location: Location {
                    path: Some(path.to_path_buf()),
                    line: Some(i + 1),
                },
                reason: format!("duplicate tag name \"{}\"", name),
            });
        }
        index.insert(name);
    }
    Ok(index)
}

/// Write a class-index file, one name per line in index order.
pub fn save_tag_index(tag_index: &TagIndex, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for name in tag_index.names() {
        writeln!(writer, "{}", name)?;
    }
    writer.flush()?;
    Ok(())
}

/// Locate the class-index file of a dataset directory.
pub fn find_tag_index_file(dir: &Path) -> Option<PathBuf> {
    CLASS_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// True for file names reserved for the class index.
pub fn is_tag_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| CLASS_FILE_NAMES.contains(&n))
}
