//! Moving datasets between a training project and a local Darknet directory.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{
    decode_service_regions, encode_service_regions, find_tag_index_file, format_label_file,
    load_tag_index, save_tag_index, TagIndex,
};
use crate::error::{Error, Result};
use crate::io::{ensure_output_directory, write_sample_files, ImageSource};
use crate::service::TrainingServiceClient;
use crate::types::{ProcessingStats, ServiceRegion, CLASS_FILE_NAMES};
use crate::utils::{create_progress_bar, infer_image_format};
use crate::walker::{enumerate, WalkOptions};

/// Tag of the full-frame filler regions added by [`UploadOptions::add_superfluous_regions`].
pub const SUPERFLUOUS_TAG_NAME: &str = "coreml_bugfix";

/// How many images receive a filler region. The service wants a minimum
/// number of tagged images per tag before it trains.
pub const SUPERFLUOUS_REGION_COUNT: usize = 15;

/// Download every tagged image of the project into `output_dir`.
///
/// Images are named by listing position (`0.jpg`, `1.png`, ...) with the
/// extension taken from the image bytes. Tags get class indices in order of
/// first appearance and are saved as `class.names`.
pub fn download_project(
    client: &dyn TrainingServiceClient,
    output_dir: &Path,
) -> Result<ProcessingStats> {
    let tags: HashMap<String, String> = client
        .list_tags()?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();
    info!("Project has {} tags", tags.len());

    let dir = ensure_output_directory(output_dir)?;
    let pb = create_progress_bar(client.tagged_image_count()?.unwrap_or(0) as u64, "Download");

    let mut tag_index = TagIndex::new();
    let mut stats = ProcessingStats::default();
    for (position, image) in client.list_images_with_regions()?.enumerate() {
        let image = image?;
        stats.samples_read += 1;

        let regions = decode_service_regions(&image.regions, &tags)?;
        for region in &regions {
            tag_index.insert(region.tag.as_str());
        }
        let label = format_label_file(&regions, &tag_index)?;
        let extension = infer_image_format(&image.bytes).unwrap_or_else(|| {
            warn!("Unknown image format for {}, saving as jpg", image.id);
            "jpg"
        });

        write_sample_files(
            &dir,
            &position.to_string(),
            extension,
            ImageSource::Bytes(&image.bytes),
            &label,
        )?;
        stats.samples_written += 1;
        pb.inc(1);
    }
    pb.finish_with_message("Done");

    save_tag_index(&tag_index, &dir.join(CLASS_FILE_NAMES[0]))?;
    info!("Wrote {} images and {} tags to {:?}", stats.samples_written, tag_index.len(), dir);
    Ok(stats)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Add a full-frame `coreml_bugfix` region to the first images.
    pub add_superfluous_regions: bool,
    pub skip_orphan_labels: bool,
}

/// Outcome of [`upload_directory`].
#[derive(Debug, Default, Clone)]
pub struct UploadSummary {
    pub stats: ProcessingStats,
    /// Sample id and the image id the service assigned, in upload order.
    pub image_ids: Vec<(String, String)>,
}

/// Return the service id of every name, creating the tags the project lacks.
fn ensure_tags<'a>(
    client: &dyn TrainingServiceClient,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<HashMap<String, String>> {
    let mut ids: HashMap<String, String> = client
        .list_tags()?
        .into_iter()
        .map(|t| (t.name, t.id))
        .collect();
    for name in names {
        if ids.contains_key(name) {
            continue;
        }
        info!("Creating tag \"{}\"", name);
        let tag = client.create_tag(name)?;
        ids.insert(tag.name, tag.id);
    }
    Ok(ids)
}

fn upload_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    sanitize_filename::sanitize(name)
}

/// Upload every sample of `input_dir` with its regions.
///
/// Annotation errors abort the upload; a rejected image is logged and
/// counted as failed.
pub fn upload_directory(
    client: &dyn TrainingServiceClient,
    input_dir: &Path,
    options: UploadOptions,
) -> Result<UploadSummary> {
    let class_file: PathBuf = find_tag_index_file(input_dir).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no class index file in {}", input_dir.display()),
        ))
    })?;
    let tag_index = load_tag_index(&class_file)?;

    let mut wanted: Vec<&str> = tag_index.names().iter().map(String::as_str).collect();
    if options.add_superfluous_regions {
        wanted.push(SUPERFLUOUS_TAG_NAME);
    }
    let tag_ids = ensure_tags(client, wanted)?;
    let superfluous = if options.add_superfluous_regions {
        tag_ids.get(SUPERFLUOUS_TAG_NAME).cloned()
    } else {
        None
    };

    let walker = enumerate(
        input_dir,
        &tag_index,
        WalkOptions {
            skip_orphan_labels: options.skip_orphan_labels,
        },
    )?;
    let pb = create_progress_bar(walker.total() as u64, "Upload");
    let mut summary = UploadSummary::default();

    for (position, sample) in walker.enumerate() {
        let sample = sample?;
        summary.stats.samples_read += 1;

        let mut regions = encode_service_regions(&sample.regions, &tag_ids)?;
        if let Some(tag_id) = superfluous.as_ref().filter(|_| position < SUPERFLUOUS_REGION_COUNT) {
            regions.push(ServiceRegion {
                tag_id: tag_id.clone(),
                left: 0.0,
                top: 0.0,
                width: 1.0,
                height: 1.0,
            });
        }

        let path = sample.image.path().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("sample {} has no image file", sample.id),
            ))
        })?;
        let bytes = fs::read(path)?;
        match client.upload_image(&upload_name(path), &bytes, &regions) {
            Ok(image_id) => {
                debug!("Uploaded {:?} as {}", path, image_id);
                summary.stats.samples_written += 1;
                summary.image_ids.push((sample.id, image_id));
            }
            Err(Error::Service(reason)) => {
                error!("Failed to upload {:?}: {}", path, reason);
                summary.stats.samples_failed += 1;
            }
            Err(e) => return Err(e),
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");
    Ok(summary)
}
