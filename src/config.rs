use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::{AugmentOptions, Executor};
use crate::transfer::UploadOptions;

/// Connection settings shared by the download and upload tools.
#[derive(clap::Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Training endpoint, e.g. https://<resource>.cognitiveservices.azure.com
    #[arg(long = "endpoint", value_parser = validate_endpoint)]
    pub endpoint: String,

    /// Training key of the resource
    #[arg(long = "training_key", env = "CUSTOM_VISION_TRAINING_KEY", hide_env_values = true)]
    pub training_key: String,

    /// Id of the project to read from or write to
    #[arg(long = "project_id")]
    pub project_id: String,
}

/// Download a tagged project into a YOLO Darknet directory.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Directory to write images, labels and class.names into
    #[arg(short = 'o', long = "output_directory")]
    pub output_directory: PathBuf,
}

/// Upload a YOLO Darknet directory into a project.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct UploadArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Directory holding images, labels and a class index file
    #[arg(short = 'i', long = "input_directory")]
    pub input_directory: PathBuf,

    /// Add a full-frame placeholder region to the first images
    #[arg(long = "add_superfluous_regions")]
    pub add_superfluous_regions: bool,

    /// Skip label files without an image instead of failing
    #[arg(long = "skip_orphan_labels")]
    pub skip_orphan_labels: bool,
}

impl UploadArgs {
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            add_superfluous_regions: self.add_superfluous_regions,
            skip_orphan_labels: self.skip_orphan_labels,
        }
    }
}

/// Augment a YOLO Darknet directory.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct AugmentArgs {
    /// Directory holding images, labels and a class index file
    #[arg(short = 'i', long = "input_directory")]
    pub input_directory: PathBuf,

    /// Directory to write augmented pairs into
    #[arg(short = 'o', long = "output_directory", required_unless_present = "preview_only")]
    pub output_directory: Option<PathBuf>,

    /// Render and report augmentations without writing anything
    #[arg(short = 'p', long = "preview_only")]
    pub preview_only: bool,

    /// Process samples on a worker pool
    #[arg(long = "parallel")]
    pub parallel: bool,

    /// Worker threads with --parallel (0 = one per core)
    #[arg(long = "threads", default_value_t = 0, requires = "parallel")]
    pub threads: usize,

    /// Base seed; each sample derives its own generator from it
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Do not copy the original images and labels to the output
    #[arg(long = "skip_originals")]
    pub skip_originals: bool,

    /// Skip label files without an image instead of failing
    #[arg(long = "skip_orphan_labels")]
    pub skip_orphan_labels: bool,

    /// JSON file with the augmentations to run instead of the built-in set
    #[arg(long = "augmentations", value_parser = validate_json_path)]
    pub augmentations: Option<PathBuf>,
}

impl AugmentArgs {
    pub fn augment_options(&self) -> AugmentOptions {
        AugmentOptions {
            input_dir: self.input_directory.clone(),
            output_dir: self.output_directory.clone(),
            executor: if self.parallel {
                Executor::Parallel {
                    threads: self.threads,
                }
            } else {
                Executor::Sequential
            },
            seed: self.seed,
            preview_only: self.preview_only,
            skip_originals: self.skip_originals,
            skip_orphan_labels: self.skip_orphan_labels,
        }
    }
}

// Validate that the endpoint is an http(s) URL
fn validate_endpoint(s: &str) -> Result<String, String> {
    if s.starts_with("https://") || s.starts_with("http://") {
        Ok(s.trim_end_matches('/').to_string())
    } else {
        Err("ENDPOINT must start with http:// or https://".to_string())
    }
}

// Validate that the augmentation file is an existing JSON file
fn validate_json_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.is_file() {
        return Err(format!("{} does not exist", s));
    }
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        Ok(path)
    } else {
        Err("augmentation file must have a .json extension".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_optional_only_when_previewing() {
        assert!(AugmentArgs::try_parse_from(["yoloaug", "-i", "in"]).is_err());
        let args = AugmentArgs::try_parse_from(["yoloaug", "-i", "in", "-p"]).unwrap();
        assert!(args.preview_only);
        assert!(args.output_directory.is_none());
    }

    #[test]
    fn parallel_flag_selects_worker_pool() {
        let args =
            AugmentArgs::try_parse_from(["yoloaug", "-i", "in", "-o", "out", "--parallel", "--threads", "4"])
                .unwrap();
        assert_eq!(args.augment_options().executor, Executor::Parallel { threads: 4 });

        let args = AugmentArgs::try_parse_from(["yoloaug", "-i", "in", "-o", "out"]).unwrap();
        assert_eq!(args.augment_options().executor, Executor::Sequential);
        assert_eq!(args.seed, 42);
    }

    #[test]
    fn endpoint_must_be_a_url() {
        let base = ["cv2yolo", "--training_key", "k", "--project_id", "p", "-o", "out"];
        let mut bad = base.to_vec();
        bad.extend(["--endpoint", "example.com"]);
        assert!(DownloadArgs::try_parse_from(bad).is_err());

        let mut good = base.to_vec();
        good.extend(["--endpoint", "https://example.com/"]);
        let args = DownloadArgs::try_parse_from(good).unwrap();
        assert_eq!(args.service.endpoint, "https://example.com");
    }

    #[test]
    fn superfluous_regions_flag_reaches_options() {
        let args = UploadArgs::try_parse_from([
            "yolo2cv",
            "--endpoint",
            "https://example.com",
            "--training_key",
            "k",
            "--project_id",
            "p",
            "-i",
            "data",
            "--add_superfluous_regions",
        ])
        .unwrap();
        assert!(args.upload_options().add_superfluous_regions);
        assert!(!args.upload_options().skip_orphan_labels);
    }
}
