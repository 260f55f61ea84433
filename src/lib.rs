//! YOLO Darknet datasets: annotation codec, augmentation and transfer to a training service
//!
//! This library converts bounding boxes between a training service's region
//! records and Darknet label files, augments Darknet directories with
//! box-preserving image transforms, and downloads or uploads whole projects.

pub mod augment;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod service;
pub mod transfer;
pub mod types;
pub mod utils;
pub mod walker;

// Re-export commonly used types and functions
pub use augment::{augment, preview, Augmentation, AugmentationSpec, PreviewFrame, Transform};
pub use codec::{
    decode_darknet_line, encode_darknet_line, load_tag_index, save_tag_index, TagIndex,
};
pub use config::{AugmentArgs, DownloadArgs, UploadArgs};
pub use error::{Error, Result};
pub use pipeline::{run_augmentation, AugmentOptions, Executor};
pub use service::{CustomVisionClient, TrainingServiceClient};
pub use transfer::{download_project, upload_directory, UploadOptions, UploadSummary};
pub use types::{ProcessingStats, Region, Sample, SampleImage, ServiceImage, ServiceRegion, ServiceTag};
pub use walker::{enumerate, WalkOptions, Walker};
