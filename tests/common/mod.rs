#![allow(dead_code)]

use cvyolo::service::{ImageStream, TrainingServiceClient};
use cvyolo::types::{ServiceImage, ServiceRegion, ServiceTag};
use cvyolo::{Error, Result};
use image::{Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

/// One upload call as the fake service received it.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub regions: Vec<ServiceRegion>,
}

/// In-memory training project.
#[derive(Default)]
pub struct FakeService {
    pub tags: Mutex<Vec<ServiceTag>>,
    pub images: Vec<ServiceImage>,
    pub uploads: Mutex<Vec<Upload>>,
    /// Upload names the fake rejects.
    pub reject: Vec<String>,
}

impl FakeService {
    pub fn with_tags(names: &[&str]) -> Self {
        let tags = names
            .iter()
            .enumerate()
            .map(|(i, name)| ServiceTag {
                id: format!("tag-{}", i),
                name: name.to_string(),
            })
            .collect();
        Self {
            tags: Mutex::new(tags),
            ..Default::default()
        }
    }

    pub fn tag_id(&self, name: &str) -> String {
        self.tags
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.id.clone())
            .unwrap()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl TrainingServiceClient for FakeService {
    fn list_tags(&self) -> Result<Vec<ServiceTag>> {
        Ok(self.tags.lock().unwrap().clone())
    }

    fn list_images_with_regions(&self) -> Result<ImageStream<'_>> {
        Ok(Box::new(self.images.iter().cloned().map(Ok)))
    }

    fn create_tag(&self, name: &str) -> Result<ServiceTag> {
        let mut tags = self.tags.lock().unwrap();
        if tags.iter().any(|t| t.name == name) {
            return Err(Error::Service(format!("tag {} already exists", name)));
        }
        let tag = ServiceTag {
            id: format!("tag-{}", tags.len()),
            name: name.to_string(),
        };
        tags.push(tag.clone());
        Ok(tag)
    }

    fn upload_image(&self, name: &str, bytes: &[u8], regions: &[ServiceRegion]) -> Result<String> {
        if self.reject.iter().any(|r| r == name) {
            return Err(Error::Service(format!("{} rejected", name)));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(Upload {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            regions: regions.to_vec(),
        });
        Ok(format!("image-{}", uploads.len() - 1))
    }

    fn tagged_image_count(&self) -> Result<Option<usize>> {
        Ok(Some(self.images.len()))
    }
}

pub fn test_image(width: u32, height: u32, shade: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 5) as u8, (y * 5) as u8, shade])
    })
}

pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn region(tag_id: &str, left: f64, top: f64, width: f64, height: f64) -> ServiceRegion {
    ServiceRegion {
        tag_id: tag_id.to_string(),
        left,
        top,
        width,
        height,
    }
}

/// Write `<stem>.png` and, when given, `<stem>.txt` into `dir`.
pub fn write_pair(dir: &Path, stem: &str, label: Option<&str>) {
    test_image(40, 30, stem.len() as u8 * 20)
        .save(dir.join(format!("{}.png", stem)))
        .unwrap();
    if let Some(label) = label {
        std::fs::write(dir.join(format!("{}.txt", stem)), label).unwrap();
    }
}
