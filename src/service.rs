//! Access to the hosted training service.
//!
//! The transfer code only sees [`TrainingServiceClient`]; [`CustomVisionClient`]
//! implements it over the Custom Vision training REST API.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ServiceImage, ServiceRegion, ServiceTag};

/// Number of tagged images requested per listing call.
pub const PAGE_SIZE: usize = 256;

const API_VERSION: &str = "v3.3";

pub type ImageStream<'a> = Box<dyn Iterator<Item = Result<ServiceImage>> + 'a>;

/// Operations the transfer tools need from a training project.
pub trait TrainingServiceClient {
    fn list_tags(&self) -> Result<Vec<ServiceTag>>;

    /// Tagged images with their regions and encoded bytes, fetched lazily.
    fn list_images_with_regions(&self) -> Result<ImageStream<'_>>;

    fn create_tag(&self, name: &str) -> Result<ServiceTag>;

    /// Upload one image with its regions and return the id the service assigned.
    fn upload_image(&self, name: &str, bytes: &[u8], regions: &[ServiceRegion]) -> Result<String>;

    /// Number of tagged images, if the service can tell cheaply.
    fn tagged_image_count(&self) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Blocking client for one Custom Vision project.
pub struct CustomVisionClient {
    agent: ureq::Agent,
    base_url: String,
    training_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaggedImage {
    id: String,
    original_image_uri: String,
    #[serde(default)]
    regions: Vec<ServiceRegion>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageFileCreateEntry<'a> {
    name: &'a str,
    contents: String,
    regions: &'a [ServiceRegion],
}

#[derive(Serialize)]
struct ImageFileCreateBatch<'a> {
    images: Vec<ImageFileCreateEntry<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageCreateResult {
    status: String,
    image: Option<CreatedImage>,
}

#[derive(Debug, Deserialize)]
struct CreatedImage {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageCreateSummary {
    is_batch_successful: bool,
    #[serde(default)]
    images: Vec<ImageCreateResult>,
}

/// Id of the single image of an upload batch.
///
/// Re-uploading an identical image is reported as `OKDuplicate` and still
/// carries the id of the stored image.
fn uploaded_image_id(name: &str, summary: ImageCreateSummary) -> Result<String> {
    let Some(result) = summary.images.into_iter().next() else {
        return Err(Error::Service(format!("upload of {} returned no result", name)));
    };
    let accepted = summary.is_batch_successful || result.status == "OKDuplicate";
    match (accepted, result.image) {
        (true, Some(image)) => {
            if result.status == "OKDuplicate" {
                debug!("{} is already in the project", name);
            }
            Ok(image.id)
        }
        (true, None) => Err(Error::Service(format!("upload of {} returned no image id", name))),
        (false, _) => Err(Error::Service(format!(
            "upload of {} failed: {}",
            name, result.status
        ))),
    }
}

/// Turn HTTP error statuses into service errors that include the response body.
fn checked(result: std::result::Result<ureq::Response, ureq::Error>) -> Result<ureq::Response> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => {
            let url = response.get_url().to_string();
            let body = response.into_string().unwrap_or_default();
            Err(Error::Service(format!("{} from {}: {}", code, url, body)))
        }
        Err(e) => Err(e.into()),
    }
}

fn json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T> {
    response
        .into_json()
        .map_err(|e| Error::Service(format!("unexpected response: {}", e)))
}

impl CustomVisionClient {
    pub fn new(endpoint: &str, training_key: &str, project_id: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .build();
        Self {
            agent,
            base_url: format!(
                "{}/customvision/{}/training/projects/{}",
                endpoint.trim_end_matches('/'),
                API_VERSION,
                project_id
            ),
            training_key: training_key.to_string(),
        }
    }

    fn get(&self, path: &str) -> ureq::Request {
        self.agent
            .get(&format!("{}{}", self.base_url, path))
            .set("Training-Key", &self.training_key)
    }

    fn post(&self, path: &str) -> ureq::Request {
        self.agent
            .post(&format!("{}{}", self.base_url, path))
            .set("Training-Key", &self.training_key)
    }

    fn tagged_images_page(&self, skip: usize) -> Result<Vec<TaggedImage>> {
        debug!("Listing tagged images {}..{}", skip, skip + PAGE_SIZE);
        let response = checked(
            self.get("/images/tagged")
                .query("take", &PAGE_SIZE.to_string())
                .query("skip", &skip.to_string())
                .call(),
        )?;
        json(response)
    }

    fn fetch_image(&self, image: TaggedImage) -> Result<ServiceImage> {
        // Blob URIs are pre-signed and must not carry the training key.
        let response = checked(self.agent.get(&image.original_image_uri).call())?;
        let mut bytes = Vec::new();
        response.into_reader().read_to_end(&mut bytes)?;
        Ok(ServiceImage {
            id: image.id,
            bytes,
            regions: image.regions,
        })
    }
}

/// Page-by-page walk over the tagged images of a project.
struct TaggedImages<'a> {
    client: &'a CustomVisionClient,
    skip: usize,
    buffer: VecDeque<Result<ServiceImage>>,
    exhausted: bool,
}

/// Fetch every item of a page on the rayon pool, keeping the listing order.
fn fetch_in_order<T, U, F>(items: Vec<T>, fetch: F) -> Vec<Result<U>>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U> + Sync + Send,
{
    items.into_par_iter().map(fetch).collect()
}

impl Iterator for TaggedImages<'_> {
    type Item = Result<ServiceImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.client.tagged_images_page(self.skip) {
                Ok(page) => {
                    self.exhausted = page.len() < PAGE_SIZE;
                    self.skip += page.len();
                    let client = self.client;
                    self.buffer
                        .extend(fetch_in_order(page, |image| client.fetch_image(image)));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front()
    }
}

impl TrainingServiceClient for CustomVisionClient {
    fn list_tags(&self) -> Result<Vec<ServiceTag>> {
        json(checked(self.get("/tags").call())?)
    }

    fn list_images_with_regions(&self) -> Result<ImageStream<'_>> {
        Ok(Box::new(TaggedImages {
            client: self,
            skip: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn create_tag(&self, name: &str) -> Result<ServiceTag> {
        json(checked(self.post("/tags").query("name", name).call())?)
    }

    fn upload_image(&self, name: &str, bytes: &[u8], regions: &[ServiceRegion]) -> Result<String> {
        let batch = ImageFileCreateBatch {
            images: vec![ImageFileCreateEntry {
                name,
                contents: STANDARD.encode(bytes),
                regions,
            }],
        };
        let summary: ImageCreateSummary = json(checked(self.post("/images/files").send_json(&batch))?)?;
        uploaded_image_id(name, summary)
    }

    fn tagged_image_count(&self) -> Result<Option<usize>> {
        json(checked(self.get("/images/tagged/count").call())?).map(Some)
    }
}
