//! Augmentation of a sample with co-transformed regions.
//!
//! An [`AugmentationSpec`] is a list of named [`Augmentation`]s. Each one is a
//! chain of [`Transform`]s run in order on the decoded image, repeated
//! `repetitions` times with fresh random draws. Geometric steps move the
//! regions with the pixels and then clip them to the image; regions that end
//! up outside the image, or with no area left, are dropped.

pub mod geometry;
pub mod photometric;
pub mod transform;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Region, Sample, SampleImage};
use geometry::clip_to_unit;
pub use transform::{Range, Transform};
use transform::{BoxPolicy, Canvas};

fn one() -> u32 {
    1
}

/// A named transform chain and how many variants to draw from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    pub name: String,
    pub transforms: Vec<Transform>,
    #[serde(default = "one")]
    pub repetitions: u32,
}

impl Augmentation {
    pub fn new(name: impl Into<String>, transforms: Vec<Transform>, repetitions: u32) -> Self {
        Self {
            name: name.into(),
            transforms,
            repetitions,
        }
    }

    /// Output id of repetition `rep` for the sample `id`.
    pub fn variant_id(&self, id: &str, rep: u32) -> String {
        if self.repetitions == 1 {
            format!("{}_{}", id, self.name)
        } else {
            format!("{}_{}_rep{}", id, self.name, rep)
        }
    }
}

/// The recipe shared by every sample of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSpec {
    pub augmentations: Vec<Augmentation>,
}

impl AugmentationSpec {
    pub fn new(augmentations: Vec<Augmentation>) -> Self {
        Self { augmentations }
    }

    /// Load a spec from JSON and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let spec: Self = serde_json::from_reader(reader)
            .map_err(|e| Error::InvalidSpec(format!("{}: {}", path.display(), e)))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        for aug in &self.augmentations {
            if aug.name.is_empty() {
                return Err(Error::InvalidSpec("augmentation without a name".to_string()));
            }
            aug.transforms.iter().try_for_each(Transform::validate)?;
        }
        Ok(())
    }

    /// Number of derivative samples produced per input sample.
    pub fn variant_count(&self) -> usize {
        self.augmentations
            .iter()
            .map(|a| a.repetitions as usize)
            .sum()
    }
}

fn rotation(increment: i32) -> Augmentation {
    let name = if increment < 0 {
        format!("RotateBack{}", -increment)
    } else {
        format!("Rotate{}", increment)
    };
    let degrees = increment as f32;
    Augmentation::new(
        name,
        vec![
            Transform::Grayscale,
            Transform::Rotate {
                degrees: [degrees, degrees],
            },
        ],
        1,
    )
}

impl Default for AugmentationSpec {
    /// Camera jitter, blur, noise, fixed rotations and scaling. The rotated,
    /// scaled and plain copies are grayscale.
    fn default() -> Self {
        let mut augmentations = vec![
            Augmentation::new(
                "SimulateVariedCameraConditions",
                vec![Transform::SomeOf {
                    min: 1,
                    max: 3,
                    transforms: vec![
                        Transform::Sharpen {
                            alpha: [0.0, 1.0],
                            lightness: [0.75, 1.5],
                        },
                        Transform::Add {
                            value: [-10.0, 10.0],
                            per_channel: 0.5,
                        },
                        Transform::HueSaturation {
                            hue: [-20.0, 20.0],
                            saturation: [-0.08, 0.08],
                        },
                    ],
                }],
                5,
            ),
            Augmentation::new(
                "Blur",
                vec![Transform::GaussianBlur { sigma: [3.0, 5.0] }],
                3,
            ),
            Augmentation::new(
                "AdditiveGaussianNoise",
                vec![Transform::AdditiveGaussianNoise {
                    stddev: [12.75, 12.75],
                }],
                1,
            ),
        ];
        augmentations.extend([-15, -10, -5, 5, 10, 15].into_iter().map(rotation));
        augmentations.push(Augmentation::new(
            "Scale",
            vec![
                Transform::Grayscale,
                Transform::Affine {
                    scale_x: [0.8, 1.2],
                    scale_y: [0.8, 1.2],
                    rotate: [-5.0, 5.0],
                },
            ],
            5,
        ));
        augmentations.push(Augmentation::new("Original", vec![Transform::Grayscale], 1));
        Self { augmentations }
    }
}

/// Clip every region to the image, dropping those with nothing left.
fn clip_regions(regions: &[Region]) -> Vec<Region> {
    regions.iter().filter_map(clip_to_unit).collect()
}

fn run_chain<R: Rng + ?Sized>(
    image: &RgbImage,
    regions: &[Region],
    transforms: &[Transform],
    policy: BoxPolicy,
    rng: &mut R,
) -> Result<Canvas> {
    let regions = match policy {
        BoxPolicy::Enforce => clip_regions(regions),
        BoxPolicy::Keep => regions.to_vec(),
    };
    let mut canvas = Canvas {
        image: image.clone(),
        regions,
        policy,
    };
    for transform in transforms {
        transform.apply(&mut canvas, rng)?;
    }
    Ok(canvas)
}

/// Produce the original sample followed by one derivative per augmentation repetition.
///
/// The original keeps its pixels. Every emitted region, the original's
/// included, lies inside the unit square.
pub fn augment<R: Rng + ?Sized>(
    sample: &Sample,
    spec: &AugmentationSpec,
    rng: &mut R,
) -> Result<Vec<Sample>> {
    let mut out = Vec::with_capacity(1 + spec.variant_count());
    out.push(Sample::new(
        sample.id.clone(),
        sample.image.clone(),
        clip_regions(&sample.regions),
    ));
    if spec.variant_count() == 0 {
        return Ok(out);
    }

    let base = sample.image.to_rgb()?;
    for aug in &spec.augmentations {
        for rep in 0..aug.repetitions {
            let canvas = run_chain(&base, &sample.regions, &aug.transforms, BoxPolicy::Enforce, rng)?;
            out.push(Sample::new(
                aug.variant_id(&sample.id, rep),
                SampleImage::Decoded(canvas.image),
                canvas.regions,
            ));
        }
    }
    Ok(out)
}

/// An augmented image with its transformed regions, for inspection.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub id: String,
    pub image: RgbImage,
    /// Regions after transformation, neither clipped nor dropped.
    pub regions: Vec<Region>,
}

const PREVIEW_BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

impl PreviewFrame {
    pub fn regions_out_of_bounds(&self) -> usize {
        self.regions.iter().filter(|r| !r.is_within_bounds()).count()
    }

    /// Copy of the image with every region outlined.
    pub fn render(&self) -> RgbImage {
        let mut image = self.image.clone();
        let (w, h) = (image.width() as f64, image.height() as f64);
        for region in &self.regions {
            let x = (region.left * w).round() as i32;
            let y = (region.top * h).round() as i32;
            let rw = ((region.width * w).round() as u32).max(1);
            let rh = ((region.height * h).round() as u32).max(1);
            draw_hollow_rect_mut(&mut image, Rect::at(x, y).of_size(rw, rh), PREVIEW_BOX_COLOR);
        }
        image
    }
}

/// Run the chains of `spec` on `sample` for inspection only. Nothing is written.
pub fn preview<R: Rng + ?Sized>(
    sample: &Sample,
    spec: &AugmentationSpec,
    rng: &mut R,
) -> Result<Vec<PreviewFrame>> {
    let base = sample.image.to_rgb()?;
    let mut frames = Vec::with_capacity(spec.variant_count());
    for aug in &spec.augmentations {
        for rep in 0..aug.repetitions {
            let canvas = run_chain(&base, &sample.regions, &aug.transforms, BoxPolicy::Keep, rng)?;
            frames.push(PreviewFrame {
                id: aug.variant_id(&sample.id, rep),
                image: canvas.image,
                regions: canvas.regions,
            });
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample(regions: Vec<Region>) -> Sample {
        let image = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 7) as u8, (y * 9) as u8, 128]));
        Sample::new("img", SampleImage::Decoded(image), regions)
    }

    fn decoded(sample: &Sample) -> &RgbImage {
        match &sample.image {
            SampleImage::Decoded(img) => img,
            SampleImage::File(_) => panic!("expected decoded image"),
        }
    }

    #[test]
    fn original_comes_first_and_ids_follow_repetitions() {
        let spec = AugmentationSpec::new(vec![
            Augmentation::new("Flip", vec![Transform::FlipHorizontal { p: 1.0 }], 1),
            Augmentation::new("Gray", vec![Transform::Grayscale], 2),
        ]);
        let input = sample(vec![Region::new("a", 0.1, 0.1, 0.2, 0.2)]);
        let out = augment(&input, &spec, &mut StdRng::seed_from_u64(0)).unwrap();
        let ids: Vec<&str> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["img", "img_Flip", "img_Gray_rep0", "img_Gray_rep1"]);
        assert_eq!(out[0].regions, input.regions);
    }

    #[test]
    fn different_seeds_give_different_pixels_and_same_box_count() {
        let spec = AugmentationSpec::new(vec![Augmentation::new(
            "Mix",
            vec![
                Transform::Rotate {
                    degrees: [-10.0, 10.0],
                },
                Transform::AdditiveGaussianNoise {
                    stddev: [8.0, 8.0],
                },
            ],
            1,
        )]);
        let input = sample(vec![
            Region::new("a", 0.4, 0.4, 0.2, 0.2),
            Region::new("b", 0.3, 0.35, 0.1, 0.1),
        ]);
        let a = augment(&input, &spec, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = augment(&input, &spec, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(decoded(&a[1]).as_raw(), decoded(&b[1]).as_raw());
        assert_eq!(a[1].regions.len(), 2);
        assert_eq!(b[1].regions.len(), 2);
    }

    #[test]
    fn same_seed_is_reproducible() {
        let spec = AugmentationSpec::default();
        let input = sample(vec![Region::new("a", 0.4, 0.4, 0.2, 0.2)]);
        let a = augment(&input, &spec, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = augment(&input, &spec, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(a.len(), 1 + spec.variant_count());
        for (x, y) in a.iter().zip(&b).skip(1) {
            assert_eq!(decoded(x).as_raw(), decoded(y).as_raw());
            assert_eq!(x.regions, y.regions);
        }
    }

    #[test]
    fn default_spec_keeps_every_region_in_bounds() {
        let spec = AugmentationSpec::default();
        spec.validate().unwrap();
        let input = sample(vec![
            Region::new("a", 0.0, 0.0, 0.3, 0.3),
            Region::new("b", 0.7, 0.6, 0.3, 0.4),
            Region::new("c", 0.45, 0.45, 0.1, 0.1),
        ]);
        let out = augment(&input, &spec, &mut StdRng::seed_from_u64(11)).unwrap();
        for s in out.iter().skip(1) {
            assert!(s.regions.iter().all(Region::is_within_bounds), "{}: {:?}", s.id, s.regions);
        }
        let names: Vec<&str> = spec.augmentations.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"RotateBack15"));
        assert!(names.contains(&"Rotate5"));
    }

    #[test]
    fn photometric_chains_clip_input_regions() {
        let spec = AugmentationSpec::new(vec![
            Augmentation::new("Gray", vec![Transform::Grayscale], 1),
            Augmentation::new(
                "Blur",
                vec![Transform::GaussianBlur { sigma: [1.0, 1.0] }],
                1,
            ),
            Augmentation::new("NoFlip", vec![Transform::FlipHorizontal { p: 0.0 }], 1),
        ]);
        let input = sample(vec![
            Region::new("a", 0.95, 0.95, 0.2, 0.2),
            Region::new("b", 0.4, 0.4, -0.2, 0.2),
            Region::new("c", 1.2, 0.1, 0.1, 0.1),
        ]);
        let out = augment(&input, &spec, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(out.len(), 4);
        for s in &out {
            assert_eq!(s.regions.len(), 1, "{}", s.id);
            assert!(s.regions[0].is_within_bounds(), "{}: {:?}", s.id, s.regions);
            assert!((s.regions[0].width - 0.05).abs() < 1e-9);
        }
    }

    #[test]
    fn preview_keeps_overhang_and_renders_boxes() {
        let spec = AugmentationSpec::new(vec![Augmentation::new(
            "Zoom",
            vec![Transform::Affine {
                scale_x: [2.0, 2.0],
                scale_y: [2.0, 2.0],
                rotate: [0.0, 0.0],
            }],
            1,
        )]);
        let input = sample(vec![Region::new("a", 0.0, 0.0, 0.5, 0.5)]);
        let frames = preview(&input, &spec, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, "img_Zoom");
        assert_eq!(frames[0].regions_out_of_bounds(), 1);

        let rendered = frames[0].render();
        assert_ne!(rendered.as_raw(), frames[0].image.as_raw());
        assert!(rendered.pixels().any(|p| *p == PREVIEW_BOX_COLOR));

        let enforced = augment(&input, &spec, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(enforced[1].regions[0].is_within_bounds());
    }

    #[test]
    fn spec_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.json");
        std::fs::write(
            &path,
            r#"{"augmentations": [
                {"name": "FlipRotate", "transforms": [
                    {"type": "flip_horizontal", "p": 1.0},
                    {"type": "rotate", "degrees": [-15, 15]}
                ]}
            ]}"#,
        )
        .unwrap();
        let spec = AugmentationSpec::from_json_file(&path).unwrap();
        assert_eq!(spec.variant_count(), 1);
        assert_eq!(spec.augmentations[0].transforms.len(), 2);

        std::fs::write(
            &path,
            r#"{"augmentations": [{"name": "Bad", "transforms": [{"type": "crop", "min_fraction": 2.0}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            AugmentationSpec::from_json_file(&path),
            Err(Error::InvalidSpec(_))
        ));
    }
}
