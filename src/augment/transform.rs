use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_with, Interpolation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{clip_to_unit, Affine};
use super::photometric;
use crate::error::{Error, Result};
use crate::types::Region;

/// Closed parameter range `[lo, hi]`. `lo == hi` fixes the parameter.
pub type Range = [f32; 2];

fn half() -> f32 {
    0.5
}

/// One step of an augmentation chain.
///
/// Parameters are drawn from their ranges each time the step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Rotate about the image center by an angle in degrees.
    Rotate { degrees: Range },
    FlipHorizontal {
        #[serde(default = "half")]
        p: f32,
    },
    FlipVertical {
        #[serde(default = "half")]
        p: f32,
    },
    /// Scale each axis and rotate about the image center, keeping the image size.
    Affine {
        scale_x: Range,
        scale_y: Range,
        #[serde(default)]
        rotate: Range,
    },
    /// Cut a random window of at least `min_fraction` of each side and resize it back.
    Crop { min_fraction: f32 },
    Grayscale,
    GaussianBlur { sigma: Range },
    /// Per-pixel gaussian noise, `stddev` in 0-255 intensity units.
    AdditiveGaussianNoise { stddev: Range },
    /// Add a constant in 0-255 units; with probability `per_channel` each channel draws its own.
    Add {
        value: Range,
        #[serde(default)]
        per_channel: f32,
    },
    /// Hue shift in degrees and saturation shift as a fraction.
    HueSaturation { hue: Range, saturation: Range },
    Sharpen { alpha: Range, lightness: Range },
    /// Apply between `min` and `max` of `transforms`, chosen at random, in listed order.
    SomeOf {
        min: usize,
        max: usize,
        transforms: Vec<Transform>,
    },
}

/// What happens to regions after a geometric step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoxPolicy {
    /// Clip to the image and drop what falls outside.
    Enforce,
    /// Leave transformed regions as they are, for previews.
    Keep,
}

/// Image and regions flowing through a chain.
pub(crate) struct Canvas {
    pub image: RgbImage,
    pub regions: Vec<Region>,
    pub policy: BoxPolicy,
}

impl Canvas {
    /// Warp pixels and regions by the same pixel-space map. Output keeps the input size.
    fn warp(&mut self, forward: Affine) -> Result<()> {
        let inverse = forward
            .inverse()
            .ok_or_else(|| Error::InvalidSpec("degenerate geometric transform".to_string()))?;
        self.image = warp_with(
            &self.image,
            move |x, y| {
                let (sx, sy) = inverse.apply(x as f64, y as f64);
                (sx as f32, sy as f32)
            },
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        );
        let size = self.image.dimensions();
        self.map_regions(forward, size, size);
        Ok(())
    }

    fn map_regions(&mut self, forward: Affine, src: (u32, u32), dst: (u32, u32)) {
        let mapped = self
            .regions
            .iter()
            .map(|r| forward.map_region(r, src, dst));
        self.regions = match self.policy {
            BoxPolicy::Enforce => mapped.filter_map(|r| clip_to_unit(&r)).collect(),
            BoxPolicy::Keep => mapped.collect(),
        };
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, [lo, hi]: Range) -> f32 {
    if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        lo
    }
}

fn coin<R: Rng + ?Sized>(rng: &mut R, p: f32) -> bool {
    p > 0.0 && rng.random::<f32>() < p
}

fn check_range(name: &str, [lo, hi]: Range) -> Result<()> {
    if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(Error::InvalidSpec(format!(
            "{}: range [{}, {}] is not ordered",
            name, lo, hi
        )));
    }
    Ok(())
}

fn check_probability(name: &str, p: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidSpec(format!(
            "{}: probability {} is outside [0, 1]",
            name, p
        )));
    }
    Ok(())
}

impl Transform {
    /// True for transforms that move image content and therefore regions.
    pub fn is_geometric(&self) -> bool {
        match self {
            Transform::Rotate { .. }
            | Transform::FlipHorizontal { .. }
            | Transform::FlipVertical { .. }
            | Transform::Affine { .. }
            | Transform::Crop { .. } => true,
            Transform::SomeOf { transforms, .. } => transforms.iter().any(Transform::is_geometric),
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Transform::Rotate { degrees } => check_range("rotate.degrees", *degrees),
            Transform::FlipHorizontal { p } => check_probability("flip_horizontal.p", *p),
            Transform::FlipVertical { p } => check_probability("flip_vertical.p", *p),
            Transform::Affine {
                scale_x,
                scale_y,
                rotate,
            } => {
                check_range("affine.scale_x", *scale_x)?;
                check_range("affine.scale_y", *scale_y)?;
                check_range("affine.rotate", *rotate)?;
                if scale_x[0] <= 0.0 || scale_y[0] <= 0.0 {
                    return Err(Error::InvalidSpec("affine: scale must be positive".to_string()));
                }
                Ok(())
            }
            Transform::Crop { min_fraction } => {
                if *min_fraction > 0.0 && *min_fraction <= 1.0 {
                    Ok(())
                } else {
                    Err(Error::InvalidSpec(format!(
                        "crop.min_fraction {} is outside (0, 1]",
                        min_fraction
                    )))
                }
            }
            Transform::Grayscale => Ok(()),
            Transform::GaussianBlur { sigma } => {
                check_range("gaussian_blur.sigma", *sigma)?;
                if sigma[0] < 0.0 {
                    return Err(Error::InvalidSpec("gaussian_blur: negative sigma".to_string()));
                }
                Ok(())
            }
            Transform::AdditiveGaussianNoise { stddev } => {
                check_range("additive_gaussian_noise.stddev", *stddev)?;
                if stddev[0] < 0.0 {
                    return Err(Error::InvalidSpec(
                        "additive_gaussian_noise: negative stddev".to_string(),
                    ));
                }
                Ok(())
            }
            Transform::Add { value, per_channel } => {
                check_range("add.value", *value)?;
                check_probability("add.per_channel", *per_channel)
            }
            Transform::HueSaturation { hue, saturation } => {
                check_range("hue_saturation.hue", *hue)?;
                check_range("hue_saturation.saturation", *saturation)
            }
            Transform::Sharpen { alpha, lightness } => {
                check_range("sharpen.alpha", *alpha)?;
                check_range("sharpen.lightness", *lightness)?;
                if alpha[0] < 0.0 || alpha[1] > 1.0 {
                    return Err(Error::InvalidSpec("sharpen: alpha must lie in [0, 1]".to_string()));
                }
                Ok(())
            }
            Transform::SomeOf {
                min,
                max,
                transforms,
            } => {
                if min > max {
                    return Err(Error::InvalidSpec(format!(
                        "some_of: min {} is greater than max {}",
                        min, max
                    )));
                }
                transforms.iter().try_for_each(Transform::validate)
            }
        }
    }

    pub(crate) fn apply<R: Rng + ?Sized>(&self, canvas: &mut Canvas, rng: &mut R) -> Result<()> {
        let (w, h) = canvas.image.dimensions();
        let (wf, hf) = (w as f64, h as f64);

        match self {
            Transform::Rotate { degrees } => {
                let theta = (draw(rng, *degrees) as f64).to_radians();
                canvas.warp(Affine::about_center(Affine::rotate(theta), wf, hf))?;
            }
            Transform::FlipHorizontal { p } => {
                if coin(rng, *p) {
                    imageops::flip_horizontal_in_place(&mut canvas.image);
                    canvas.map_regions(Affine::flip_horizontal(wf), (w, h), (w, h));
                }
            }
            Transform::FlipVertical { p } => {
                if coin(rng, *p) {
                    imageops::flip_vertical_in_place(&mut canvas.image);
                    canvas.map_regions(Affine::flip_vertical(hf), (w, h), (w, h));
                }
            }
            Transform::Affine {
                scale_x,
                scale_y,
                rotate,
            } => {
                let sx = draw(rng, *scale_x) as f64;
                let sy = draw(rng, *scale_y) as f64;
                let theta = (draw(rng, *rotate) as f64).to_radians();
                let inner = Affine::scale(sx, sy).then(Affine::rotate(theta));
                canvas.warp(Affine::about_center(inner, wf, hf))?;
            }
            Transform::Crop { min_fraction } => {
                let fraction = draw(rng, [*min_fraction, 1.0]);
                let cw = ((w as f32 * fraction).round() as u32).clamp(1, w);
                let ch = ((h as f32 * fraction).round() as u32).clamp(1, h);
                let x0 = if w > cw { rng.random_range(0..=w - cw) } else { 0 };
                let y0 = if h > ch { rng.random_range(0..=h - ch) } else { 0 };

                let window = imageops::crop_imm(&canvas.image, x0, y0, cw, ch).to_image();
                canvas.image = imageops::resize(&window, w, h, FilterType::Triangle);
                let forward = Affine::translate(-(x0 as f64), -(y0 as f64))
                    .then(Affine::scale(wf / cw as f64, hf / ch as f64));
                canvas.map_regions(forward, (w, h), (w, h));
            }
            Transform::Grayscale => {
                canvas.image = photometric::grayscale(&canvas.image);
            }
            Transform::GaussianBlur { sigma } => {
                let sigma = draw(rng, *sigma);
                if sigma > 0.0 {
                    canvas.image = imageproc::filter::gaussian_blur_f32(&canvas.image, sigma);
                }
            }
            Transform::AdditiveGaussianNoise { stddev } => {
                let stddev = draw(rng, *stddev) as f64;
                let seed: u64 = rng.random();
                if stddev > 0.0 {
                    canvas.image = imageproc::noise::gaussian_noise(&canvas.image, 0.0, stddev, seed);
                }
            }
            Transform::Add { value, per_channel } => {
                let deltas = if coin(rng, *per_channel) {
                    [draw(rng, *value), draw(rng, *value), draw(rng, *value)]
                } else {
                    [draw(rng, *value); 3]
                };
                photometric::add(&mut canvas.image, deltas);
            }
            Transform::HueSaturation { hue, saturation } => {
                let hue = draw(rng, *hue);
                let saturation = draw(rng, *saturation);
                photometric::shift_hue_saturation(&mut canvas.image, hue, saturation);
            }
            Transform::Sharpen { alpha, lightness } => {
                let alpha = draw(rng, *alpha);
                let lightness = draw(rng, *lightness);
                canvas.image = photometric::sharpen(&canvas.image, alpha, lightness);
            }
            Transform::SomeOf {
                min,
                max,
                transforms,
            } => {
                let upper = (*max).min(transforms.len());
                let lower = (*min).min(upper);
                let count = if upper > lower {
                    rng.random_range(lower..=upper)
                } else {
                    lower
                };
                let mut picked = rand::seq::index::sample(rng, transforms.len(), count).into_vec();
                picked.sort_unstable();
                for i in picked {
                    transforms[i].apply(canvas, rng)?;
                }
            }
        }
        Ok(())
    }
}
