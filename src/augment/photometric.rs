//! Pixel-only operations. None of these move content, so regions are untouched.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::filter::filter3x3;

pub fn grayscale(img: &RgbImage) -> RgbImage {
    DynamicImage::ImageLuma8(image::imageops::grayscale(img)).to_rgb8()
}

/// Add a constant to every channel; `deltas` holds one value per channel.
pub fn add(img: &mut RgbImage, deltas: [f32; 3]) {
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] as f32 + deltas[c]).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Shift hue by `hue_degrees` and saturation by `saturation` (fraction of full scale).
pub fn shift_hue_saturation(img: &mut RgbImage, hue_degrees: f32, saturation: f32) {
    for pixel in img.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(*pixel);
        let h = (h + hue_degrees).rem_euclid(360.0);
        let s = (s + saturation).clamp(0.0, 1.0);
        *pixel = hsv_to_rgb(h, s, v);
    }
}

/// Blend between the image and a sharpened copy.
///
/// The sharpening kernel is the 8-neighbour Laplacian with center `8 + lightness`;
/// `alpha` selects how much of it is mixed in.
pub fn sharpen(img: &RgbImage, alpha: f32, lightness: f32) -> RgbImage {
    let center = (1.0 - alpha) + alpha * (8.0 + lightness);
    let n = -alpha;
    let kernel = [n, n, n, n, center, n, n, n, n];
    filter3x3::<Rgb<u8>, f32, u8>(img, &kernel)
}

fn rgb_to_hsv(pixel: Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    Rgb([r, g, b].map(|ch| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_round_trip_is_lossless_enough() {
        for rgb in [[255, 0, 0], [12, 200, 99], [128, 128, 128], [0, 0, 0], [3, 7, 250]] {
            let (h, s, v) = rgb_to_hsv(Rgb(rgb));
            let back = hsv_to_rgb(h, s, v);
            for c in 0..3 {
                assert!((back[c] as i32 - rgb[c] as i32).abs() <= 1, "{:?} -> {:?}", rgb, back);
            }
        }
    }

    #[test]
    fn add_saturates() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([250, 5, 100]));
        add(&mut img, [10.0, -10.0, 0.0]);
        assert_eq!(*img.get_pixel(0, 0), Rgb([255, 0, 100]));
    }

    #[test]
    fn sharpen_keeps_flat_regions() {
        let img = RgbImage::from_pixel(5, 5, Rgb([90, 90, 90]));
        let out = sharpen(&img, 1.0, 1.0);
        assert_eq!(*out.get_pixel(2, 2), Rgb([90, 90, 90]));
    }

    #[test]
    fn sharpen_raises_edge_contrast() {
        let img = RgbImage::from_fn(6, 3, |x, _| if x < 3 { Rgb([80, 80, 80]) } else { Rgb([160, 160, 160]) });
        let out = sharpen(&img, 1.0, 1.0);
        assert!(out.get_pixel(2, 1)[0] < 80);
        assert!(out.get_pixel(3, 1)[0] > 160);
        assert_eq!(*out.get_pixel(0, 1), Rgb([80, 80, 80]));

        let unchanged = sharpen(&img, 0.0, 1.0);
        assert_eq!(unchanged, img);
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let img = RgbImage::from_pixel(1, 1, Rgb([200, 10, 30]));
        let gray = grayscale(&img);
        let p = gray.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }
}
