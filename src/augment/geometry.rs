//! Pixel-space affine maps shared by the image warp and the box update.

use crate::types::Region;

/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f`, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Affine {
    pub fn identity() -> Self {
        Self::scale(1.0, 1.0)
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: tx,
            d: 0.0,
            e: 1.0,
            f: ty,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: sy,
            f: 0.0,
        }
    }

    /// Rotation by `theta` radians. With y pointing down this turns clockwise.
    pub fn rotate(theta: f64) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self {
            a: cos,
            b: -sin,
            c: 0.0,
            d: sin,
            e: cos,
            f: 0.0,
        }
    }

    /// Mirror across the vertical center line of an image `width` pixels wide.
    pub fn flip_horizontal(width: f64) -> Self {
        Self::scale(-1.0, 1.0).then(Self::translate(width, 0.0))
    }

    pub fn flip_vertical(height: f64) -> Self {
        Self::scale(1.0, -1.0).then(Self::translate(0.0, height))
    }

    /// Conjugate `inner` so it acts around the center of a `width` x `height` image.
    pub fn about_center(inner: Affine, width: f64, height: f64) -> Self {
        let (cx, cy) = (width / 2.0, height / 2.0);
        Self::translate(-cx, -cy)
            .then(inner)
            .then(Self::translate(cx, cy))
    }

    /// Apply `self` first, then `next`.
    pub fn then(self, next: Affine) -> Self {
        Self {
            a: next.a * self.a + next.b * self.d,
            b: next.a * self.b + next.b * self.e,
            c: next.a * self.c + next.b * self.f + next.c,
            d: next.d * self.a + next.e * self.d,
            e: next.d * self.b + next.e * self.e,
            f: next.d * self.c + next.e * self.f + next.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < 1e-12 {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// Map a region from a `src` sized image into a `dst` sized image.
    ///
    /// All four corners are transformed and the axis-aligned hull is kept, so
    /// a rotated box grows to keep enclosing its object. No clipping happens here.
    pub fn map_region(&self, region: &Region, src: (u32, u32), dst: (u32, u32)) -> Region {
        let (sw, sh) = (src.0 as f64, src.1 as f64);
        let (dw, dh) = (dst.0 as f64, dst.1 as f64);
        let (x0, y0) = (region.left * sw, region.top * sh);
        let (x1, y1) = (region.right() * sw, region.bottom() * sh);

        let corners = [
            self.apply(x0, y0),
            self.apply(x1, y0),
            self.apply(x1, y1),
            self.apply(x0, y1),
        ];
        let (min_x, min_y, max_x, max_y) = corners.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        );

        Region::new(
            region.tag.clone(),
            min_x / dw,
            min_y / dh,
            (max_x - min_x) / dw,
            (max_y - min_y) / dh,
        )
    }
}

/// Smallest width or height kept after clipping. Anything thinner would be
/// written as a zero-size box by the six-decimal label format.
pub const MIN_EXTENT: f64 = 1e-6;

/// Clip a region to the unit square.
///
/// Returns `None` when less than [`MIN_EXTENT`] is left in either direction,
/// which covers regions entirely outside the image as well as degenerate ones.
pub fn clip_to_unit(region: &Region) -> Option<Region> {
    let left = region.left.clamp(0.0, 1.0);
    let top = region.top.clamp(0.0, 1.0);
    let right = region.right().clamp(0.0, 1.0);
    let bottom = region.bottom().clamp(0.0, 1.0);

    let width = right - left;
    let height = bottom - top;
    if !(width >= MIN_EXTENT && height >= MIN_EXTENT) {
        return None;
    }
    Some(Region::new(
        region.tag.clone(),
        left,
        top,
        width.min(1.0 - left),
        height.min(1.0 - top),
    ))
}
