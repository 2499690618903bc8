//! Compositing helpers shared by the effects
//!
//! Geometry is computed separately from drawing so that processors can work
//! it out once, in their constant data, and reuse it on every frame.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// Canvas size and draw origins for placing one image over another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayGeometry {
    pub width: u32,
    pub height: u32,
    pub base_origin: (i64, i64),
    pub overlay_origin: (i64, i64),
}

/// Work out where two images land when `overlay` is placed at `offset` on `base`
///
/// Without `expand` the canvas is the base image and the overlay is clipped
/// to it. With `expand` the canvas grows to hold both images whole, and the
/// origins shift so that nothing lands at a negative coordinate.
pub fn overlay_geometry(base: (u32, u32), overlay: (u32, u32), offset: (i64, i64), expand: bool) -> OverlayGeometry {
    if !expand {
        return OverlayGeometry {
            width: base.0,
            height: base.1,
            base_origin: (0, 0),
            overlay_origin: offset,
        };
    }

    let left = offset.0.min(0);
    let top = offset.1.min(0);
    let right = (base.0 as i64).max(offset.0 + overlay.0 as i64);
    let bottom = (base.1 as i64).max(offset.1 + overlay.1 as i64);

    OverlayGeometry {
        width: (right - left) as u32,
        height: (bottom - top) as u32,
        base_origin: (-left, -top),
        overlay_origin: (offset.0 - left, offset.1 - top),
    }
}

/// Which of the two images is drawn first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Base underneath, overlay on top
    OverlayOnTop,
    /// Overlay underneath, base on top (a frame sitting in a template's hole)
    BaseOnTop,
}

/// Draw both images onto a fresh canvas laid out by `geometry`
///
/// Uncovered canvas pixels take `fill`, or stay transparent.
pub fn overlay(
    base: &RgbaImage,
    top: &RgbaImage,
    geometry: &OverlayGeometry,
    layer: Layer,
    fill: Option<Rgba<u8>>,
) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(geometry.width, geometry.height, fill.unwrap_or(Rgba([0, 0, 0, 0])));
    let (bx, by) = geometry.base_origin;
    let (ox, oy) = geometry.overlay_origin;

    match layer {
        Layer::OverlayOnTop => {
            imageops::overlay(&mut canvas, base, bx, by);
            imageops::overlay(&mut canvas, top, ox, oy);
        }
        Layer::BaseOnTop => {
            imageops::overlay(&mut canvas, top, ox, oy);
            imageops::overlay(&mut canvas, base, bx, by);
        }
    }
    canvas
}

/// Size of the box that holds `size` rotated by `degrees`
pub fn rotated_bounds(size: (u32, u32), degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (size.0 as f64, size.1 as f64);
    let width = (w * cos.abs() + h * sin.abs()).round().max(1.0);
    let height = (w * sin.abs() + h * cos.abs()).round().max(1.0);
    (width as u32, height as u32)
}

/// Rotate clockwise about the image centre
///
/// The result is centred in a canvas of `size`, which defaults to the
/// rotated bounding box. Exposed corners take `fill`, or stay transparent.
pub fn rotate(image: &RgbaImage, degrees: f64, size: Option<(u32, u32)>, fill: Option<Rgba<u8>>) -> RgbaImage {
    let (out_w, out_h) = size.unwrap_or_else(|| rotated_bounds(image.dimensions(), degrees));
    let fill = fill.unwrap_or(Rgba([0, 0, 0, 0]));
    let mut canvas = RgbaImage::new(out_w, out_h);
    if out_w == 0 || out_h == 0 {
        return canvas;
    }

    let (src_w, src_h) = image.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (src_cx, src_cy) = (src_w as f64 / 2.0, src_h as f64 / 2.0);
    let (dst_cx, dst_cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    canvas
        .par_chunks_mut(out_w as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 + 0.5 - dst_cy;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let dx = x as f64 + 0.5 - dst_cx;
                // Inverse rotation back into source space
                let sx = dx * cos + dy * sin + src_cx;
                let sy = -dx * sin + dy * cos + src_cy;

                let value = if sx >= 0.0 && sy >= 0.0 && sx < src_w as f64 && sy < src_h as f64 {
                    *image.get_pixel(sx as u32, sy as u32)
                } else {
                    fill
                };
                pixel.copy_from_slice(&value.0);
            }
        });

    canvas
}

/// Stamp the opaque pixels of `mask` onto `target` as a solid `fill`
///
/// Both buffers are raw RGBA8 rows; `origin` places the mask's top-left
/// corner on the target and may be negative. Pixels outside the target are
/// skipped.
pub fn cutout(
    target: &mut [u8],
    target_width: u32,
    mask: &[u8],
    mask_width: u32,
    origin: (i64, i64),
    fill: [u8; 4],
) {
    if target_width == 0 || mask_width == 0 {
        return;
    }
    let target_height = (target.len() / 4 / target_width as usize) as i64;
    let mask_rows = mask.chunks_exact(mask_width as usize * 4);

    for (my, mask_row) in mask_rows.enumerate() {
        let ty = origin.1 + my as i64;
        if ty < 0 || ty >= target_height {
            continue;
        }
        for (mx, mask_pixel) in mask_row.chunks_exact(4).enumerate() {
            let tx = origin.0 + mx as i64;
            if mask_pixel[3] == 0 || tx < 0 || tx >= target_width as i64 {
                continue;
            }
            let start = (ty as usize * target_width as usize + tx as usize) * 4;
            target[start..start + 4].copy_from_slice(&fill);
        }
    }
}

/// Largest size with the aspect ratio of `size` that fits inside `bounds`
pub fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    if size.0 == 0 || size.1 == 0 {
        return (0, 0);
    }
    let scale = (bounds.0 as f64 / size.0 as f64).min(bounds.1 as f64 / size.1 as f64);
    (
        ((size.0 as f64 * scale).round() as u32).max(1),
        ((size.1 as f64 * scale).round() as u32).max(1),
    )
}

/// Resize to exactly `size`, returning the input untouched if it already matches
pub fn stretch(image: RgbaImage, size: (u32, u32)) -> RgbaImage {
    if image.dimensions() == size {
        return image;
    }
    imageops::resize(&image, size.0.max(1), size.1.max(1), FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    #[test]
    fn test_geometry_without_expansion_clips() {
        let g = overlay_geometry((10, 10), (4, 4), (8, -2), false);
        assert_eq!((g.width, g.height), (10, 10));
        assert_eq!(g.overlay_origin, (8, -2));
    }

    #[test]
    fn test_geometry_expands_both_ways() {
        let g = overlay_geometry((10, 10), (4, 4), (-3, 8), true);
        assert_eq!((g.width, g.height), (13, 12));
        assert_eq!(g.base_origin, (3, 0));
        assert_eq!(g.overlay_origin, (0, 8));
    }

    #[test]
    fn test_overlay_layers() {
        let base = RgbaImage::from_pixel(4, 4, RED);
        let top = RgbaImage::from_pixel(2, 2, BLUE);
        let g = overlay_geometry((4, 4), (2, 2), (1, 1), false);

        let over = overlay(&base, &top, &g, Layer::OverlayOnTop, None);
        assert_eq!(*over.get_pixel(1, 1), BLUE);
        assert_eq!(*over.get_pixel(0, 0), RED);

        let under = overlay(&base, &top, &g, Layer::BaseOnTop, None);
        assert_eq!(*under.get_pixel(1, 1), RED);
    }

    #[test]
    fn test_expanded_overlay_fills_gaps() {
        let base = RgbaImage::from_pixel(2, 2, RED);
        let top = RgbaImage::from_pixel(2, 2, BLUE);
        let g = overlay_geometry((2, 2), (2, 2), (2, 0), true);
        let white = Rgba([255, 255, 255, 255]);

        let out = overlay(&base, &top, &g, Layer::OverlayOnTop, Some(white));
        assert_eq!(out.dimensions(), (4, 2));
        assert_eq!(*out.get_pixel(0, 0), RED);
        assert_eq!(*out.get_pixel(3, 1), BLUE);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let mut image = RgbaImage::from_pixel(4, 2, BLUE);
        image.put_pixel(0, 0, RED);

        let rotated = rotate(&image, 90.0, None, None);
        assert_eq!(rotated.dimensions(), (2, 4));
        // Top-left corner ends up top-right after a clockwise turn
        assert_eq!(*rotated.get_pixel(1, 0), RED);
        assert_eq!(*rotated.get_pixel(0, 3), BLUE);
    }

    #[test]
    fn test_rotate_fills_exposed_corners() {
        let image = RgbaImage::from_pixel(10, 10, BLUE);
        let size = rotated_bounds((10, 10), 45.0);
        assert_eq!(size, (14, 14));

        let rotated = rotate(&image, 45.0, Some(size), Some(RED));
        assert_eq!(*rotated.get_pixel(0, 0), RED);
        assert_eq!(*rotated.get_pixel(7, 7), BLUE);
    }

    #[test]
    fn test_cutout_clips_to_target() {
        let mut target = RgbaImage::from_pixel(3, 3, BLUE);
        let mut mask = RgbaImage::new(2, 2);
        mask.put_pixel(0, 0, RED);
        mask.put_pixel(1, 1, RED);

        let width = target.width();
        cutout(&mut target, width, &mask, 2, (2, -1), [0, 255, 0, 255]);
        assert_eq!(*target.get_pixel(2, 0), BLUE);

        cutout(&mut target, width, &mask, 2, (1, 1), [0, 255, 0, 255]);
        assert_eq!(*target.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
        assert_eq!(*target.get_pixel(2, 2), Rgba([0, 255, 0, 255]));
        assert_eq!(*target.get_pixel(2, 1), BLUE);
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within((200, 100), (50, 50)), (50, 25));
        assert_eq!(fit_within((100, 400), (100, 100)), (25, 100));
        assert_eq!(fit_within((0, 10), (5, 5)), (0, 0));
    }
}
