//! Aspect-preserving resize into a square model input.

use crate::types::Landmark;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Placement of a source image inside a square model input.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    src_width: f32,
    src_height: f32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((target as f32 - new_w) / 2.0).floor(),
            pad_y: ((target as f32 - new_h) / 2.0).floor(),
            src_width: width as f32,
            src_height: height as f32,
        }
    }

    /// Resize `image` into a `target`-sided square filled with `pad`.
    pub fn render(image: &RgbImage, target: u32, pad: u8) -> (RgbImage, Self) {
        let lb = Self::fit(image.width(), image.height(), target);
        let new_w = ((image.width() as f32 * lb.scale).round() as u32).clamp(1, target);
        let new_h = ((image.height() as f32 * lb.scale).round() as u32).clamp(1, target);
        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let mut canvas = RgbImage::from_pixel(target, target, Rgb([pad; 3]));
        imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);
        (canvas, lb)
    }

    /// Model-input pixel position → source pixel position.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    /// Model-input pixel position → normalized source coordinates.
    pub fn to_normalized(&self, x: f32, y: f32) -> Landmark {
        let (sx, sy) = self.to_source(x, y);
        Landmark {
            x: (sx / self.src_width).clamp(0.0, 1.0),
            y: (sy / self.src_height).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_maps_back_to_normalized() {
        let lb = Letterbox::fit(640, 320, 192);
        let center = lb.to_normalized(96.0, 96.0);
        assert!((center.x - 0.5).abs() < 1e-4, "x = {}", center.x);
        assert!((center.y - 0.5).abs() < 1e-4, "y = {}", center.y);

        let origin = lb.to_normalized(0.0, 48.0);
        assert!(origin.x.abs() < 1e-6);
        assert!(origin.y.abs() < 1e-6);
    }

    #[test]
    fn test_to_source_inverts_scale_and_padding() {
        let lb = Letterbox::fit(320, 240, 640);
        assert_eq!(lb.scale, 2.0);
        assert_eq!(lb.pad_y, 80.0);
        let (x, y) = lb.to_source(200.0, 180.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_render_pads_short_axis() {
        let image = RgbImage::from_pixel(640, 320, Rgb([255, 255, 255]));
        let (canvas, lb) = Letterbox::render(&image, 192, 0);
        assert_eq!(canvas.dimensions(), (192, 192));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 48.0);
        assert_eq!(canvas.get_pixel(96, 0).0, [0, 0, 0]);
        assert_eq!(canvas.get_pixel(96, 96).0, [255, 255, 255]);
    }
}
