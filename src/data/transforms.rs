use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use rand::Rng;

use crate::data::dataset::Target;
use crate::data::error::DatasetError;

/// Result of an aspect-preserving resize. `scale` and the pads are what a
/// caller needs to remap box coordinates into the letterboxed frame.
#[derive(Debug)]
pub struct Letterboxed {
    pub image: RgbImage,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

/// Resize `img` to fit inside `target_w x target_h` without cropping, then
/// pad symmetrically with mid-gray. The output is always exactly the target
/// size.
pub fn letterbox(img: &RgbImage, target_w: u32, target_h: u32) -> Result<Letterboxed, DatasetError> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(DatasetError::InvalidImage {
            reason: format!("zero source dimension ({}x{})", w, h),
        });
    }

    let scale = (target_w as f32 / w as f32).min(target_h as f32 / h as f32);
    let new_w = (w as f32 * scale).round() as u32;
    let new_h = (h as f32 * scale).round() as u32;

    let resized = imageops::resize(img, new_w, new_h, FilterType::CatmullRom);

    let pad_x = (target_w - new_w) / 2;
    let pad_y = (target_h - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(target_w, target_h, Rgb([128, 128, 128]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Ok(Letterboxed { image: canvas, scale, pad_x, pad_y })
}

/// Per-sample preprocessing hook applied after mixing, injected at dataset
/// construction. Implementations get the composited image, its weighted
/// targets, and the (height, width) the training harness expects.
pub trait Preproc: Send + Sync {
    fn apply(
        &self,
        image: RgbImage,
        targets: Vec<Target>,
        input_size: (u32, u32),
    ) -> (RgbImage, Vec<Target>);
}

/// Horizontal flip with box remapping.
pub struct FlipAugment {
    probability: f64,
}

impl FlipAugment {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl Default for FlipAugment {
    fn default() -> Self {
        Self { probability: 0.5 }
    }
}

impl Preproc for FlipAugment {
    fn apply(
        &self,
        image: RgbImage,
        mut targets: Vec<Target>,
        _input_size: (u32, u32),
    ) -> (RgbImage, Vec<Target>) {
        if !rand::thread_rng().gen_bool(self.probability) {
            return (image, targets);
        }

        let width = image.width() as f32;
        let flipped = imageops::flip_horizontal(&image);
        for target in &mut targets {
            let (x1, x2) = (width - target.x2, width - target.x1);
            target.x1 = x1;
            target.x2 = x2;
        }

        (flipped, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_output_is_exactly_target_size() {
        let img = RgbImage::new(200, 100);
        let lb = letterbox(&img, 416, 416).unwrap();
        assert_eq!(lb.image.dimensions(), (416, 416));
    }

    #[test]
    fn letterbox_scale_and_pads_for_wide_image() {
        let img = RgbImage::new(200, 100);
        let lb = letterbox(&img, 416, 416).unwrap();
        assert_eq!(lb.scale, 416.0 / 200.0);
        assert_eq!(lb.pad_x, 0);
        // new_h = round(100 * 2.08) = 208, pad = (416 - 208) / 2
        assert_eq!(lb.pad_y, 104);
    }

    #[test]
    fn letterbox_fills_padding_with_gray() {
        let img = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let lb = letterbox(&img, 200, 100).unwrap();
        // pad_x = 50, so the left strip is untouched canvas
        assert_eq!(*lb.image.get_pixel(0, 50), Rgb([128, 128, 128]));
        assert_eq!(*lb.image.get_pixel(60, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn letterbox_rejects_zero_dimension() {
        let img = RgbImage::new(0, 100);
        assert!(matches!(
            letterbox(&img, 416, 416),
            Err(DatasetError::InvalidImage { .. })
        ));
    }

    #[test]
    fn flip_remaps_box_corners() {
        let image = RgbImage::new(100, 100);
        let targets = vec![Target {
            batch_index: 0,
            class_id: 3,
            x1: 10.0,
            y1: 20.0,
            x2: 30.0,
            y2: 40.0,
            weight: 1.0,
        }];

        let (_, flipped) = FlipAugment::new(1.0).apply(image, targets, (100, 100));
        assert_eq!(flipped[0].x1, 70.0);
        assert_eq!(flipped[0].x2, 90.0);
        assert_eq!(flipped[0].y1, 20.0);
        assert_eq!(flipped[0].y2, 40.0);
    }

    #[test]
    fn flip_with_zero_probability_is_identity() {
        let image = RgbImage::new(100, 100);
        let targets = vec![Target {
            batch_index: 0,
            class_id: 0,
            x1: 10.0,
            y1: 20.0,
            x2: 30.0,
            y2: 40.0,
            weight: 1.0,
        }];

        let (_, out) = FlipAugment::new(0.0).apply(image, targets.clone(), (100, 100));
        assert_eq!(out, targets);
    }
}
