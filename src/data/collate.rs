use burn::prelude::*;
use image::imageops::FilterType;
use image::RgbImage;
use log::debug;
use rand::Rng;

use crate::data::dataset::Target;
use crate::data::error::DatasetError;

/// Multiscale resolution state, threaded explicitly through collation calls
/// by the training harness. Mutated only by [`collate`].
#[derive(Debug, Clone)]
pub struct ResizePolicy {
    img_size: u32,
    min_size: u32,
    max_size: u32,
    multiscale: bool,
    batch_count: u64,
}

impl ResizePolicy {
    pub fn new(base_img_size: u32, multiscale: bool) -> Self {
        Self {
            img_size: base_img_size,
            // floor at one stride so small bases cannot underflow to zero
            min_size: base_img_size.saturating_sub(3 * 32).max(32),
            max_size: base_img_size + 3 * 32,
            multiscale,
            batch_count: 0,
        }
    }

    /// Resolution the next sample reads and the next batch resize use.
    pub fn img_size(&self) -> u32 {
        self.img_size
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    /// Redraws the resolution every tenth batch from
    /// `{min_size, min_size + 32, ..., max_size}`.
    fn reroll<R: Rng>(&mut self, rng: &mut R) {
        if self.multiscale && self.batch_count % 10 == 0 {
            let steps = (self.max_size - self.min_size) / 32;
            self.img_size = self.min_size + 32 * rng.gen_range(0..=steps);
            debug!("multiscale: img_size -> {}", self.img_size);
        }
    }
}

/// One collated batch: stacked `N x 3 x S x S` images in `[0, 1]` and a flat
/// target list grouped by `Target::batch_index`.
#[derive(Debug)]
pub struct Batch<B: Backend> {
    pub paths: Vec<String>,
    pub images: Tensor<B, 4>,
    pub targets: Vec<Target>,
}

/// Flattens an image into CHW order, scaled to `[0, 1]`.
fn image_to_chw(img: &RgbImage, out: &mut Vec<f32>) {
    let (w, h) = img.dimensions();
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                out.push(img.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }
}

/// Merges samples into one batch. Samples with `None` targets carry no
/// annotation: their images are still stacked, but they contribute no
/// targets and do not consume a batch index. Retained samples get contiguous
/// batch indices in input order.
pub fn collate<B: Backend, R: Rng>(
    samples: Vec<(String, RgbImage, Option<Vec<Target>>)>,
    policy: &mut ResizePolicy,
    rng: &mut R,
    device: &B::Device,
) -> Result<Batch<B>, DatasetError> {
    let mut paths = Vec::with_capacity(samples.len());
    let mut images = Vec::with_capacity(samples.len());
    let mut targets = Vec::new();
    let mut retained = 0usize;

    for (path, image, boxes) in samples {
        if let Some(mut boxes) = boxes {
            for t in &mut boxes {
                t.batch_index = retained;
            }
            targets.extend(boxes);
            retained += 1;
        }
        paths.push(path);
        images.push(image);
    }

    if retained == 0 {
        return Err(DatasetError::EmptyBatch);
    }

    policy.reroll(rng);
    let size = policy.img_size();

    let n = images.len();
    let mut data = Vec::with_capacity(n * 3 * (size as usize) * (size as usize));
    for image in &images {
        let resized = image::imageops::resize(image, size, size, FilterType::CatmullRom);
        image_to_chw(&resized, &mut data);
    }

    let images = Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([
        n,
        3,
        size as usize,
        size as usize,
    ]);

    policy.batch_count += 1;

    Ok(Batch { paths, images, targets })
}
