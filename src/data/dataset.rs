use anyhow::Result;
use image::imageops::FilterType;
use image::RgbImage;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::data::error::DatasetError;
use crate::data::transforms::{letterbox, Preproc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Text file with one `<image_path> <x1,y1,x2,y2,class>*` line per sample.
    pub list_path: String,
    pub img_size: u32,
    pub augment: bool,
    pub multiscale: bool,
    /// Reserved for preproc implementations; the mixing/collation core does
    /// not consume it.
    pub normalized_labels: bool,
    /// Beta(a, b) parameters for the mixing coefficient. `None` disables
    /// mixing entirely.
    pub beta: Option<(f32, f32)>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            list_path: "data/train.txt".to_string(),
            img_size: 416,
            augment: true,
            multiscale: true,
            normalized_labels: true,
            beta: Some((1.5, 1.5)),
        }
    }
}

impl DatasetConfig {
    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DatasetConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// Axis-aligned box in the coordinate space of the letterboxed image.
#[derive(Debug, Clone, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
}

/// A box carrying its mixing weight and, after collation, the index of the
/// sample it belongs to within the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub batch_index: usize,
    pub class_id: usize,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub weight: f32,
}

impl Target {
    fn weighted(b: &BBox, weight: f32) -> Self {
        Self {
            batch_index: 0,
            class_id: b.class_id,
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            weight,
        }
    }
}

/// Splits an annotation line into `(image_path, box_segment)` at the first
/// space followed by a digit. Paths containing spaces survive as long as
/// the character after the space is not a digit.
fn split_annotation(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b' ' && bytes[i + 1].is_ascii_digit() {
            return (&line[..i], Some(&line[i + 1..]));
        }
    }
    (line, None)
}

/// Parses `x1,y1,x2,y2,class` fields separated by spaces.
fn parse_boxes(segment: &str) -> Result<Vec<BBox>, DatasetError> {
    let mut boxes = Vec::new();
    for field in segment.split(' ').filter(|f| !f.is_empty()) {
        let parse = |v: &str| {
            v.parse::<i32>().map_err(|e| DatasetError::AnnotationParse {
                field: field.to_string(),
                reason: e.to_string(),
            })
        };
        let parts: Vec<i32> = field.split(',').map(|v| parse(v)).collect::<Result<_, _>>()?;
        if parts.len() != 5 || parts[4] < 0 {
            return Err(DatasetError::AnnotationParse {
                field: field.to_string(),
                reason: "expected x1,y1,x2,y2,class".to_string(),
            });
        }
        boxes.push(BBox {
            x1: parts[0] as f32,
            y1: parts[1] as f32,
            x2: parts[2] as f32,
            y2: parts[3] as f32,
            class_id: parts[4] as usize,
        });
    }
    Ok(boxes)
}

/// Training dataset with mixup augmentation over a list-file of annotated
/// images. Every random draw goes through the caller-supplied rng, so a
/// seeded `StdRng` makes the whole pipeline reproducible.
pub struct MixupDataset {
    entries: Vec<String>,
    augment: bool,
    normalized_labels: bool,
    mix_beta: Option<Beta<f32>>,
    preproc: Option<Box<dyn Preproc>>,
}

impl MixupDataset {
    pub fn new(config: &DatasetConfig) -> Result<Self> {
        let content = std::fs::read_to_string(&config.list_path)?;
        let entries: Vec<String> = content
            .lines()
            .map(|l| l.trim_end().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        anyhow::ensure!(!entries.is_empty(), "no samples listed in {}", config.list_path);

        let mix_beta = match config.beta {
            Some((a, b)) => Some(
                Beta::new(a, b).map_err(|e| anyhow::anyhow!("invalid beta parameters: {e}"))?,
            ),
            None => None,
        };

        Ok(Self {
            entries,
            augment: config.augment,
            normalized_labels: config.normalized_labels,
            mix_beta,
            preproc: None,
        })
    }

    pub fn with_preproc(mut self, preproc: Box<dyn Preproc>) -> Self {
        self.preproc = Some(preproc);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn augment(&self) -> bool {
        self.augment
    }

    pub fn normalized_labels(&self) -> bool {
        self.normalized_labels
    }

    /// Image path of the list entry backing `index`.
    pub fn entry_path(&self, index: usize) -> &str {
        split_annotation(&self.entries[index % self.entries.len()]).0
    }

    /// Reads one annotated sample: decode to RGB, letterbox to
    /// `img_size x img_size`, remap box corners into the letterboxed frame,
    /// and shuffle box order. An empty box list is a valid sample.
    pub fn read_sample<R: Rng>(
        &self,
        index: usize,
        img_size: u32,
        rng: &mut R,
    ) -> Result<(RgbImage, Vec<BBox>), DatasetError> {
        let line = &self.entries[index % self.entries.len()];
        let (path, box_segment) = split_annotation(line);

        let img = image::open(path)
            .map_err(|e| DatasetError::InvalidImage {
                reason: format!("{}: {}", path, e),
            })?
            .to_rgb8();
        let lb = letterbox(&img, img_size, img_size)?;

        let mut boxes = match box_segment {
            Some(segment) => parse_boxes(segment)?,
            None => Vec::new(),
        };
        boxes.shuffle(rng);
        for b in &mut boxes {
            b.x1 = b.x1 * lb.scale + lb.pad_x as f32;
            b.x2 = b.x2 * lb.scale + lb.pad_x as f32;
            b.y1 = b.y1 * lb.scale + lb.pad_y as f32;
            b.y2 = b.y2 * lb.scale + lb.pad_y as f32;
        }

        Ok((lb.image, boxes))
    }

    /// Produces one training example. With mixing enabled, a Beta-drawn
    /// coefficient decides between passing the sample through (box weight
    /// 1.0, no second read) and alpha-blending it with a second, distinct
    /// sample whose boxes get the complementary weight.
    pub fn training_example<R: Rng>(
        &self,
        index: usize,
        img_size: u32,
        rng: &mut R,
    ) -> Result<(RgbImage, Vec<Target>), DatasetError> {
        let (img1, box1) = self.read_sample(index, img_size, rng)?;

        let lambda = match &self.mix_beta {
            Some(beta) => beta.sample(rng).clamp(0.0, 1.0),
            None => 1.0,
        };

        if lambda >= 1.0 || self.entries.len() < 2 {
            let targets = box1.iter().map(|b| Target::weighted(b, 1.0)).collect();
            return Ok(self.run_preproc(img1, targets, img_size));
        }

        let index2 = exclude_index(rng.gen_range(0..self.entries.len() - 1), index % self.entries.len());
        let (img2, box2) = self.read_sample(index2, img_size, rng)?;

        let mixed = mix_images(&img1, &img2, lambda);
        let mut targets: Vec<Target> = box1.iter().map(|b| Target::weighted(b, lambda)).collect();
        targets.extend(box2.iter().map(|b| Target::weighted(b, 1.0 - lambda)));

        Ok(self.run_preproc(mixed, targets, img_size))
    }

    fn run_preproc(
        &self,
        image: RgbImage,
        targets: Vec<Target>,
        img_size: u32,
    ) -> (RgbImage, Vec<Target>) {
        match &self.preproc {
            Some(preproc) => preproc.apply(image, targets, (img_size, img_size)),
            None => (image, targets),
        }
    }
}

/// Maps a draw from `[0, len - 1)` to `[0, len)` with `skip` removed.
fn exclude_index(draw: usize, skip: usize) -> usize {
    if draw >= skip {
        draw + 1
    } else {
        draw
    }
}

/// Alpha-blend two images onto a canvas sized to the pixel-wise maximum of
/// their dimensions. Where only one image reaches, the canvas receives that
/// image's weighted contribution alone. Box coordinates are deliberately
/// left untouched by this step.
pub fn mix_images(img1: &RgbImage, img2: &RgbImage, lambda: f32) -> RgbImage {
    let width = img1.width().max(img2.width());
    let height = img1.height().max(img2.height());

    let mut canvas = RgbImage::new(width, height);
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        for c in 0..3 {
            let mut value = 0.0f32;
            if x < img1.width() && y < img1.height() {
                value += img1.get_pixel(x, y)[c] as f32 * lambda;
            }
            if x < img2.width() && y < img2.height() {
                value += img2.get_pixel(x, y)[c] as f32 * (1.0 - lambda);
            }
            pixel[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    canvas
}

/// Sorted listing of the images directly under a folder, resized to a fixed
/// square size on access. Used for annotation-free inference input.
pub struct ImageFolder {
    files: Vec<PathBuf>,
    img_size: u32,
}

impl ImageFolder {
    pub fn new(folder: &Path, img_size: u32) -> Result<Self> {
        let mut files: Vec<PathBuf> = WalkDir::new(folder)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()).map(|s| s.to_lowercase()).as_deref(),
                        Some("jpg" | "jpeg" | "png")
                    )
            })
            .collect();
        files.sort();

        anyhow::ensure!(!files.is_empty(), "no images found under {}", folder.display());

        Ok(Self { files, img_size })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<(PathBuf, RgbImage), DatasetError> {
        let path = &self.files[index % self.files.len()];
        let img = image::open(path)
            .map_err(|e| DatasetError::InvalidImage {
                reason: format!("{}: {}", path.display(), e),
            })?
            .resize_exact(self.img_size, self.img_size, FilterType::CatmullRom)
            .to_rgb8();
        Ok((path.clone(), img))
    }
}
