pub mod collate;
pub mod dataset;
pub mod error;
pub mod transforms;

pub use collate::{collate, Batch, ResizePolicy};
pub use dataset::{mix_images, BBox, DatasetConfig, ImageFolder, MixupDataset, Target};
pub use error::DatasetError;
pub use transforms::{letterbox, FlipAugment, Letterboxed, Preproc};
