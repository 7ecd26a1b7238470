pub mod data;

// Re-exports for convenience
pub use data::{
    collate, letterbox, mix_images, BBox, Batch, DatasetConfig, DatasetError, FlipAugment,
    ImageFolder, Letterboxed, MixupDataset, Preproc, ResizePolicy, Target,
};
