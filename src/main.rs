use burn::backend::NdArray;
use burn::prelude::*;

use yolo_mixup_data::{collate, DatasetConfig, FlipAugment, MixupDataset, ResizePolicy};

type BackendType = NdArray;
type DeviceType = <BackendType as Backend>::Device;

const BATCH_SIZE: usize = 8;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DatasetConfig::from_yaml(&path)?,
        None => DatasetConfig::default(),
    };
    log::info!("dataset config: {:?}", config);

    let mut dataset = MixupDataset::new(&config)?;
    if dataset.augment() {
        dataset = dataset.with_preproc(Box::new(FlipAugment::default()));
    }

    let mut policy = ResizePolicy::new(config.img_size, config.multiscale);
    let mut rng = rand::thread_rng();
    let device = DeviceType::default();

    for batch_start in (0..dataset.len()).step_by(BATCH_SIZE) {
        let img_size = policy.img_size();
        let batch_end = (batch_start + BATCH_SIZE).min(dataset.len());

        let mut samples = Vec::with_capacity(batch_end - batch_start);
        for idx in batch_start..batch_end {
            let path = dataset.entry_path(idx).to_string();
            let (image, targets) = dataset.training_example(idx, img_size, &mut rng)?;
            samples.push((path, image, Some(targets)));
        }

        let batch = collate::<BackendType, _>(samples, &mut policy, &mut rng, &device)?;
        log::info!(
            "batch {}: images {:?}, {} targets",
            policy.batch_count(),
            batch.images.dims(),
            batch.targets.len()
        );
    }

    Ok(())
}
