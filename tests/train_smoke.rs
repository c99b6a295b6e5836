use anyhow::Result;
use burn::backend::autodiff::Autodiff;
use burn::backend::ndarray::NdArray;
use domain_adapt::{
    run_ajan, run_jan, BatchIter, Classify, DatasetConfig, DomainPair, SampleSpec, TrainSettings,
    Variant,
};
use tempfile::tempdir;

type ADBackend = Autodiff<NdArray<f32>>;

fn synthetic_samples(count: usize, offset: f32) -> Vec<SampleSpec> {
    (0..count)
        .map(|i| {
            let value = offset + i as f32 / count as f32;
            SampleSpec::memory(vec![value; 3 * 8 * 8], 8, 8, i % 2)
        })
        .collect()
}

fn cfg(seed: u64) -> DatasetConfig {
    DatasetConfig {
        shuffle: true,
        flip_horizontal_prob: 0.0,
        random_crop: false,
        seed: Some(seed),
        ..Default::default()
    }
}

fn settings(variant: Variant, results_dir: std::path::PathBuf) -> TrainSettings {
    TrainSettings {
        arch: "resnet-lite".into(),
        variant,
        classes: 2,
        bottleneck: 8,
        batch_size: 4,
        eval_batch_size: 4,
        train_iter: 2,
        test_iter: 0,
        print_freq: 1,
        u_refresh_freq: 1,
        model_name: "smoke".into(),
        results_dir,
        ..Default::default()
    }
}

#[test]
fn jan_steps_without_diverging() -> Result<()> {
    let temp = tempdir()?;
    let device = Default::default();
    let mut streams = DomainPair::new(
        BatchIter::new(synthetic_samples(8, 0.0), cfg(11)),
        BatchIter::new(synthetic_samples(8, 0.5), cfg(12)),
        4,
    );
    let mut val_source = BatchIter::new(synthetic_samples(8, 0.0), cfg(13).eval());
    let mut val_target = BatchIter::new(synthetic_samples(8, 0.5), cfg(14).eval());

    let settings = settings(Variant::Jan, temp.path().to_path_buf());
    let model = run_jan::<ADBackend>(
        &settings,
        &mut streams,
        &mut val_source,
        &mut val_target,
        &device,
    )?;
    assert_eq!(model.num_classes(), 2);
    assert!(temp.path().join("smoke/settings.json").exists());

    // The trained parameters must still produce finite scores.
    val_target.reset();
    let batch = val_target
        .next_batch::<ADBackend>(4, &device)?
        .expect("validation batch");
    let (logits, _) = model.forward(batch.images);
    let values = logits.into_data().to_vec::<f32>().expect("logits");
    assert!(values.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn ajan_steps_without_diverging() -> Result<()> {
    let temp = tempdir()?;
    let device = Default::default();
    let mut streams = DomainPair::new(
        BatchIter::new(synthetic_samples(8, 0.0), cfg(21)),
        BatchIter::new(synthetic_samples(8, 0.5), cfg(22)),
        4,
    );
    let mut val_target = BatchIter::new(synthetic_samples(8, 0.5), cfg(23).eval());

    let settings = settings(Variant::Ajan, temp.path().to_path_buf());
    let model = run_ajan::<ADBackend>(&settings, &mut streams, &mut val_target, &device)?;
    assert_eq!(model.num_classes(), 2);
    assert!(temp.path().join("smoke/settings.json").exists());

    val_target.reset();
    let batch = val_target
        .next_batch::<ADBackend>(4, &device)?
        .expect("validation batch");
    let (logits, _) = model.forward(batch.images);
    let values = logits.into_data().to_vec::<f32>().expect("logits");
    assert!(values.iter().all(|v| v.is_finite()));
    Ok(())
}
