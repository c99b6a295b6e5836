use anyhow::Result;
use approx::assert_relative_eq;
use burn::backend::ndarray::NdArray;
use burn::tensor::backend::Backend as BackendTrait;
use burn::tensor::{Tensor, TensorData};
use domain_adapt::{validate, BatchIter, Classify, DatasetConfig, EvalMode, SampleSpec};

type Backend = NdArray<f32>;

/// Predicts class 0 for every sample, with a two-value embedding.
struct ConstantPredictor;

impl<B: BackendTrait> Classify<B> for ConstantPredictor {
    fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let n = images.dims()[0];
        let device = images.device();
        let mut logits = Vec::with_capacity(n * 2);
        for _ in 0..n {
            logits.extend_from_slice(&[2.0f32, -2.0]);
        }
        let logits = Tensor::from_floats(TensorData::new(logits, [n, 2]), &device);
        let features = Tensor::zeros([n, 3], &device);
        (logits, features)
    }

    fn num_classes(&self) -> usize {
        2
    }
}

fn labeled_samples(labels: &[usize]) -> Vec<SampleSpec> {
    labels
        .iter()
        .map(|&label| SampleSpec::memory(vec![0.5; 3 * 4 * 4], 4, 4, label))
        .collect()
}

fn eval_cfg() -> DatasetConfig {
    DatasetConfig {
        shuffle: false,
        flip_horizontal_prob: 0.0,
        random_crop: false,
        seed: Some(1),
        ..Default::default()
    }
}

#[test]
fn accuracy_is_weighted_by_batch_size() -> Result<()> {
    let device = Default::default();
    // Ten samples, seven of class 0, ordered so the per-batch accuracies
    // are 100, 75 and 0. The unweighted mean would be 58.3; the
    // sample-weighted mean is exactly 70.
    let labels = [0, 0, 0, 0, 0, 0, 0, 1, 1, 1];
    let mut loader = BatchIter::new(labeled_samples(&labels), eval_cfg());
    let out = validate::<Backend, _>(
        &ConstantPredictor,
        &mut loader,
        4,
        EvalMode::Metrics,
        &device,
    )?;
    assert_eq!(out.count, 10);
    assert_relative_eq!(out.top1, 70.0, epsilon = 1e-4);
    assert!(out.loss.is_finite());
    Ok(())
}

#[test]
fn collect_mode_stacks_ragged_batches() -> Result<()> {
    let device = Default::default();
    let labels = [0, 1, 0, 1, 1, 0, 1];
    let mut loader = BatchIter::new(labeled_samples(&labels), eval_cfg());
    let out = validate::<Backend, _>(
        &ConstantPredictor,
        &mut loader,
        3,
        EvalMode::CollectFeatures,
        &device,
    )?;

    let features = out.features.expect("features collected");
    let predictions = out.predictions.expect("predictions collected");
    let collected = out.labels.expect("labels collected");
    assert_eq!(features.dim(), (7, 3));
    assert_eq!(predictions.dim(), (7, 2));
    assert_eq!(collected.len(), 7);
    let stored: Vec<i64> = collected.iter().copied().collect();
    let expected: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
    assert_eq!(stored, expected);

    // Softmax rows sum to one.
    for row in predictions.rows() {
        let total: f32 = row.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-4);
    }
    Ok(())
}
