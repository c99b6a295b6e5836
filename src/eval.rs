//! Single-pass evaluation over a held-out stream.

use anyhow::{anyhow, Result};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use ndarray::{Array1, Array2};

use crate::data::BatchIter;
use crate::meters::{accuracy, AverageMeter};
use crate::model::Classify;
use crate::results::SaveData;

/// Whether to keep per-sample arrays for downstream inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Metrics,
    CollectFeatures,
}

/// Aggregated evaluation results; arrays are present in
/// [`EvalMode::CollectFeatures`] only.
pub struct EvalOutput {
    pub top1: f32,
    pub top5: f32,
    pub loss: f32,
    pub count: usize,
    pub features: Option<Array2<f32>>,
    pub predictions: Option<Array2<f32>>,
    pub labels: Option<Array1<i64>>,
}

impl EvalOutput {
    /// Package the collected arrays for persistence. `None` when the pass
    /// ran in [`EvalMode::Metrics`].
    pub fn into_savedata(self) -> Option<SaveData> {
        Some(SaveData {
            features: self.features?,
            predictions: self.predictions?,
            labels: self.labels?,
        })
    }
}

/// Run the model over the whole stream once, without parameter updates.
///
/// Accuracy and loss are weighted by batch size, so a short final batch
/// contributes proportionally. Callers pass an inference-mode model (the
/// `valid()` form of an autodiff module); no gradients are recorded.
pub fn validate<B: Backend, M: Classify<B>>(
    model: &M,
    loader: &mut BatchIter,
    batch_size: usize,
    mode: EvalMode,
    device: &B::Device,
) -> Result<EvalOutput> {
    let criterion = CrossEntropyLossConfig::new().init(device);
    let mut losses = AverageMeter::new();
    let mut top1 = AverageMeter::new();
    let mut top5 = AverageMeter::new();

    let mut feat_buf: Vec<f32> = Vec::new();
    let mut pred_buf: Vec<f32> = Vec::new();
    let mut label_buf: Vec<i64> = Vec::new();
    let mut feat_dim = 0usize;
    let mut pred_dim = 0usize;

    loader.reset();
    while let Some(batch) = loader.next_batch::<B>(batch_size, device)? {
        let (logits, features) = model.forward(batch.images.clone());
        let loss = criterion.forward(logits.clone(), batch.targets.clone());
        let loss_val = loss
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("failed to read loss: {e:?}"))?
            .first()
            .copied()
            .unwrap_or(f32::NAN);

        let prec = accuracy(&logits, &batch.targets, &[1, 5]);
        losses.update(loss_val, batch.size);
        top1.update(prec[0], batch.size);
        top5.update(prec[1], batch.size);

        if mode == EvalMode::CollectFeatures {
            feat_dim = features.dims()[1];
            pred_dim = logits.dims()[1];
            let probs = softmax(logits, 1);
            feat_buf.extend(
                features
                    .into_data()
                    .to_vec::<f32>()
                    .map_err(|e| anyhow!("failed to read features: {e:?}"))?,
            );
            pred_buf.extend(
                probs
                    .into_data()
                    .to_vec::<f32>()
                    .map_err(|e| anyhow!("failed to read predictions: {e:?}"))?,
            );
            label_buf.extend(
                batch
                    .targets
                    .into_data()
                    .convert::<i64>()
                    .to_vec::<i64>()
                    .map_err(|e| anyhow!("failed to read labels: {e:?}"))?,
            );
        }
    }

    let count = losses.count as usize;
    println!(" * Prec@1 {:.3} Prec@5 {:.3}", top1.avg, top5.avg);

    let (features, predictions, labels) = if mode == EvalMode::CollectFeatures {
        let features = Array2::from_shape_vec((count, feat_dim), feat_buf)
            .map_err(|e| anyhow!("feature array shape mismatch: {e}"))?;
        let predictions = Array2::from_shape_vec((count, pred_dim), pred_buf)
            .map_err(|e| anyhow!("prediction array shape mismatch: {e}"))?;
        (Some(features), Some(predictions), Some(Array1::from(label_buf)))
    } else {
        (None, None, None)
    };

    Ok(EvalOutput {
        top1: top1.avg,
        top5: top5.avg,
        loss: losses.avg,
        count,
        features,
        predictions,
        labels,
    })
}
