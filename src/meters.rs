//! Running scalar statistics for the training and evaluation loops.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Tracks the latest value plus a running sum/count average.
///
/// Updates carry a weight so batch-level statistics aggregate by sample count
/// rather than by batch count.
#[derive(Debug, Clone, Default)]
pub struct AverageMeter {
    pub val: f32,
    pub sum: f32,
    pub count: f32,
    pub avg: f32,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self, val: f32, n: usize) {
        self.val = val;
        self.sum += val * n as f32;
        self.count += n as f32;
        self.avg = if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        };
    }
}

/// Top-k accuracy (percent) of `logits` `[N, C]` against `targets` `[N]`.
///
/// Returns one value per requested k, computed host-side.
pub fn accuracy<B: Backend>(
    logits: &Tensor<B, 2>,
    targets: &Tensor<B, 1, Int>,
    topk: &[usize],
) -> Vec<f32> {
    let [n, classes] = logits.dims();
    let scores = logits
        .to_data()
        .to_vec::<f32>()
        .unwrap_or_default();
    let labels: Vec<i64> = targets
        .to_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .unwrap_or_default();
    if scores.len() != n * classes || labels.len() != n || n == 0 {
        return vec![0.0; topk.len()];
    }

    let max_k = topk.iter().copied().max().unwrap_or(1).min(classes);
    let mut hits = vec![0usize; topk.len()];
    for (row, &label) in labels.iter().enumerate() {
        let row_scores = &scores[row * classes..(row + 1) * classes];
        let mut order: Vec<usize> = (0..classes).collect();
        order.sort_by(|a, b| {
            row_scores[*b]
                .partial_cmp(&row_scores[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top = &order[..max_k];
        for (slot, &k) in topk.iter().enumerate() {
            if top[..k.min(classes)].iter().any(|&c| c as i64 == label) {
                hits[slot] += 1;
            }
        }
    }

    topk.iter()
        .enumerate()
        .map(|(slot, _)| 100.0 * hits[slot] as f32 / n as f32)
        .collect()
}
