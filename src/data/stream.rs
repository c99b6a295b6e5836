//! Restartable batch iteration and source/target stream pairing.

use anyhow::{bail, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::dataset::{DatasetConfig, SampleSpec};

/// A fixed-size batch of images `[N, 3, H, W]` with class targets `[N]`.
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
    pub size: usize,
}

/// Ordered, restartable iterator over a sample list.
///
/// The final batch may be short; callers that require full batches handle
/// that through [`DomainPair`].
pub struct BatchIter {
    samples: Vec<SampleSpec>,
    order: Vec<usize>,
    cursor: usize,
    cfg: DatasetConfig,
    rng: StdRng,
}

impl BatchIter {
    pub fn new(samples: Vec<SampleSpec>, cfg: DatasetConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let order = (0..samples.len()).collect();
        let mut iter = Self {
            samples,
            order,
            cursor: 0,
            cfg,
            rng,
        };
        if iter.cfg.shuffle {
            iter.order.shuffle(&mut iter.rng);
        }
        iter
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Rewind to the start; reshuffles when the config asks for it.
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.cfg.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// Draw the next batch, or `None` once the stream is exhausted.
    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<Option<ClassBatch<B>>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.order.len());
        let picked: Vec<usize> = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let mut image_buf: Vec<f32> = Vec::new();
        let mut labels: Vec<i64> = Vec::with_capacity(picked.len());
        let mut dims: Option<(usize, usize)> = None;
        for idx in picked.iter() {
            let sample = &self.samples[*idx];
            let (chw, h, w) = sample.load(&self.cfg, &mut self.rng)?;
            match dims {
                None => dims = Some((h, w)),
                Some((dh, dw)) if dh != h || dw != w => {
                    bail!("image dimensions differ within batch: {h}x{w}, expected {dh}x{dw}")
                }
                _ => {}
            }
            image_buf.extend_from_slice(&chw);
            labels.push(sample.label() as i64);
        }

        let n = picked.len();
        let (h, w) = dims.expect("non-empty batch");
        let images = Tensor::<B, 4>::from_floats(TensorData::new(image_buf, [n, 3, h, w]), device);
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), device);
        Ok(Some(ClassBatch {
            images,
            targets,
            size: n,
        }))
    }
}

/// Paired source/target streams that always yield full, equal-size batches.
///
/// When either stream runs out before filling a batch, both are reset to the
/// beginning and a fresh pair is drawn; the short leftover batch is dropped.
pub struct DomainPair {
    pub source: BatchIter,
    pub target: BatchIter,
    batch_size: usize,
}

impl DomainPair {
    pub fn new(source: BatchIter, target: BatchIter, batch_size: usize) -> Self {
        Self {
            source,
            target,
            batch_size,
        }
    }

    pub fn next_pair<B: Backend>(
        &mut self,
        device: &B::Device,
    ) -> Result<(ClassBatch<B>, ClassBatch<B>)> {
        let s = self.source.next_batch::<B>(self.batch_size, device)?;
        let t = self.target.next_batch::<B>(self.batch_size, device)?;
        if let (Some(s), Some(t)) = (&s, &t) {
            if s.size == self.batch_size && t.size == self.batch_size {
                return Ok((s.clone(), t.clone()));
            }
        }

        self.source.reset();
        self.target.reset();
        let s = self.source.next_batch::<B>(self.batch_size, device)?;
        let t = self.target.next_batch::<B>(self.batch_size, device)?;
        match (s, t) {
            (Some(s), Some(t)) if s.size == self.batch_size && t.size == self.batch_size => {
                Ok((s, t))
            }
            _ => bail!(
                "domain streams too small for batch size {} (source {}, target {})",
                self.batch_size,
                self.source.len(),
                self.target.len()
            ),
        }
    }
}
