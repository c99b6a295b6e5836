//! AJAN variant: asymmetric dual heads over a shared bottleneck.

use anyhow::Result;
use burn::module::{Module, Param};
use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::backbone::{arch_spec, Backbone};
use super::{gaussian_linear, Classify};

/// Backbone adapter with two bias-free classifier heads: `fcs` scores the
/// source half of a batch, `fct` the target half. `fct` starts as an exact
/// copy of `fcs` so the heads only diverge through training.
#[derive(Module, Debug)]
pub struct AjanNet<B: Backend> {
    pub backbone: Backbone<B>,
    pub bottleneck: Linear<B>,
    pub fcs: Linear<B>,
    pub fct: Linear<B>,
    classes: usize,
}

impl<B: Backend> AjanNet<B> {
    pub fn new(arch: &str, classes: usize, bottleneck: usize, device: &B::Device) -> Result<Self> {
        let spec = arch_spec(arch)?;
        let backbone = Backbone::new(&spec, device);
        let bottleneck_layer =
            gaussian_linear(backbone.feature_dim(), bottleneck, 0.005, Some(0.1), device);
        let fcs = gaussian_linear(bottleneck, classes, 0.01, None, device);
        let mut fct = gaussian_linear(bottleneck, classes, 0.01, None, device);
        fct.weight = Param::from_tensor(fcs.weight.val());
        Ok(Self {
            backbone,
            bottleneck: bottleneck_layer,
            fcs,
            fct,
            classes,
        })
    }

    /// Asymmetric forward over a concatenated `[source; target]` batch: the
    /// first `n_source` rows go through `fcs`, the rest through `fct`.
    /// Returns (source logits, target logits, source embed, target embed).
    pub fn forward_asym(
        &self,
        images: Tensor<B, 4>,
        n_source: usize,
    ) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.bottleneck.forward(self.backbone.forward(images));
        let [total, width] = features.dims();
        let xs = features.clone().slice([0..n_source, 0..width]);
        let xt = features.slice([n_source..total, 0..width]);
        let ys = self.fcs.forward(xs.clone());
        let yt = self.fct.forward(xt.clone());
        (ys, yt, xs, xt)
    }

    /// Inference forward: unseen data is treated as target-domain and scored
    /// by `fct`.
    pub fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.bottleneck.forward(self.backbone.forward(images));
        let logits = self.fct.forward(features.clone());
        (logits, features)
    }
}

impl<B: Backend> Classify<B> for AjanNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        AjanNet::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.classes
    }
}
