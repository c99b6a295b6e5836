//! JAN variant: one shared classification head over the bottleneck.

use anyhow::Result;
use burn::module::Module;
use burn::nn::Linear;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::backbone::{arch_spec, Backbone};
use super::{gaussian_linear, Classify};

/// Backbone adapter with a bottleneck projection and a single head; source
/// and target share every layer.
#[derive(Module, Debug)]
pub struct JanNet<B: Backend> {
    pub backbone: Backbone<B>,
    pub bottleneck: Linear<B>,
    pub fc: Linear<B>,
    classes: usize,
}

impl<B: Backend> JanNet<B> {
    pub fn new(arch: &str, classes: usize, bottleneck: usize, device: &B::Device) -> Result<Self> {
        let spec = arch_spec(arch)?;
        let backbone = Backbone::new(&spec, device);
        let bottleneck_layer =
            gaussian_linear(backbone.feature_dim(), bottleneck, 0.005, Some(0.1), device);
        let fc = gaussian_linear(bottleneck, classes, 0.01, Some(0.0), device);
        Ok(Self {
            backbone,
            bottleneck: bottleneck_layer,
            fc,
            classes,
        })
    }

    /// Forward over a concatenated `[source; target]` batch, returning
    /// concatenated logits and bottleneck embeddings.
    pub fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let features = self.bottleneck.forward(self.backbone.forward(images));
        let logits = self.fc.forward(features.clone());
        (logits, features)
    }
}

impl<B: Backend> Classify<B> for JanNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        JanNet::forward(self, images)
    }

    fn num_classes(&self) -> usize {
        self.classes
    }
}
