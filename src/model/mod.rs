//! Backbone adapter and the JAN/AJAN network variants.

mod ajan;
mod backbone;
mod jan;

pub use ajan::AjanNet;
pub use backbone::{arch_spec, Backbone, BackboneFamily, BackboneSpec};
pub use jan::JanNet;

use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Inference-mode forward shared by both variants: images in, class logits
/// and bottleneck embeddings out.
pub trait Classify<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 2>);

    fn num_classes(&self) -> usize;
}

/// Freshly initialized linear layer with zero-mean Gaussian weights and an
/// optional constant bias; bias `None` builds a bias-free layer.
pub(crate) fn gaussian_linear<B: Backend>(
    d_input: usize,
    d_output: usize,
    std: f64,
    bias: Option<f32>,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output)
        .with_bias(bias.is_some())
        .with_initializer(Initializer::Normal { mean: 0.0, std })
        .init(device);
    if let Some(value) = bias {
        linear.bias = linear
            .bias
            .map(|b| Param::from_tensor(b.val().zeros_like().add_scalar(value)));
    }
    linear
}
