//! Convolutional backbone with per-family head-stripping rules.
//!
//! The architecture is chosen once at construction through [`arch_spec`];
//! after that the family tag fully determines how the trunk output becomes a
//! flat feature vector. No name-based dispatch happens at forward time.

use anyhow::{anyhow, Result};
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    Relu,
};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// How the base network's classification head is stripped and its feature
/// map pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackboneFamily {
    /// Single final linear head (resnet-style): trunk, global average pool,
    /// flatten.
    HeadLinear,
    /// Sequential MLP classifier (alexnet/vgg-style): trunk, fixed-size
    /// pool, flatten, penultimate MLP with the last linear removed.
    HeadSequentialClassifier,
    /// Densenet-style: trunk emits pre-activation features; ReLU and global
    /// average pool are applied by the adapter.
    HeadDenseNet,
}

/// Static description of one architecture: family plus trunk layout.
#[derive(Debug, Clone)]
pub struct BackboneSpec {
    pub family: BackboneFamily,
    /// Output channels per conv stage; every stage halves the spatial size.
    pub widths: Vec<usize>,
    /// Adaptive pool output (h, w) ahead of flattening.
    pub pool: [usize; 2],
    /// Hidden width of the kept MLP for the sequential-classifier family.
    pub mlp_hidden: Option<usize>,
}

impl BackboneSpec {
    /// Dimensionality of the flat feature the adapter hands to the
    /// bottleneck layer.
    pub fn feature_dim(&self) -> usize {
        match self.mlp_hidden {
            Some(hidden) => hidden,
            None => *self.widths.last().unwrap_or(&0),
        }
    }
}

/// Look up a supported architecture name.
///
/// The `-lite` entries are shallow trunks for small inputs; they exercise
/// the same family rules and are used by the tests.
pub fn arch_spec(arch: &str) -> Result<BackboneSpec> {
    let spec = match arch {
        "resnet18" => BackboneSpec {
            family: BackboneFamily::HeadLinear,
            widths: vec![64, 64, 128, 256, 512],
            pool: [1, 1],
            mlp_hidden: None,
        },
        "resnet-lite" => BackboneSpec {
            family: BackboneFamily::HeadLinear,
            widths: vec![8, 16],
            pool: [1, 1],
            mlp_hidden: None,
        },
        "alexnet" => BackboneSpec {
            family: BackboneFamily::HeadSequentialClassifier,
            widths: vec![64, 192, 384, 256],
            pool: [6, 6],
            mlp_hidden: Some(4096),
        },
        "vgg11" => BackboneSpec {
            family: BackboneFamily::HeadSequentialClassifier,
            widths: vec![64, 128, 256, 512],
            pool: [7, 7],
            mlp_hidden: Some(4096),
        },
        "vgg-lite" => BackboneSpec {
            family: BackboneFamily::HeadSequentialClassifier,
            widths: vec![8, 16],
            pool: [2, 2],
            mlp_hidden: Some(32),
        },
        "densenet121" => BackboneSpec {
            family: BackboneFamily::HeadDenseNet,
            widths: vec![64, 256, 512, 1024],
            pool: [1, 1],
            mlp_hidden: None,
        },
        "densenet-lite" => BackboneSpec {
            family: BackboneFamily::HeadDenseNet,
            widths: vec![8, 16],
            pool: [1, 1],
            mlp_hidden: None,
        },
        other => return Err(anyhow!("unknown architecture '{other}'")),
    };
    Ok(spec)
}

/// Conv + batch-norm stage with optional activation and downsampling.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    act: Option<Relu>,
    pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvStage<B> {
    fn new(in_channels: usize, out_channels: usize, activated: bool, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self {
            conv,
            norm,
            act: activated.then(Relu::new),
            pool: Some(pool),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm.forward(self.conv.forward(x));
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };
        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Penultimate MLP kept from a sequential classifier head (the final class
/// projection is already stripped).
#[derive(Module, Debug)]
pub struct FeatureMlp<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> FeatureMlp<B> {
    fn new(in_features: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(in_features, hidden).init(device),
            fc2: LinearConfig::new(hidden, hidden).init(device),
            dropout: DropoutConfig::new(0.5).init(),
        }
    }

    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(relu(self.fc1.forward(x)));
        relu(self.fc2.forward(x))
    }
}

/// Shared feature extractor: conv trunk plus the family-specific pooling and
/// flattening rule, producing `[N, feature_dim]` embeddings.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stages: Vec<ConvStage<B>>,
    pool: AdaptiveAvgPool2d,
    classifier: Option<FeatureMlp<B>>,
    family: Ignored<BackboneFamily>,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    pub fn new(spec: &BackboneSpec, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(spec.widths.len());
        let mut in_channels = 3;
        for (i, &width) in spec.widths.iter().enumerate() {
            // Densenet-style trunks expose pre-activation features from the
            // last stage; the adapter applies the ReLU itself.
            let last = i + 1 == spec.widths.len();
            let activated = !(last && spec.family == BackboneFamily::HeadDenseNet);
            stages.push(ConvStage::new(in_channels, width, activated, device));
            in_channels = width;
        }
        let pool = AdaptiveAvgPool2dConfig::new(spec.pool).init();
        let classifier = spec.mlp_hidden.map(|hidden| {
            let flat = in_channels * spec.pool[0] * spec.pool[1];
            FeatureMlp::new(flat, hidden, device)
        });
        Self {
            stages,
            pool,
            classifier,
            family: Ignored(spec.family),
            feature_dim: spec.feature_dim(),
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for stage in &self.stages {
            x = stage.forward(x);
        }
        let x = match self.family.0 {
            BackboneFamily::HeadDenseNet => self.pool.forward(relu(x)),
            _ => self.pool.forward(x),
        };
        let flat: Tensor<B, 2> = x.flatten(1, 3);
        match &self.classifier {
            Some(classifier) => classifier.forward(flat),
            None => flat,
        }
    }
}
