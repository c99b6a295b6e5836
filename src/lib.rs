//! Domain-adaptation training (JAN/AJAN) for image classifiers on Burn.
//!
//! A backbone CNN is fine-tuned jointly on labeled source-domain images and
//! unlabeled target-domain images. The composite loss combines source
//! cross-entropy with a joint maximum mean discrepancy (JMMD) term over the
//! bottleneck embedding and softmax predictions, and, in the asymmetric AJAN
//! variant, a low-rank reconstruction penalty tying the two domain-specific
//! classifier heads to a shared SVD basis.

pub mod data;
pub mod eval;
pub mod lowrank;
pub mod meters;
pub mod mmd;
pub mod model;
pub mod results;
pub mod schedule;
pub mod train;

pub use data::{index_image_folder, BatchIter, ClassBatch, DatasetConfig, DomainPair, SampleSpec};
pub use eval::{validate, EvalMode, EvalOutput};
pub use meters::{accuracy, AverageMeter};
pub use mmd::{JmmdLoss, KernelConfig};
pub use model::{arch_spec, AjanNet, Backbone, BackboneFamily, BackboneSpec, Classify, JanNet};
pub use schedule::InvLrSchedule;
pub use train::{run_ajan, run_jan, TrainSettings, Variant};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "wgpu")]
pub type TrainBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "wgpu"))]
pub type TrainBackend = burn::backend::NdArray<f32>;

pub type AdBackend = burn::backend::Autodiff<TrainBackend>;
