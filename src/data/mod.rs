//! Dataset indexing, image transforms, and paired source/target batch streams.

mod dataset;
mod stream;

pub use dataset::{index_image_folder, DatasetConfig, SampleSpec};
pub use stream::{BatchIter, ClassBatch, DomainPair};
