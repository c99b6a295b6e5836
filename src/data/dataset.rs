//! Image-folder datasets: one subdirectory per class, images inside.

use anyhow::{anyhow, bail, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-channel statistics of the torchvision-style input pipeline.
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Caffe-converted backbones expect BGR inputs in 0..255 with mean subtraction.
const CAFFE_BGR_MEAN: [f32; 3] = [104.0, 117.0, 124.0];

/// How raw images are turned into fixed-resolution normalized tensors.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Side length images are resized to before cropping.
    pub resize: u32,
    /// Side length of the square crop fed to the network.
    pub crop: u32,
    /// Random crop position when true, center crop when false.
    pub random_crop: bool,
    /// Probability of a horizontal flip (0 disables).
    pub flip_horizontal_prob: f32,
    /// Shuffle sample order at construction and on every reset.
    pub shuffle: bool,
    /// Seed for shuffling and augmentation; None picks an arbitrary seed.
    pub seed: Option<u64>,
    /// Use caffe-style BGR mean-subtraction instead of torchvision statistics.
    pub caffe_norm: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            resize: 256,
            crop: 224,
            random_crop: true,
            flip_horizontal_prob: 0.5,
            shuffle: true,
            seed: None,
            caffe_norm: false,
        }
    }
}

impl DatasetConfig {
    /// Deterministic evaluation pipeline: center crop, no flip, no shuffle.
    pub fn eval(&self) -> Self {
        Self {
            random_crop: false,
            flip_horizontal_prob: 0.0,
            shuffle: false,
            ..self.clone()
        }
    }
}

/// A single labeled sample, either on disk or preloaded in memory.
///
/// Memory samples carry already-normalized CHW data and skip the transform
/// pipeline; they exist for synthetic datasets in tests and smoke runs.
#[derive(Debug, Clone)]
pub enum SampleSpec {
    File { path: PathBuf, label: usize },
    Memory {
        image_chw: Vec<f32>,
        height: usize,
        width: usize,
        label: usize,
    },
}

impl SampleSpec {
    pub fn memory(image_chw: Vec<f32>, height: usize, width: usize, label: usize) -> Self {
        Self::Memory {
            image_chw,
            height,
            width,
            label,
        }
    }

    pub fn label(&self) -> usize {
        match self {
            Self::File { label, .. } | Self::Memory { label, .. } => *label,
        }
    }

    /// Load and transform into (CHW floats, height, width).
    pub(crate) fn load(&self, cfg: &DatasetConfig, rng: &mut StdRng) -> Result<(Vec<f32>, usize, usize)> {
        match self {
            Self::Memory {
                image_chw,
                height,
                width,
                ..
            } => Ok((image_chw.clone(), *height, *width)),
            Self::File { path, .. } => {
                let img = image::open(path)
                    .map_err(|e| anyhow!("failed to open image {:?}: {e}", path))?;
                Ok(transform(img, cfg, rng))
            }
        }
    }
}

fn transform(img: DynamicImage, cfg: &DatasetConfig, rng: &mut StdRng) -> (Vec<f32>, usize, usize) {
    let img = img.resize_exact(cfg.resize, cfg.resize, FilterType::Triangle);
    let crop = cfg.crop.min(cfg.resize);
    let max_off = cfg.resize - crop;
    let (x, y) = if cfg.random_crop && max_off > 0 {
        (rng.gen_range(0..=max_off), rng.gen_range(0..=max_off))
    } else {
        (max_off / 2, max_off / 2)
    };
    let mut img = img.crop_imm(x, y, crop, crop).to_rgb8();
    if cfg.flip_horizontal_prob > 0.0 && rng.gen::<f32>() < cfg.flip_horizontal_prob {
        img = image::imageops::flip_horizontal(&img);
    }

    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * w + x) as usize;
        if cfg.caffe_norm {
            // BGR channel order, 0..255 range, per-channel mean subtraction.
            chw[base] = pixel[2] as f32 - CAFFE_BGR_MEAN[0];
            chw[plane + base] = pixel[1] as f32 - CAFFE_BGR_MEAN[1];
            chw[2 * plane + base] = pixel[0] as f32 - CAFFE_BGR_MEAN[2];
        } else {
            for c in 0..3 {
                chw[c * plane + base] =
                    (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
    }
    (chw, h as usize, w as usize)
}

/// Index a class-per-subdirectory image folder.
///
/// Returns the samples (labels assigned by sorted class-directory name) and
/// the class names themselves.
pub fn index_image_folder(root: &Path) -> Result<(Vec<SampleSpec>, Vec<String>)> {
    if !root.is_dir() {
        bail!("dataset root {:?} is not a directory", root);
    }
    let mut class_dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    class_dirs.sort();
    if class_dirs.is_empty() {
        bail!("no class subdirectories under {:?}", root);
    }

    let mut samples = Vec::new();
    let mut classes = Vec::new();
    for (label, dir) in class_dirs.iter().enumerate() {
        let name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|s| s.to_str()),
                    Some("jpg" | "jpeg" | "png" | "bmp")
                )
            })
            .collect();
        paths.sort();
        for path in paths {
            samples.push(SampleSpec::File { path, label });
        }
        classes.push(name);
    }
    if samples.is_empty() {
        bail!("no images found under {:?}", root);
    }
    Ok((samples, classes))
}
