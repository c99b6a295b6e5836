//! Persistence sink for periodic evaluation artifacts.

use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzWriter;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Named arrays extracted during one evaluation pass.
pub struct SaveData {
    pub features: Array2<f32>,
    pub predictions: Array2<f32>,
    pub labels: Array1<i64>,
}

/// Path template for periodic artifacts:
/// `<root>/<model>/<model>_<iter:05>_savedata.npz`.
pub fn savedata_path(root: &Path, model: &str, iter: usize) -> PathBuf {
    root.join(model)
        .join(format!("{model}_{iter:05}_savedata.npz"))
}

/// Write the target-domain (and optionally source-domain) arrays for one
/// evaluation cycle, keyed by iteration number.
pub fn save_savedata(
    root: &Path,
    model: &str,
    iter: usize,
    target: &SaveData,
    source: Option<&SaveData>,
) -> Result<PathBuf> {
    let path = savedata_path(root, model, iter);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)
        .map_err(|e| anyhow!("failed to create {}: {e}", path.display()))?;
    let mut npz = NpzWriter::new(file);
    npz.add_array("t_fc7", &target.features)?;
    npz.add_array("t_fc8", &target.predictions)?;
    npz.add_array("t_label", &target.labels)?;
    if let Some(source) = source {
        npz.add_array("s_fc7", &source.features)?;
        npz.add_array("s_fc8", &source.predictions)?;
        npz.add_array("s_label", &source.labels)?;
    }
    npz.finish()?;
    Ok(path)
}
