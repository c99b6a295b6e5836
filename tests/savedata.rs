use anyhow::Result;
use ndarray::{Array1, Array2};
use ndarray_npy::NpzReader;
use std::fs::File;
use tempfile::tempdir;

use domain_adapt::results::{save_savedata, savedata_path, SaveData};

fn sample_data(rows: usize) -> SaveData {
    SaveData {
        features: Array2::from_shape_fn((rows, 3), |(r, c)| (r * 3 + c) as f32),
        predictions: Array2::from_shape_fn((rows, 2), |(_, c)| if c == 0 { 0.75 } else { 0.25 }),
        labels: Array1::from_iter((0..rows).map(|r| (r % 2) as i64)),
    }
}

#[test]
fn path_encodes_model_and_iteration() {
    let path = savedata_path("results".as_ref(), "jan", 500);
    assert_eq!(path.to_string_lossy(), "results/jan/jan_00500_savedata.npz");
}

#[test]
fn target_only_archive_omits_source_keys() -> Result<()> {
    let temp = tempdir()?;
    let path = save_savedata(temp.path(), "ajan", 30, &sample_data(4), None)?;
    assert!(path.exists());

    let mut npz = NpzReader::new(File::open(&path)?)?;
    let names = npz.names()?;
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n.starts_with("t_")));
    let features: Array2<f32> = npz.by_name("t_fc7")?;
    assert_eq!(features.dim(), (4, 3));
    Ok(())
}

#[test]
fn paired_archive_round_trips_both_domains() -> Result<()> {
    let temp = tempdir()?;
    let target = sample_data(5);
    let source = sample_data(3);
    let path = save_savedata(temp.path(), "jan", 100, &target, Some(&source))?;

    let mut npz = NpzReader::new(File::open(&path)?)?;
    let t_labels: Array1<i64> = npz.by_name("t_label")?;
    let s_labels: Array1<i64> = npz.by_name("s_label")?;
    assert_eq!(t_labels, target.labels);
    assert_eq!(s_labels, source.labels);
    let s_preds: Array2<f32> = npz.by_name("s_fc8")?;
    assert_eq!(s_preds.dim(), (3, 2));
    Ok(())
}
