use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use clap::Parser;

use domain_adapt::{
    index_image_folder, validate, AdBackend, AjanNet, BatchIter, DatasetConfig, EvalMode, JanNet,
    TrainSettings, Variant,
};
use domain_adapt::results::save_savedata;

#[derive(Parser, Debug)]
#[command(name = "eval", about = "Evaluate a domain-adapted checkpoint on a dataset")]
struct EvalArgs {
    /// Path to the settings.json written by the training run.
    #[arg(long)]
    settings: PathBuf,
    /// Checkpoint path to load (without the .bin extension).
    #[arg(long)]
    checkpoint: PathBuf,
    /// Dataset root to evaluate (one subdirectory per class).
    #[arg(long)]
    data_root: PathBuf,
    /// Batch size.
    #[arg(long, default_value_t = 4)]
    batch_size: usize,
    /// Also persist features/predictions/labels under this iteration tag.
    #[arg(long)]
    save_iter: Option<usize>,
}

fn main() -> Result<()> {
    let args = EvalArgs::parse();
    let device = <AdBackend as Backend>::Device::default();

    let json = fs::read_to_string(&args.settings)
        .with_context(|| format!("reading {}", args.settings.display()))?;
    let settings: TrainSettings = serde_json::from_str(&json)
        .with_context(|| format!("parsing {}", args.settings.display()))?;

    let cfg = DatasetConfig {
        caffe_norm: settings.from_caffe,
        ..Default::default()
    }
    .eval();
    let (samples, classes) = index_image_folder(&args.data_root)?;
    anyhow::ensure!(
        classes.len() == settings.classes,
        "dataset has {} classes but the run was trained with {}",
        classes.len(),
        settings.classes
    );
    let mut loader = BatchIter::new(samples, cfg);

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let mode = if args.save_iter.is_some() {
        EvalMode::CollectFeatures
    } else {
        EvalMode::Metrics
    };

    let out = match settings.variant {
        Variant::Jan => {
            let model =
                JanNet::<AdBackend>::new(&settings.arch, settings.classes, settings.bottleneck, &device)?;
            let model = model
                .load_file(args.checkpoint.clone(), &recorder, &device)
                .map_err(|e| {
                    anyhow::anyhow!("failed to load checkpoint {}: {e}", args.checkpoint.display())
                })?;
            println!("loaded checkpoint {}", args.checkpoint.display());
            validate(&model.valid(), &mut loader, args.batch_size, mode, &device)?
        }
        Variant::Ajan => {
            let model = AjanNet::<AdBackend>::new(
                &settings.arch,
                settings.classes,
                settings.bottleneck,
                &device,
            )?;
            let model = model
                .load_file(args.checkpoint.clone(), &recorder, &device)
                .map_err(|e| {
                    anyhow::anyhow!("failed to load checkpoint {}: {e}", args.checkpoint.display())
                })?;
            println!("loaded checkpoint {}", args.checkpoint.display());
            validate(&model.valid(), &mut loader, args.batch_size, mode, &device)?
        }
    };

    println!(
        "{} samples: Prec@1 {:.3} Prec@5 {:.3} loss {:.4}",
        out.count, out.top1, out.top5, out.loss
    );
    if let Some(iter) = args.save_iter {
        let data = out
            .into_savedata()
            .context("evaluation produced no arrays")?;
        let path = save_savedata(&settings.results_dir, &settings.model_name, iter, &data, None)?;
        println!("saved features to {}", path.display());
    }
    Ok(())
}
