use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use burn::tensor::backend::Backend;
use clap::Parser;

use domain_adapt::{
    index_image_folder, run_ajan, run_jan, AdBackend, BatchIter, DatasetConfig, DomainPair,
    TrainSettings, Variant,
};

#[derive(Parser, Debug)]
#[command(name = "train", about = "Domain-adaptive classifier training harness")]
struct TrainArgs {
    /// Source-domain dataset root (one subdirectory per class).
    #[arg(long)]
    source_root: PathBuf,
    /// Target-domain dataset root (one subdirectory per class).
    #[arg(long)]
    target_root: PathBuf,
    /// Optional held-out source root; defaults to --source-root.
    #[arg(long)]
    val_source_root: Option<PathBuf>,
    /// Optional held-out target root; defaults to --target-root.
    #[arg(long)]
    val_target_root: Option<PathBuf>,
    /// Adaptation objective.
    #[arg(long, value_enum, default_value_t = Variant::Jan)]
    variant: Variant,
    /// Backbone architecture (e.g. resnet18, alexnet, vgg11, densenet121).
    #[arg(long, default_value = "resnet18")]
    arch: String,
    /// Bottleneck width between the backbone and the classifier heads.
    #[arg(long, default_value_t = 256)]
    bottleneck: usize,
    /// Per-domain batch size.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Evaluation batch size.
    #[arg(long, default_value_t = 4)]
    eval_batch_size: usize,
    /// Total training iterations.
    #[arg(long, default_value_t = 10000)]
    train_iter: usize,
    /// Evaluate and persist features every N iterations (0 disables).
    #[arg(long, default_value_t = 500)]
    test_iter: usize,
    /// Log every N iterations.
    #[arg(long, default_value_t = 10)]
    print_freq: usize,
    /// Base learning rate for the inverse-power schedule.
    #[arg(long, default_value_t = 1e-3)]
    base_lr: f64,
    /// SGD momentum.
    #[arg(long, default_value_t = 0.9)]
    momentum: f64,
    /// SGD weight decay.
    #[arg(long, default_value_t = 5e-4)]
    weight_decay: f32,
    /// Schedule gamma: lr = base_lr * (1 + gamma * iter)^(-power).
    #[arg(long, default_value_t = 2e-3)]
    gamma: f64,
    /// Schedule power.
    #[arg(long, default_value_t = 0.75)]
    power: f64,
    /// JMMD weight (ajan objective).
    #[arg(long, default_value_t = 1.0)]
    alpha: f64,
    /// JMMD weight (jan objective).
    #[arg(long, default_value_t = 0.3)]
    beta: f64,
    /// Reconstruction weight (ajan objective).
    #[arg(long, default_value_t = 0.1)]
    gamma_c: f64,
    /// Shared-basis refresh period in iterations.
    #[arg(long, default_value_t = 30)]
    u_refresh_freq: usize,
    /// Shuffle and augmentation seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Results directory for features, checkpoints and settings.
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
    /// Run name; defaults to the variant name.
    #[arg(long)]
    model_name: Option<String>,
    /// Optional pretrained backbone checkpoint to start from.
    #[arg(long)]
    pretrained: Option<PathBuf>,
    /// Use caffe-style BGR preprocessing to match caffe-trained weights.
    #[arg(long, default_value_t = false)]
    from_caffe: bool,
}

fn stream(root: &Path, cfg: &DatasetConfig) -> Result<(BatchIter, Vec<String>)> {
    let (samples, classes) = index_image_folder(root)?;
    if samples.is_empty() {
        bail!("no samples found under {}", root.display());
    }
    Ok((BatchIter::new(samples, cfg.clone()), classes))
}

fn main() -> Result<()> {
    let args = TrainArgs::parse();
    let device = <AdBackend as Backend>::Device::default();

    let train_cfg = DatasetConfig {
        seed: args.seed,
        caffe_norm: args.from_caffe,
        ..Default::default()
    };
    let eval_cfg = train_cfg.eval();

    let (source, source_classes) = stream(&args.source_root, &train_cfg)?;
    let (target, target_classes) = stream(&args.target_root, &train_cfg)?;
    if source_classes != target_classes {
        bail!(
            "class sets differ between domains: {} source vs {} target classes",
            source_classes.len(),
            target_classes.len()
        );
    }
    let val_source_root = args.val_source_root.as_ref().unwrap_or(&args.source_root);
    let val_target_root = args.val_target_root.as_ref().unwrap_or(&args.target_root);
    let (mut val_source, _) = stream(val_source_root, &eval_cfg)?;
    let (mut val_target, _) = stream(val_target_root, &eval_cfg)?;

    println!(
        "source {} samples, target {} samples, {} classes",
        source.len(),
        target.len(),
        source_classes.len()
    );

    let settings = TrainSettings {
        arch: args.arch,
        variant: args.variant,
        classes: source_classes.len(),
        bottleneck: args.bottleneck,
        batch_size: args.batch_size,
        eval_batch_size: args.eval_batch_size,
        train_iter: args.train_iter,
        test_iter: args.test_iter,
        print_freq: args.print_freq,
        base_lr: args.base_lr,
        momentum: args.momentum,
        weight_decay: args.weight_decay,
        gamma: args.gamma,
        power: args.power,
        alpha: args.alpha,
        beta: args.beta,
        gamma_c: args.gamma_c,
        u_refresh_freq: args.u_refresh_freq,
        model_name: args.model_name.unwrap_or_else(|| match args.variant {
            Variant::Jan => "jan".to_string(),
            Variant::Ajan => "ajan".to_string(),
        }),
        results_dir: args.results_dir,
        pretrained: args.pretrained,
        from_caffe: args.from_caffe,
    };

    let mut streams = DomainPair::new(source, target, settings.batch_size);
    match settings.variant {
        Variant::Jan => {
            run_jan::<AdBackend>(&settings, &mut streams, &mut val_source, &mut val_target, &device)?;
        }
        Variant::Ajan => {
            run_ajan::<AdBackend>(&settings, &mut streams, &mut val_target, &device)?;
        }
    }
    println!("training finished after {} iterations", settings.train_iter);
    Ok(())
}
