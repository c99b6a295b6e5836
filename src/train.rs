//! Training loops for the JAN and AJAN adaptation variants.
//!
//! Both loops draw paired source/target batches, run a single concatenated
//! forward pass, and split the activations back into per-domain halves
//! before composing the loss. Parameter groups step at different rates:
//! the pretrained backbone at the scheduled learning rate, the freshly
//! initialized layers at ten times that.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::data::{BatchIter, DomainPair};
use crate::eval::{validate, EvalMode};
use crate::lowrank::{reconstruction_loss, refresh_basis, LowRankFactors};
use crate::meters::{accuracy, AverageMeter};
use crate::mmd::JmmdLoss;
use crate::model::{AjanNet, JanNet};
use crate::results::save_savedata;
use crate::schedule::InvLrSchedule;

/// Which adaptation objective to train with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Cross-entropy plus weighted joint MMD.
    Jan,
    /// Asymmetric heads with joint MMD and a low-rank reconstruction term.
    Ajan,
}

/// Hyperparameters for a training run. Serialized alongside checkpoints so
/// a run can be reconstructed from its results directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSettings {
    pub arch: String,
    pub variant: Variant,
    pub classes: usize,
    pub bottleneck: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub train_iter: usize,
    pub test_iter: usize,
    pub print_freq: usize,
    pub base_lr: f64,
    pub momentum: f64,
    pub weight_decay: f32,
    pub gamma: f64,
    pub power: f64,
    /// JMMD weight in the AJAN objective.
    pub alpha: f64,
    /// JMMD weight in the JAN objective.
    pub beta: f64,
    /// Reconstruction weight in the AJAN objective.
    pub gamma_c: f64,
    /// Basis refresh period in iterations. Zero disables refreshes after
    /// the initial factorization.
    pub u_refresh_freq: usize,
    pub model_name: String,
    pub results_dir: PathBuf,
    pub pretrained: Option<PathBuf>,
    /// Caffe-style BGR preprocessing, matching caffe-trained weights.
    pub from_caffe: bool,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            arch: "resnet18".into(),
            variant: Variant::Jan,
            classes: 31,
            bottleneck: 256,
            batch_size: 32,
            eval_batch_size: 4,
            train_iter: 10_000,
            test_iter: 500,
            print_freq: 10,
            base_lr: 1e-3,
            momentum: 0.9,
            weight_decay: 5e-4,
            gamma: 2e-3,
            power: 0.75,
            alpha: 1.0,
            beta: 0.3,
            gamma_c: 0.1,
            u_refresh_freq: 30,
            model_name: "jan".into(),
            results_dir: PathBuf::from("results"),
            pretrained: None,
            from_caffe: false,
        }
    }
}

impl TrainSettings {
    fn sgd(&self) -> SgdConfig {
        SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new().with_momentum(self.momentum),
            ))
            .with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(
                self.weight_decay.into(),
            )))
    }

    fn schedule(&self) -> InvLrSchedule {
        InvLrSchedule {
            base_lr: self.base_lr,
            gamma: self.gamma,
            power: self.power,
        }
    }

    fn run_dir(&self) -> PathBuf {
        self.results_dir.join(&self.model_name)
    }

    fn prepare_run_dir(&self) -> Result<()> {
        let dir = self.run_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating results dir {}", dir.display()))?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.join("settings.json"), json)?;
        Ok(())
    }

    fn checkpoint_path(&self, iter: usize) -> PathBuf {
        self.run_dir()
            .join(format!("{}_{:05}_model", self.model_name, iter))
    }
}

fn scalar<B: AutodiffBackend>(t: &Tensor<B, 1>) -> Result<f32> {
    let values = t.clone().detach().into_data().to_vec::<f32>();
    values
        .map_err(|e| anyhow::anyhow!("reading loss value: {e:?}"))?
        .first()
        .copied()
        .context("empty loss tensor")
}

/// Train a JAN model. Returns the final model.
pub fn run_jan<B: AutodiffBackend>(
    settings: &TrainSettings,
    streams: &mut DomainPair,
    val_source: &mut BatchIter,
    val_target: &mut BatchIter,
    device: &B::Device,
) -> Result<JanNet<B>> {
    settings.prepare_run_dir()?;

    let mut model = JanNet::<B>::new(&settings.arch, settings.classes, settings.bottleneck, device)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    if let Some(path) = &settings.pretrained {
        model.backbone = model
            .backbone
            .load_file(path.clone(), &recorder, device)
            .map_err(|e| anyhow::anyhow!("loading pretrained backbone: {e}"))?;
        println!("loaded pretrained backbone from {}", path.display());
    }

    let sgd = settings.sgd();
    let mut optim_backbone = sgd.init();
    let mut optim_bottleneck = sgd.init();
    let mut optim_fc = sgd.init();

    let schedule = settings.schedule();
    let criterion = CrossEntropyLossConfig::new().init(device);
    let jmmd = JmmdLoss::jan();

    let mut batch_time = AverageMeter::new();
    let mut data_time = AverageMeter::new();
    let mut ce_meter = AverageMeter::new();
    let mut jmmd_meter = AverageMeter::new();
    let mut loss_meter = AverageMeter::new();
    let mut prec_meter = AverageMeter::new();

    let mut end = Instant::now();
    for i in 0..settings.train_iter {
        let (source, target) = streams.next_pair::<B>(device)?;
        data_time.update(end.elapsed().as_secs_f32(), 1);

        let n = source.size;
        let inputs = Tensor::cat(vec![source.images, target.images], 0);
        let (outputs, features) = model.forward(inputs);
        let [total, classes] = outputs.dims();
        let [_, width] = features.dims();

        let source_output = outputs.clone().slice([0..n, 0..classes]);
        let target_output = outputs.slice([n..total, 0..classes]);
        let source_feature = features.clone().slice([0..n, 0..width]);
        let target_feature = features.slice([n..total, 0..width]);

        let ce = criterion.forward(source_output.clone(), source.targets.clone());
        let transfer = jmmd.forward(
            &[
                source_feature,
                softmax(source_output.clone(), 1),
            ],
            &[target_feature, softmax(target_output, 1)],
        );
        let loss = ce.clone() + transfer.clone().mul_scalar(settings.beta);

        let prec = accuracy(&source_output.detach(), &source.targets, &[1]);
        ce_meter.update(scalar(&ce)?, n);
        jmmd_meter.update(scalar(&transfer)?, n);
        loss_meter.update(scalar(&loss)?, n);
        prec_meter.update(prec[0], n);

        let mut grads = loss.backward();
        let g_backbone = GradientsParams::from_module(&mut grads, &model.backbone);
        let g_bottleneck = GradientsParams::from_module(&mut grads, &model.bottleneck);
        let g_fc = GradientsParams::from_module(&mut grads, &model.fc);
        let lr = schedule.lr(i, 1.0);
        let lr_new = schedule.lr(i, 10.0);
        model.backbone = optim_backbone.step(lr, model.backbone, g_backbone);
        model.bottleneck = optim_bottleneck.step(lr_new, model.bottleneck, g_bottleneck);
        model.fc = optim_fc.step(lr_new, model.fc, g_fc);

        batch_time.update(end.elapsed().as_secs_f32(), 1);
        end = Instant::now();

        if settings.print_freq != 0 && i % settings.print_freq == 0 {
            println!(
                "Iter: [{}/{}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\t\
                 Loss {:.4}/{:.4}\tLoss {:.4} ({:.4})\tPrec@1 {:.3} ({:.3})",
                i,
                settings.train_iter,
                batch_time.val,
                batch_time.avg,
                data_time.val,
                data_time.avg,
                ce_meter.avg,
                jmmd_meter.avg,
                loss_meter.val,
                loss_meter.avg,
                prec_meter.val,
                prec_meter.avg,
            );
        }

        if settings.test_iter != 0 && i % settings.test_iter == 0 && i != 0 {
            let eval_model = model.valid();
            println!("evaluating target domain at iter {i}");
            let target_out = validate(
                &eval_model,
                val_target,
                settings.eval_batch_size,
                EvalMode::CollectFeatures,
                device,
            )?;
            println!("evaluating source domain at iter {i}");
            let source_out = validate(
                &eval_model,
                val_source,
                settings.eval_batch_size,
                EvalMode::CollectFeatures,
                device,
            )?;
            let path = save_savedata(
                &settings.results_dir,
                &settings.model_name,
                i,
                &target_out
                    .into_savedata()
                    .context("target eval produced no arrays")?,
                Some(
                    &source_out
                        .into_savedata()
                        .context("source eval produced no arrays")?,
                ),
            )?;
            println!("saved features to {}", path.display());

            if let Err(e) = model
                .clone()
                .save_file(settings.checkpoint_path(i), &recorder)
            {
                eprintln!("warning: checkpoint save failed at iter {i}: {e}");
            }

            batch_time.reset();
            data_time.reset();
            ce_meter.reset();
            jmmd_meter.reset();
            loss_meter.reset();
            prec_meter.reset();
            end = Instant::now();
        }
    }

    Ok(model)
}

/// Train an AJAN model. Returns the final model.
pub fn run_ajan<B: AutodiffBackend>(
    settings: &TrainSettings,
    streams: &mut DomainPair,
    val_target: &mut BatchIter,
    device: &B::Device,
) -> Result<AjanNet<B>> {
    settings.prepare_run_dir()?;

    let mut model =
        AjanNet::<B>::new(&settings.arch, settings.classes, settings.bottleneck, device)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    if let Some(path) = &settings.pretrained {
        model.backbone = model
            .backbone
            .load_file(path.clone(), &recorder, device)
            .map_err(|e| anyhow::anyhow!("loading pretrained backbone: {e}"))?;
        println!("loaded pretrained backbone from {}", path.display());
    }

    let mut factors = LowRankFactors::<B>::new(settings.classes, device);
    let mut basis = refresh_basis(
        model.fcs.weight.val(),
        model.fct.weight.val(),
        &factors,
        device,
    )?;

    let sgd = settings.sgd();
    let mut optim_backbone = sgd.init();
    let mut optim_bottleneck = sgd.init();
    let mut optim_fcs = sgd.init();
    let mut optim_fct = sgd.init();
    let mut optim_factors = sgd.init();

    let schedule = settings.schedule();
    let criterion = CrossEntropyLossConfig::new().init(device);
    let jmmd = JmmdLoss::jan();

    let mut batch_time = AverageMeter::new();
    let mut data_time = AverageMeter::new();
    let mut ce_meter = AverageMeter::new();
    let mut jmmd_meter = AverageMeter::new();
    let mut rec_meter = AverageMeter::new();
    let mut loss_meter = AverageMeter::new();
    let mut prec_meter = AverageMeter::new();

    let mut end = Instant::now();
    for i in 0..settings.train_iter {
        let (source, target) = streams.next_pair::<B>(device)?;
        data_time.update(end.elapsed().as_secs_f32(), 1);

        if settings.u_refresh_freq != 0 && i % settings.u_refresh_freq == 0 {
            basis = refresh_basis(
                model.fcs.weight.val(),
                model.fct.weight.val(),
                &factors,
                device,
            )?;
        }

        let n = source.size;
        let inputs = Tensor::cat(vec![source.images, target.images], 0);
        let (source_output, target_output, source_feature, target_feature) =
            model.forward_asym(inputs, n);

        let ce = criterion.forward(source_output.clone(), source.targets.clone());
        let transfer = jmmd.forward(
            &[
                source_feature,
                softmax(source_output.clone(), 1),
            ],
            &[target_feature, softmax(target_output, 1)],
        );
        let rec = reconstruction_loss(
            &basis,
            model.fcs.weight.val(),
            model.fct.weight.val(),
            &factors,
        );
        let loss = ce.clone()
            + transfer.clone().mul_scalar(settings.alpha)
            + rec.clone().mul_scalar(settings.gamma_c);

        let prec = accuracy(&source_output.detach(), &source.targets, &[1]);
        ce_meter.update(scalar(&ce)?, n);
        jmmd_meter.update(scalar(&transfer)?, n);
        rec_meter.update(scalar(&rec)?, n);
        loss_meter.update(scalar(&loss)?, n);
        prec_meter.update(prec[0], n);

        let mut grads = loss.backward();
        let g_backbone = GradientsParams::from_module(&mut grads, &model.backbone);
        let g_bottleneck = GradientsParams::from_module(&mut grads, &model.bottleneck);
        let g_fcs = GradientsParams::from_module(&mut grads, &model.fcs);
        let g_fct = GradientsParams::from_module(&mut grads, &model.fct);
        let g_factors = GradientsParams::from_module(&mut grads, &factors);
        let lr = schedule.lr(i, 1.0);
        let lr_new = schedule.lr(i, 10.0);
        model.backbone = optim_backbone.step(lr, model.backbone, g_backbone);
        model.bottleneck = optim_bottleneck.step(lr_new, model.bottleneck, g_bottleneck);
        model.fcs = optim_fcs.step(lr_new, model.fcs, g_fcs);
        model.fct = optim_fct.step(lr_new, model.fct, g_fct);
        factors = optim_factors.step(lr_new, factors, g_factors);

        batch_time.update(end.elapsed().as_secs_f32(), 1);
        end = Instant::now();

        if settings.print_freq != 0 && i % settings.print_freq == 0 {
            println!(
                "Iter: [{}/{}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\t\
                 Loss {:.4}/{:.4}/{:.4}\tLoss {:.4} ({:.4})\tPrec@1 {:.3} ({:.3})",
                i,
                settings.train_iter,
                batch_time.val,
                batch_time.avg,
                data_time.val,
                data_time.avg,
                ce_meter.avg,
                jmmd_meter.avg,
                rec_meter.avg,
                loss_meter.val,
                loss_meter.avg,
                prec_meter.val,
                prec_meter.avg,
            );
        }

        if settings.test_iter != 0 && i % settings.test_iter == 0 && i != 0 {
            let eval_model = model.valid();
            println!("evaluating target domain at iter {i}");
            let target_out = validate(
                &eval_model,
                val_target,
                settings.eval_batch_size,
                EvalMode::CollectFeatures,
                device,
            )?;
            let path = save_savedata(
                &settings.results_dir,
                &settings.model_name,
                i,
                &target_out
                    .into_savedata()
                    .context("target eval produced no arrays")?,
                None,
            )?;
            println!("saved features to {}", path.display());

            if let Err(e) = model
                .clone()
                .save_file(settings.checkpoint_path(i), &recorder)
            {
                eprintln!("warning: checkpoint save failed at iter {i}: {e}");
            }

            batch_time.reset();
            data_time.reset();
            ce_meter.reset();
            jmmd_meter.reset();
            rec_meter.reset();
            loss_meter.reset();
            prec_meter.reset();
            end = Instant::now();
        }
    }

    Ok(model)
}
