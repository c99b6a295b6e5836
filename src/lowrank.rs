//! Low-rank reconstruction regularizer for the AJAN dual heads.
//!
//! The two classifier weight matrices are pushed toward `U * Vs` and
//! `U * Vt`: a shared basis with small per-domain coefficients. `U` is
//! refreshed periodically from a detached SVD and never carries gradients;
//! `Vs` and `Vt` are ordinary parameters stepped every iteration.

use anyhow::{anyhow, bail, Result};
use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor, TensorData};
use nalgebra::DMatrix;

/// Learnable per-domain coefficient matrices, `[classes, classes]` each.
#[derive(Module, Debug)]
pub struct LowRankFactors<B: Backend> {
    pub vs: Param<Tensor<B, 2>>,
    pub vt: Param<Tensor<B, 2>>,
}

impl<B: Backend> LowRankFactors<B> {
    pub fn new(classes: usize, device: &B::Device) -> Self {
        let dist = Distribution::Normal(0.0, 0.01);
        Self {
            vs: Param::from_tensor(Tensor::random([classes, classes], dist, device)),
            vt: Param::from_tensor(Tensor::random([classes, classes], dist, device)),
        }
    }
}

/// Recompute the shared basis from the current head weights and coefficients.
///
/// `ws`/`wt` are the heads' weight matrices in `[bottleneck, classes]`
/// layout. The basis is the left singular vectors of `[ws | wt] * [vs | vt]^T`,
/// computed host-side; nothing here participates in the gradient graph.
/// Requires `bottleneck >= classes` so the thin SVD spans a full basis.
pub fn refresh_basis<B: Backend>(
    ws: Tensor<B, 2>,
    wt: Tensor<B, 2>,
    factors: &LowRankFactors<B>,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let [bottleneck, classes] = ws.dims();
    if bottleneck < classes {
        bail!("bottleneck width {bottleneck} must be at least the class count {classes}");
    }

    let w = Tensor::cat(vec![ws, wt], 1).detach();
    let v = Tensor::cat(vec![factors.vs.val(), factors.vt.val()], 1).detach();
    let product = w.matmul(v.transpose());
    let data = product
        .to_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("failed to read basis product: {e:?}"))?;

    let m = DMatrix::<f32>::from_row_slice(bottleneck, classes, &data);
    let svd = m.svd(true, false);
    let u = svd
        .u
        .ok_or_else(|| anyhow!("SVD did not produce left singular vectors"))?;

    let mut row_major = Vec::with_capacity(bottleneck * classes);
    for r in 0..bottleneck {
        for c in 0..classes {
            row_major.push(u[(r, c)]);
        }
    }
    Ok(Tensor::from_floats(
        TensorData::new(row_major, [bottleneck, classes]),
        device,
    ))
}

/// Mean squared reconstruction error of both heads against the shared basis.
///
/// Gradients flow into the head weights and the coefficients; the basis is
/// read through `detach` on every call, so it stays constant between
/// refreshes regardless of how it was produced.
pub fn reconstruction_loss<B: Backend>(
    basis: &Tensor<B, 2>,
    ws: Tensor<B, 2>,
    wt: Tensor<B, 2>,
    factors: &LowRankFactors<B>,
) -> Tensor<B, 1> {
    let u = basis.clone().detach();
    let rec_s = (ws - u.clone().matmul(factors.vs.val()))
        .powf_scalar(2.0)
        .mean();
    let rec_t = (wt - u.matmul(factors.vt.val())).powf_scalar(2.0).mean();
    rec_s + rec_t
}
