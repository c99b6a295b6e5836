use approx::assert_relative_eq;
use burn::backend::ndarray::NdArray;
use burn::tensor::{Tensor, TensorData};
use domain_adapt::lowrank::{reconstruction_loss, refresh_basis, LowRankFactors};

type Backend = NdArray<f32>;

fn weight(rows: usize, cols: usize, scale: f32) -> Tensor<Backend, 2> {
    let device = Default::default();
    let flat: Vec<f32> = (0..rows * cols)
        .map(|i| scale * ((i % 7) as f32 - 3.0))
        .collect();
    Tensor::from_floats(TensorData::new(flat, [rows, cols]), &device)
}

fn to_vec(t: Tensor<Backend, 2>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().expect("tensor data")
}

#[test]
fn basis_has_orthonormal_columns() {
    let device = Default::default();
    let factors = LowRankFactors::<Backend>::new(3, &device);
    let ws = weight(8, 3, 0.2);
    let wt = weight(8, 3, 0.3);
    let basis = refresh_basis(ws, wt, &factors, &device).expect("refresh");
    assert_eq!(basis.dims(), [8, 3]);

    let gram = to_vec(basis.clone().transpose().matmul(basis));
    for r in 0..3 {
        for c in 0..3 {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert_relative_eq!(gram[r * 3 + c], expected, epsilon = 1e-4);
        }
    }
}

#[test]
fn refresh_is_deterministic_for_fixed_inputs() {
    let device = Default::default();
    let factors = LowRankFactors::<Backend>::new(2, &device);
    let ws = weight(5, 2, 0.1);
    let wt = weight(5, 2, 0.4);
    let a = refresh_basis(ws.clone(), wt.clone(), &factors, &device).expect("refresh");
    let b = refresh_basis(ws, wt, &factors, &device).expect("refresh");
    assert_eq!(to_vec(a), to_vec(b));
}

#[test]
fn narrow_bottleneck_is_rejected() {
    let device = Default::default();
    let factors = LowRankFactors::<Backend>::new(4, &device);
    let ws = weight(2, 4, 0.1);
    let wt = weight(2, 4, 0.1);
    assert!(refresh_basis(ws, wt, &factors, &device).is_err());
}

#[test]
fn reconstruction_loss_is_finite_and_nonnegative() {
    let device = Default::default();
    let factors = LowRankFactors::<Backend>::new(3, &device);
    let ws = weight(6, 3, 0.2);
    let wt = weight(6, 3, 0.25);
    let basis = refresh_basis(ws.clone(), wt.clone(), &factors, &device).expect("refresh");
    let loss = reconstruction_loss(&basis, ws, wt, &factors);
    let value = loss.into_data().to_vec::<f32>().expect("loss")[0];
    assert!(value.is_finite());
    assert!(value >= 0.0);
}
