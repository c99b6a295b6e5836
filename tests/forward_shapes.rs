use anyhow::Result;
use burn::backend::ndarray::NdArray;
use burn::tensor::{Distribution, Tensor};
use domain_adapt::{arch_spec, AjanNet, Backbone, JanNet};

type Backend = NdArray<f32>;

fn images(n: usize) -> Tensor<Backend, 4> {
    let device = Default::default();
    Tensor::random([n, 3, 8, 8], Distribution::Default, &device)
}

#[test]
fn each_family_emits_its_feature_width() -> Result<()> {
    let device = Default::default();
    for (arch, width) in [("resnet-lite", 16), ("vgg-lite", 32), ("densenet-lite", 16)] {
        let backbone = Backbone::<Backend>::new(&arch_spec(arch)?, &device);
        assert_eq!(backbone.feature_dim(), width, "{arch}");
        let out = backbone.forward(images(4));
        assert_eq!(out.dims(), [4, width], "{arch}");
    }
    Ok(())
}

#[test]
fn unknown_architecture_is_rejected() {
    assert!(arch_spec("inception-v9").is_err());
}

#[test]
fn jan_forward_returns_logits_and_embedding() -> Result<()> {
    let device = Default::default();
    let model = JanNet::<Backend>::new("resnet-lite", 5, 12, &device)?;
    let (logits, features) = model.forward(images(3));
    assert_eq!(logits.dims(), [3, 5]);
    assert_eq!(features.dims(), [3, 12]);
    Ok(())
}

#[test]
fn ajan_asymmetric_forward_splits_the_batch() -> Result<()> {
    let device = Default::default();
    let model = AjanNet::<Backend>::new("resnet-lite", 4, 8, &device)?;
    let (ys, yt, xs, xt) = model.forward_asym(images(6), 2);
    assert_eq!(ys.dims(), [2, 4]);
    assert_eq!(yt.dims(), [4, 4]);
    assert_eq!(xs.dims(), [2, 8]);
    assert_eq!(xt.dims(), [4, 8]);
    Ok(())
}

#[test]
fn ajan_heads_start_identical() -> Result<()> {
    let device = Default::default();
    let model = AjanNet::<Backend>::new("resnet-lite", 4, 8, &device)?;
    let ws = model
        .fcs
        .weight
        .val()
        .into_data()
        .to_vec::<f32>()
        .expect("fcs weight");
    let wt = model
        .fct
        .weight
        .val()
        .into_data()
        .to_vec::<f32>()
        .expect("fct weight");
    assert_eq!(ws, wt);
    Ok(())
}
