use anyhow::Result;
use burn::backend::ndarray::NdArray;
use domain_adapt::{BatchIter, DatasetConfig, DomainPair, SampleSpec};

type Backend = NdArray<f32>;

fn memory_samples(count: usize) -> Vec<SampleSpec> {
    (0..count)
        .map(|i| {
            let pixels = vec![i as f32 / count as f32; 3 * 4 * 4];
            SampleSpec::memory(pixels, 4, 4, i % 2)
        })
        .collect()
}

fn plain_cfg() -> DatasetConfig {
    DatasetConfig {
        shuffle: false,
        flip_horizontal_prob: 0.0,
        random_crop: false,
        seed: Some(7),
        ..Default::default()
    }
}

#[test]
fn iterator_yields_short_final_batch() -> Result<()> {
    let device = Default::default();
    let mut iter = BatchIter::new(memory_samples(10), plain_cfg());

    let mut sizes = Vec::new();
    while let Some(batch) = iter.next_batch::<Backend>(4, &device)? {
        sizes.push(batch.size);
        assert_eq!(batch.images.dims(), [batch.size, 3, 4, 4]);
    }
    assert_eq!(sizes, vec![4, 4, 2]);
    Ok(())
}

#[test]
fn reset_rewinds_to_the_start() -> Result<()> {
    let device = Default::default();
    let mut iter = BatchIter::new(memory_samples(6), plain_cfg());
    while iter.next_batch::<Backend>(4, &device)?.is_some() {}
    iter.reset();
    let batch = iter
        .next_batch::<Backend>(4, &device)?
        .expect("stream should restart after reset");
    assert_eq!(batch.size, 4);
    Ok(())
}

#[test]
fn pair_redraws_full_batches_across_uneven_streams() -> Result<()> {
    let device = Default::default();
    let source = BatchIter::new(memory_samples(10), plain_cfg());
    let target = BatchIter::new(memory_samples(7), plain_cfg());
    let mut pair = DomainPair::new(source, target, 4);

    let first_pixel = |batch: &domain_adapt::ClassBatch<Backend>| -> f32 {
        batch.images.clone().into_data().to_vec::<f32>().expect("pixels")[0]
    };

    // Draw 1 consumes target samples 0..4. Draw 2 finds only three target
    // samples left, so both streams rewind and the pair restarts from
    // position 0.
    let (_, t1) = pair.next_pair::<Backend>(&device)?;
    assert_eq!(t1.size, 4);
    assert_eq!(first_pixel(&t1), 0.0);

    let (s2, t2) = pair.next_pair::<Backend>(&device)?;
    assert_eq!(s2.size, 4);
    assert_eq!(t2.size, 4);
    assert_eq!(first_pixel(&s2), 0.0);
    assert_eq!(first_pixel(&t2), 0.0);

    for _ in 0..4 {
        let (s, t) = pair.next_pair::<Backend>(&device)?;
        assert_eq!(s.size, 4);
        assert_eq!(t.size, 4);
    }
    Ok(())
}

#[test]
fn pair_fails_when_a_stream_is_smaller_than_a_batch() {
    let device = Default::default();
    let source = BatchIter::new(memory_samples(10), plain_cfg());
    let target = BatchIter::new(memory_samples(3), plain_cfg());
    let mut pair = DomainPair::new(source, target, 4);
    assert!(pair.next_pair::<Backend>(&device).is_err());
}
