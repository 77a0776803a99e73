//! End-to-end runs of the full engine on tiny synthetic inputs.

mod common;

use common::{synthetic_vgg_weights, test_image};
use pastiche::{
    Device, OptimizerKind, OutputFormat, Pooling, RenderedImage, StyleTransfer, StylizeOptions,
};

fn tiny_options(scale: u32) -> StylizeOptions {
    StylizeOptions {
        min_scale: scale,
        end_scale: scale,
        iterations: 1,
        initial_iterations: 1,
        ..Default::default()
    }
}

#[test]
fn test_single_scale_run_returns_requested_resolution() {
    let weights = synthetic_vgg_weights(29, 7);
    let mut engine = StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();

    let content = test_image(40, 20, 1);
    let style = test_image(32, 32, 2);

    let mut records = Vec::new();
    let mut callback = |it: &pastiche::Iterate| records.push(it.clone());
    let out = engine
        .stylize(&content, &[style], &tiny_options(32), Some(&mut callback))
        .unwrap();

    // Longest edge = 32, aspect preserved: 32x16.
    assert_eq!(out.shape(), (3, 16, 32));
    assert!(out.data().iter().all(|&v| (0.0..=1.0).contains(&v)));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].iteration, 1);
    assert_eq!(records[0].iteration_count, 1);
    assert_eq!((records[0].width, records[0].height), (32, 16));
    assert!(records[0].loss.is_finite());
    assert_eq!(records[0].peak_memory, 0);

    // The rendered outputs match the returned tensor's size.
    match engine.get_image(OutputFormat::Rgb8).unwrap() {
        RenderedImage::Rgb8(img) => {
            assert_eq!((img.width(), img.height()), (32, 16));
        }
        _ => panic!("requested rgb8"),
    }
    match engine.get_image(OutputFormat::Rgb16).unwrap() {
        RenderedImage::Rgb16(img) => {
            assert_eq!((img.width(), img.height()), (32, 16));
        }
        _ => panic!("requested rgb16"),
    }
}

#[test]
fn test_multi_scale_run_warm_starts_adam() {
    let weights = synthetic_vgg_weights(29, 8);
    let mut engine = StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();

    let content = test_image(32, 32, 3);
    let style = test_image(24, 24, 4);

    let options = StylizeOptions {
        min_scale: 16,
        end_scale: 32,
        iterations: 2,
        initial_iterations: 3,
        ..Default::default()
    };

    let mut sizes = Vec::new();
    let mut budgets = Vec::new();
    let mut callback = |it: &pastiche::Iterate| {
        sizes.push((it.width, it.height));
        budgets.push(it.iteration_count);
    };
    let out = engine
        .stylize(&content, &[style], &options, Some(&mut callback))
        .unwrap();

    // gen_scales(16, 32) = [16, 23, 32]; final output is at 32.
    assert_eq!(out.shape(), (3, 32, 32));
    assert!(out.data().iter().all(|&v| (0.0..=1.0).contains(&v)));

    // The coarsest scale gets the larger initial budget.
    assert_eq!(budgets.iter().filter(|&&b| b == 3).count(), 3);
    assert_eq!(budgets.iter().filter(|&&b| b == 2).count(), 4);
    assert_eq!(sizes.first().unwrap(), &(16, 16));
    assert_eq!(sizes.last().unwrap(), &(32, 32));
}

#[test]
fn test_lbfgs_single_scale_run() {
    let weights = synthetic_vgg_weights(29, 9);
    let mut engine = StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();

    let content = test_image(32, 32, 5);
    let style = test_image(32, 32, 6);

    let options = StylizeOptions {
        optimizer: OptimizerKind::Lbfgs,
        min_scale: 32,
        end_scale: 32,
        iterations: 2,
        initial_iterations: 2,
        ..Default::default()
    };
    let out = engine.stylize(&content, &[style], &options, None).unwrap();
    assert_eq!(out.shape(), (3, 32, 32));
    // The returned average is clamped even though L-BFGS iterates are
    // not.
    assert!(out.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn test_multiple_weighted_styles_blend() {
    let weights = synthetic_vgg_weights(29, 10);
    let mut engine = StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();

    let content = test_image(32, 32, 7);
    let style_a = test_image(32, 32, 8);
    let style_b = test_image(28, 36, 9);

    let options = StylizeOptions {
        style_weights: Some(vec![3.0, 1.0]),
        min_scale: 32,
        end_scale: 32,
        iterations: 1,
        initial_iterations: 1,
        ..Default::default()
    };
    let out = engine
        .stylize(&content, &[style_a, style_b], &options, None)
        .unwrap();
    assert_eq!(out.shape(), (3, 32, 32));
    assert!(out.is_finite());
}
