//! Golden tests for the augmentation playground.
//!
//! These tests verify determinism and correctness of the compile → render
//! → export path end to end.

use std::sync::Arc;

use augmentation_playground::decode::{decode, encode_nifti};
use augmentation_playground::renderer::raw_slice;
use augmentation_playground::{
    compile, compile_with_report, export, Axis, InMemoryVolumeStore, PreviewRenderer,
    PreviewRequest, RenderError, StoreConfig, TransformKind, VolumeData, VolumeMeta, VolumeStore,
};
use ndarray::Array3;
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn gradient(shape: (usize, usize, usize)) -> Array3<f32> {
    Array3::from_shape_fn(shape, |(x, y, z)| {
        (x as f32 * 0.5 + y as f32 * 1.5 + z as f32 * 3.0).sin() * 100.0 + x as f32
    })
}

fn renderer_with(shape: (usize, usize, usize)) -> (PreviewRenderer<InMemoryVolumeStore>, String) {
    let store = Arc::new(InMemoryVolumeStore::new());
    let data = VolumeData::new(gradient(shape), VolumeMeta::default()).unwrap();
    let id = store.put(data).id().to_string();
    (PreviewRenderer::new(store), id)
}

fn pixels(png: &[u8]) -> Vec<u8> {
    image::load_from_memory(png).unwrap().to_luma8().into_raw()
}

fn noise_request(id: &str, seed: u64) -> PreviewRequest {
    PreviewRequest::new(id, Axis::Axial, 10)
        .with_seed(seed)
        .with_transforms(json!({
            "intensity": {"noise": {"enabled": true, "mean": 0.0, "std": 0.1}}
        }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Golden Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn golden_out_of_range_index_clamps_to_last_slice() {
    let (renderer, id) = renderer_with((64, 64, 40));
    let result = renderer
        .render(&PreviewRequest::new(&id, Axis::Axial, 50))
        .unwrap();

    assert_eq!(result.plane.display_index, 39);
    assert_eq!(result.plane.array_index, 39);
    assert_eq!((result.width, result.height), (64, 64));

    let volume = renderer.store().get_str(&id).unwrap();
    let expected = raw_slice(volume.data().view(), &result.plane);
    let actual = pixels(&result.png);
    assert_eq!(actual, expected.iter().copied().collect::<Vec<u8>>());
    assert_eq!(actual.iter().copied().min(), Some(0));
    assert_eq!(actual.iter().copied().max(), Some(255));
}

#[test]
fn golden_same_seed_same_bytes() {
    let (renderer, id) = renderer_with((24, 24, 16));

    let first = renderer.render(&noise_request(&id, 7)).unwrap();
    let second = renderer.render(&noise_request(&id, 7)).unwrap();
    assert_eq!(first.png, second.png);
    assert_eq!(first.seed, 7);

    let other = renderer.render(&noise_request(&id, 8)).unwrap();
    assert_ne!(first.png, other.png);
}

#[test]
fn golden_reversed_pair_is_ordered() {
    let report = compile_with_report(
        &json!({"intensity": {"blur": {"enabled": true, "std": [2, 0]}}}),
        0,
    );
    let blur = report.pipeline.get(TransformKind::Blur).unwrap();
    assert_eq!(blur.params.pair("std"), Some((0.0, 2.0)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Determinism and Ordering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_full_pipeline_is_reproducible() {
    let (renderer, id) = renderer_with((20, 18, 12));
    let transforms = json!({
        "flip": {"enabled": true, "axes": "ap", "p": 1.0},
        "affine": {"enabled": true, "degrees": 15},
        "ghosting": {"enabled": true},
        "intensity": {
            "gamma": {"enabled": true},
            "blur": {"enabled": true, "std": [0.5, 1.0]}
        }
    });
    let request = PreviewRequest::new(&id, Axis::Coronal, 4)
        .with_seed(42)
        .with_transforms(transforms);

    let a = renderer.render(&request).unwrap();
    let b = renderer.render(&request).unwrap();
    assert_eq!(a.png, b.png);
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.transforms, 5);
}

#[test]
fn test_config_order_does_not_matter() {
    let (renderer, id) = renderer_with((16, 16, 10));
    let forward: serde_json::Value = serde_json::from_str(
        r#"{"flip": {"enabled": true, "p": 1.0},
            "intensity": {"gamma": {"enabled": true}, "noise": {"enabled": true}}}"#,
    )
    .unwrap();
    let backward: serde_json::Value = serde_json::from_str(
        r#"{"intensity": {"noise": {"enabled": true}, "gamma": {"enabled": true}},
            "flip": {"p": 1.0, "enabled": true}}"#,
    )
    .unwrap();

    let a = renderer
        .render(&PreviewRequest::new(&id, Axis::Sagittal, 3).with_seed(5).with_transforms(forward))
        .unwrap();
    let b = renderer
        .render(&PreviewRequest::new(&id, Axis::Sagittal, 3).with_seed(5).with_transforms(backward))
        .unwrap();
    assert_eq!(a.png, b.png);
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[test]
fn test_canonical_order_is_fixed() {
    let pipeline = compile(
        &json!({
            "intensity": {"blur": {"enabled": true}, "noise": {"enabled": true}},
            "swap": {"enabled": true},
            "flip": {"enabled": true}
        }),
        0,
    );
    assert_eq!(
        pipeline.kinds(),
        vec![TransformKind::Flip, TransformKind::Swap, TransformKind::Noise, TransformKind::Blur]
    );
}

#[test]
fn test_out_of_range_parameters_are_clamped() {
    let pipeline = compile(
        &json!({
            "affine": {"enabled": true, "degrees": 720},
            "intensity": {"noise": {"enabled": true, "std": -3}}
        }),
        0,
    );
    let affine = pipeline.get(TransformKind::Affine).unwrap();
    assert_eq!(affine.params.scalar("degrees"), Some(180.0));
    let noise = pipeline.get(TransformKind::Noise).unwrap();
    assert_eq!(noise.params.scalar("std"), Some(0.0));
}

#[test]
fn test_sagittal_index_is_mirrored() {
    let (renderer, id) = renderer_with((10, 8, 6));
    let result = renderer
        .render(&PreviewRequest::new(&id, Axis::Sagittal, 2))
        .unwrap();
    assert_eq!(result.plane.display_index, 2);
    assert_eq!(result.plane.array_index, 7);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_oversized_swap_patch_names_the_transform() {
    let (renderer, id) = renderer_with((8, 8, 8));
    let request = PreviewRequest::new(&id, Axis::Axial, 0)
        .with_seed(1)
        .with_transforms(json!({"swap": {"enabled": true, "patchSize": 32}}));

    match renderer.render(&request) {
        Err(RenderError::Transform { kind, reason }) => {
            assert_eq!(kind, TransformKind::Swap);
            assert!(reason.contains("patch size"));
        }
        other => panic!("expected transform failure, got {other:?}"),
    }
}

#[test]
fn test_unknown_volume_is_not_found() {
    let (renderer, _) = renderer_with((4, 4, 4));
    let missing = PreviewRequest::new("0123456789abcdef0123456789abcdef", Axis::Axial, 0);
    assert!(matches!(renderer.render(&missing), Err(RenderError::NotFound(_))));
    let garbage = PreviewRequest::new("not-an-id", Axis::Axial, 0);
    assert!(matches!(renderer.render(&garbage), Err(RenderError::NotFound(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Store and Decode
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_store_evicts_least_recently_used() {
    let store = InMemoryVolumeStore::with_config(StoreConfig {
        max_volumes: 2,
        ttl: None,
    });
    let put = |store: &InMemoryVolumeStore| {
        store
            .put(VolumeData::new(gradient((2, 2, 2)), VolumeMeta::default()).unwrap())
            .id()
    };
    let first = put(&store);
    let second = put(&store);
    assert!(store.get(&first).is_ok());
    let third = put(&store);

    assert!(store.get(&second).is_err());
    assert!(store.get(&first).is_ok());
    assert!(store.get(&third).is_ok());
    assert_eq!(store.stats().evicted, 1);
}

#[test]
fn test_uploaded_nifti_renders() {
    let voxels = gradient((12, 10, 8));
    let bytes = encode_nifti(&voxels, [1.0, 1.0, 1.5]);
    let data = decode("scan.nii", &bytes).unwrap();
    assert_eq!(data.data(), &voxels);

    let store = Arc::new(InMemoryVolumeStore::new());
    let id = store.put(data).id().to_string();
    let renderer = PreviewRenderer::new(Arc::clone(&store));
    let result = renderer
        .render(&PreviewRequest::new(&id, Axis::Axial, 4))
        .unwrap();
    assert_eq!((result.width, result.height), (12, 10));
}

#[test]
fn test_export_reconstructs_pipeline() {
    let pipeline = compile(
        &json!({
            "elastic": {"enabled": true, "numControlPoints": 9},
            "intensity": {"bias": {"enabled": true, "order": 2}}
        }),
        0,
    );
    let bundle = export(&pipeline);
    let rebuilt = compile(&bundle.declarative_config, 0);
    assert_eq!(rebuilt.fingerprint(), pipeline.fingerprint());
    assert!(bundle.code.contains("tio.RandomElasticDeformation(num_control_points=9"));
}
