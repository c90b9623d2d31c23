//! Directory batch conversion: NIfTI -> container -> NIfTI

use std::path::Path;
use tempfile::TempDir;
use volchunk::batch::{self, BatchConfig, Direction};
use volchunk::metadata::set_dim;
use volchunk::{
    AffineTransform, CodecConfig, Container, ContainerMode, ContainerSummary, DecodedVolume,
    HeaderAttributes, HeaderValue, Nifti1Codec, RetryPolicy, VolumeFileCodec, VolumeGrid,
};

fn volume(shape: [usize; 3], offset: i16) -> DecodedVolume {
    let count: usize = shape.iter().product();
    let samples = (0..count).map(|v| (v as i16 % 500) + offset).collect();
    let mut header = HeaderAttributes::new()
        .with("pixdim", HeaderValue::FloatVector(vec![1.0, 0.5, 0.5, 2.0, 1.0, 1.0, 1.0, 1.0]))
        .with("descrip", HeaderValue::Text("batch test".to_string()));
    set_dim(&mut header, shape);
    DecodedVolume {
        grid: VolumeGrid::new(shape, samples).unwrap(),
        affine: AffineTransform::new([
            [0.5, 0.0, 0.0, -10.0],
            [0.0, 0.5, 0.0, 20.0],
            [0.0, 0.0, 2.0, 4.5],
            [0.0, 0.0, 0.0, 1.0],
        ]),
        header,
    }
}

fn write_nifti(dir: &Path, name: &str, vol: &DecodedVolume) {
    std::fs::create_dir_all(dir).unwrap();
    let bytes = Nifti1Codec::gzipped().write(vol).unwrap();
    std::fs::write(dir.join(name), bytes).unwrap();
}

fn fast_config(datapath: &Path, savepath: &Path, direction: Direction) -> BatchConfig {
    BatchConfig::new(datapath, savepath, direction)
        .with_jobs(2)
        .with_retry(RetryPolicy::none())
}

#[tokio::test]
async fn test_encode_then_decode_directories() {
    let root = TempDir::new().unwrap();
    let nifti = root.path().join("nifti");
    let chunked = root.path().join("chunked");
    let restored = root.path().join("restored");

    let image = volume([70, 33, 5], -200);
    let label = volume([70, 33, 5], 0);
    write_nifti(&nifti.join("img"), "case_00000.nii.gz", &image);
    write_nifti(&nifti.join("label"), "case_00000.nii.gz", &label);
    std::fs::write(nifti.join("img").join("._case_00000.nii.gz"), b"resource fork").unwrap();

    let codec = CodecConfig::default().with_block_edge(32);
    let report = batch::run(&fast_config(&nifti, &chunked, Direction::Encode), codec)
        .await
        .unwrap();
    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.converted.len(), 2);
    assert_eq!(report.skipped, vec!["img/._case_00000.nii.gz"]);

    let container_bytes = std::fs::read(chunked.join("img").join("case_00000.vck")).unwrap();
    let container = Container::from_bytes(&container_bytes).unwrap();
    let summary = ContainerSummary::from_container(&container).unwrap();
    assert_eq!(summary.variant, "chunked");
    assert_eq!(summary.shape, Some([70, 33, 5]));
    assert_eq!(summary.blocks_total, Some(6));

    let report = batch::run(&fast_config(&chunked, &restored, Direction::Decode), codec)
        .await
        .unwrap();
    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.converted.len(), 2);

    for (subdir, original) in [("img", &image), ("label", &label)] {
        let bytes = std::fs::read(restored.join(subdir).join("case_00000.nii.gz")).unwrap();
        let source = Nifti1Codec::gzipped().read(&bytes).unwrap();
        assert_eq!(source.shape, original.grid.shape());
        let samples: Vec<i16> = source.samples.iter().map(|&v| v as i16).collect();
        assert_eq!(samples, original.grid.to_vec());
        assert_eq!(source.affine, original.affine);
        assert_eq!(
            source.header.get("descrip").and_then(HeaderValue::as_text),
            Some("batch test")
        );
    }
}

/// Intensity after applying the file's `scl_slope`/`scl_inter`
fn physical_values(file: &[u8]) -> Vec<f64> {
    let source = Nifti1Codec::gzipped().read(file).unwrap();
    let field = |key: &str| source.header.get(key).and_then(HeaderValue::as_float).unwrap();
    let (slope, inter) = (field("scl_slope"), field("scl_inter"));
    source.samples.iter().map(|&v| v * slope + inter).collect()
}

#[test]
fn test_scaled_volume_keeps_physical_values() {
    let mut vol = volume([9, 7, 3], -40);
    vol.header.insert("scl_slope", HeaderValue::Float(0.5));
    vol.header.insert("scl_inter", HeaderValue::Float(-1024.0));
    let original = Nifti1Codec::gzipped().write(&vol).unwrap();

    for codec in [
        CodecConfig::default().with_block_edge(4),
        CodecConfig::default().with_mode(ContainerMode::WholeVolume),
    ] {
        let container = batch::encode_file(&original, codec).unwrap();
        let restored = batch::decode_file(&container, codec).unwrap();

        let before = physical_values(&original);
        let after = physical_values(&restored);
        assert_eq!(before.len(), 9 * 7 * 3);
        assert_eq!(after, before);
        assert!(before.iter().any(|&v| v.fract() != 0.0));
    }
}

#[tokio::test]
async fn test_corrupt_file_does_not_stop_batch() {
    let root = TempDir::new().unwrap();
    let nifti = root.path().join("nifti");
    let out = root.path().join("out");

    write_nifti(&nifti.join("img"), "case_00001.nii.gz", &volume([8, 8, 8], 3));
    std::fs::write(nifti.join("img").join("case_00002.nii.gz"), b"not a volume").unwrap();

    let report = batch::run(
        &fast_config(&nifti, &out, Direction::Encode),
        CodecConfig::default(),
    )
    .await
    .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.converted.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].input, "img/case_00002.nii.gz");
    assert!(out.join("img").join("case_00001.vck").exists());
    assert!(!out.join("img").join("case_00002.vck").exists());
    // Missing label directory is not an error
    assert!(out.join("label").is_dir());
}

#[tokio::test]
async fn test_invalid_codec_config_rejected() {
    let root = TempDir::new().unwrap();
    let result = batch::run(
        &fast_config(root.path(), root.path(), Direction::Encode),
        CodecConfig::default().with_block_edge(0),
    )
    .await;
    assert!(result.is_err());
}
