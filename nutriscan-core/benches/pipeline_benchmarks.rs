use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use nutriscan_core::config::DEFAULT_VOCABULARY;
use nutriscan_core::echo::{EchoOptions, encode_data_uri};
use nutriscan_core::{ImagePreprocessor, MockClassifier, PredictionContext, Vocabulary, rank};
use std::io::Cursor;
use std::sync::Arc;

fn sample_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn bench_preprocess(c: &mut Criterion) {
    let pre = ImagePreprocessor::default();
    let photo = sample_image(1024, 768);
    let jpeg = encode(&photo, ImageFormat::Jpeg);

    c.bench_function("preprocess_decode_jpeg_1024x768", |b| {
        b.iter(|| pre.decode(black_box(&jpeg)))
    });

    c.bench_function("preprocess_tensor_1024x768", |b| {
        b.iter(|| pre.prepare_image(black_box(&photo)))
    });

    c.bench_function("preprocess_full_jpeg_1024x768", |b| {
        b.iter(|| pre.prepare(black_box(&jpeg)))
    });
}

fn bench_ranking(c: &mut Criterion) {
    let vocab = Vocabulary::new(DEFAULT_VOCABULARY).unwrap();
    let scores: [f32; 10] = [0.02, 0.01, 0.01, 0.01, 0.03, 0.08, 0.04, 0.01, 0.02, 0.77];

    c.bench_function("rank_ten_labels", |b| {
        b.iter(|| rank(black_box(&scores), &vocab))
    });

    let wide = Vocabulary::new((0..1000).map(|i| format!("label-{i}")))
        .unwrap();
    let wide_scores: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 1000) as f32 / 1000.0).collect();
    c.bench_function("rank_thousand_labels", |b| {
        b.iter(|| rank(black_box(&wide_scores), &wide))
    });
}

fn bench_echo(c: &mut Criterion) {
    let photo = sample_image(640, 480);
    c.bench_function("echo_jpeg_640x480", |b| {
        b.iter(|| encode_data_uri(black_box(&photo), EchoOptions::default()))
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let vocab = Vocabulary::new(DEFAULT_VOCABULARY).unwrap();
    let context = PredictionContext::builder(Arc::new(MockClassifier::uniform(10)), vocab)
        .build()
        .unwrap();
    let jpeg = encode(&sample_image(800, 600), ImageFormat::Jpeg);

    c.bench_function("pipeline_predict_mock_800x600", |b| {
        b.iter(|| context.predict(black_box(&jpeg)))
    });
}

criterion_group!(
    benches,
    bench_preprocess,
    bench_ranking,
    bench_echo,
    bench_pipeline
);
criterion_main!(benches);
