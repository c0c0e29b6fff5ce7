use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use imcheck::similarity;
use opencv::core::{CV_8UC3, Mat, Point, Scalar};
use opencv::imgproc;

fn sample(size: i32, offset: i32) -> Mat {
    let mut img =
        Mat::new_rows_cols_with_default(size, size, CV_8UC3, Scalar::new(40.0, 90.0, 160.0, 0.0))
            .unwrap();
    imgproc::circle(
        &mut img,
        Point::new(size / 2 + offset, size / 2),
        size / 4,
        Scalar::new(220.0, 200.0, 30.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )
    .unwrap();
    img
}

fn benchmark_metrics(c: &mut Criterion) {
    let a = sample(512, 0);
    let b = sample(512, 12);

    let mut group = c.benchmark_group("相似度指标");
    group.throughput(Throughput::Elements(1));
    group.bench_function("SSIM", |bench| {
        bench.iter(|| similarity::structural_similarity(black_box(&a), black_box(&b)).unwrap())
    });
    group.bench_function("颜色直方图", |bench| {
        bench.iter(|| similarity::color_histogram_similarity(black_box(&a), black_box(&b)).unwrap())
    });
    group.bench_function("边缘重合度", |bench| {
        bench.iter(|| similarity::edge_overlap(black_box(&a), black_box(&b)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, benchmark_metrics);
criterion_main!(benches);
