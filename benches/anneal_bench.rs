//! Criterion benchmarks for the annealing hot path.
//!
//! Uses synthetic frames rendered from a known colony, so the measured
//! cost is rendering, objective evaluation and the engine loop.

use cellanneal::cell::{Bacillus, BacillusModel, Cell, CellModel};
use cellanneal::colony::{CellNode, Colony};
use cellanneal::frame::Frame;
use cellanneal::render::{render, Objective, Palette};
use cellanneal::sa::CoolingSchedule;
use cellanneal::temperature::{auto_temp_schedule, TemperatureSchedule, CALIBRATION_SAMPLES};
use cellanneal::worker::{run_job, MoveProbabilities, WorkerSettings};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn settings(objective: Objective) -> WorkerSettings {
    WorkerSettings {
        model: CellModel::Bacillus(BacillusModel {
            max_speed: 1.0,
            max_spin: 0.1,
            min_growth: -0.5,
            max_growth: 0.5,
            min_width: 3.0,
            max_width: 8.0,
            min_length: 6.0,
            max_length: 40.0,
        }),
        objective,
        palette: Palette::default(),
        moves: MoveProbabilities::default(),
        iterations_per_cell: 200,
        cooling: CoolingSchedule::Geometric,
    }
}

/// A row of `n` horizontal cells, optionally shifted.
fn colony(n: usize, shift: f64) -> Colony {
    let mut colony = Colony::new();
    for i in 0..n {
        let x = 16.0 + 24.0 * (i % 8) as f64 + shift;
        let y = 12.0 + 16.0 * (i / 8) as f64;
        let cell = Cell::Bacillus(Bacillus::new(format!("c{i}"), x, y, 5.0, 18.0, 0.0));
        colony.add(CellNode::new(cell)).expect("unique names");
    }
    colony
}

fn frame(n: usize) -> Frame {
    render(&colony(n, 0.0), 200, 12 + 16 * n.div_ceil(8), Palette::default())
}

fn bench_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("objective");

    for &n in &[1, 8, 32] {
        let image = frame(n);
        let guess = colony(n, 1.5);
        for objective in [Objective::Pixel, Objective::Distance] {
            group.bench_with_input(
                BenchmarkId::new(format!("{objective:?}"), n),
                &(&image, &guess),
                |b, (image, guess)| {
                    b.iter(|| black_box(objective.cost(guess, image, Palette::default())))
                },
            );
        }
    }
    group.finish();
}

fn bench_run_job(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_job");
    group.sample_size(10);

    let settings = settings(Objective::Pixel);
    let schedule = TemperatureSchedule::new(50.0, 0.05);
    for &n in &[1, 4, 16] {
        let image = frame(n);
        let seed = colony(n, 2.0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &(image, seed), |b, (image, seed)| {
            b.iter(|| {
                let result = run_job(black_box(&settings), image, seed, schedule, 0, 42, None);
                black_box(result)
            })
        });
    }
    group.finish();
}

fn bench_calibration(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_temp_schedule");
    group.sample_size(10);

    let settings = settings(Objective::Pixel);
    for &n in &[1, 16] {
        let image = frame(n);
        let seed = colony(n, 2.0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &(image, seed), |b, (image, seed)| {
            b.iter(|| {
                let problem = settings.problem(image);
                black_box(auto_temp_schedule(&problem, seed, CALIBRATION_SAMPLES, 7))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_objective, bench_run_job, bench_calibration);
criterion_main!(benches);
