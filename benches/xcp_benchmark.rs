// cargo bench
//
// Benchmarks the DAQ planner (C9) and the recorder writer (C11), the two throughput-sensitive
// pieces of the core: planning runs once per DAQ setup but over potentially thousands of
// measurements, and the recorder runs continuously for the life of a long acquisition. Adapted
// from the teacher's own criterion harness, which instead benchmarked the slave-side event
// trigger rate -- there is no slave here, so the benchmarked operations are the ones this crate
// actually owns.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use xcp_master::daq::planner::{self, PlannerLimits};
use xcp_master::recorder::{RecorderStrictness, RecorderWriter};
use xcp_master::types::{DataType, FrameCategory, Measurement};

fn make_measurements(n: usize) -> Vec<Measurement> {
    (0..n)
        .map(|i| Measurement {
            name: format!("m{i}"),
            address: 0x1000 + (i as u32) * 4,
            ext: 0,
            data_type: DataType::U32,
        })
        .collect()
}

fn bench_planner(c: &mut Criterion) {
    let mut group = c.benchmark_group("daq_planner");
    for &n in &[16usize, 256, 4096] {
        let measurements = make_measurements(n);
        let limits = PlannerLimits { bin_capacity: 248, bin_capacity_first: 244 };
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| planner::plan(&measurements, limits).unwrap());
        });
    }
    group.finish();
}

fn bench_recorder_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("recorder_writer");
    let payload = vec![0xABu8; 32];
    group.bench_function("add_frame_32B", |b| {
        let dir = std::env::temp_dir().join(format!("xcp_core_bench_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut writer = RecorderWriter::create(dir.join("bench"), 64, 1024, 1, RecorderStrictness::Lenient).unwrap();
        let mut counter: u16 = 0;
        b.iter(|| {
            writer.add_frame(FrameCategory::Daq, counter, counter as f64 * 1000.0, &payload).unwrap();
            counter = counter.wrapping_add(1);
        });
        let _ = writer.finalize();
        let _ = std::fs::remove_dir_all(&dir);
    });
    group.finish();
}

criterion_group!(benches, bench_planner, bench_recorder_throughput);
criterion_main!(benches);
