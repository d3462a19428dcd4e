use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::time::{Duration, Instant};

use acqrt::prelude::*;
use bytes::Bytes;

static PIXELS: [u8; 256] = [0; 256];

struct NullWriter;

impl Consumer for NullWriter {
    fn frame(&mut self, _frame: &Frame) -> anyhow::Result<()> {
        Ok(())
    }
}

struct BurstEngine {
    frames_per_event: usize,
}

impl Engine for BurstEngine {
    fn setup_event(&mut self, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }

    fn exec_event(
        &mut self,
        event: &Event,
    ) -> anyhow::Result<Option<Box<dyn FrameStream + '_>>> {
        let image = ImageBuf::new(Bytes::from_static(&PIXELS), vec![16, 16], 1);
        let frames: Vec<Frame> = (0..self.frames_per_event)
            .map(|_| Frame::new(image.clone(), event.clone(), Meta::new()))
            .collect();
        Ok(Some(Box::new(frames.into_iter())))
    }
}

fn run_cycle(frames_per_event: usize) -> Duration {
    let mut runner = Runner::new();
    let mut engine = BurstEngine { frames_per_event };

    let start = Instant::now();
    runner
        .run(
            &mut engine,
            Sequence::new(),
            vec![Event::default()],
            vec![ConsumerSpec::critical("null-writer", NullWriter)],
            RunPolicy::default(),
        )
        .unwrap();
    start.elapsed()
}

pub fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_hot_loop");

    for &frames in &[10_000_usize, 50_000_usize, 200_000_usize] {
        group.bench_function(BenchmarkId::from_parameter(frames), |b| {
            b.iter_custom(|n| {
                let mut total = Duration::ZERO;
                for _ in 0..n {
                    total += run_cycle(frames);
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
        .sample_size(12);
    targets = bench_dispatch
}
criterion_main!(benches);
