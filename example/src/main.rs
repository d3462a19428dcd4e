use std::sync::Arc;
use std::thread;
use std::time::Duration;

use acqrt::LoggerConfig;
use acqrt::prelude::*;
use bytes::Bytes;

/// Simulated camera: one frame per event, exposure modeled as a sleep.
struct SimCamera {
    width: usize,
    height: usize,
}

impl Engine for SimCamera {
    fn setup_sequence(&mut self, _sequence: &Sequence) -> anyhow::Result<Meta> {
        let mut summary = Meta::new();
        summary.insert("camera".to_string(), "sim".into());
        summary.insert("width".to_string(), self.width.into());
        summary.insert("height".to_string(), self.height.into());
        Ok(summary)
    }

    fn setup_event(&mut self, _event: &Event) -> anyhow::Result<()> {
        Ok(())
    }

    fn exec_event(
        &mut self,
        event: &Event,
    ) -> anyhow::Result<Option<Box<dyn FrameStream + '_>>> {
        let exposure = event.exposure_ms.unwrap_or(10.0);
        thread::sleep(Duration::from_secs_f64(exposure / 1e3));

        let pixels = vec![0u8; self.width * self.height * 2];
        let image = ImageBuf::new(Bytes::from(pixels), vec![self.height, self.width], 2);
        let frame = Frame::new(image, event.clone(), Meta::new());
        Ok(Some(Box::new(std::iter::once(frame))))
    }
}

/// Simulated file writer: critical, a little I/O latency per frame.
struct SimWriter;

impl Consumer for SimWriter {
    fn setup(&mut self, _sequence: &Sequence, summary: &Meta) -> anyhow::Result<()> {
        tracing::info!(keys = summary.len(), "[SimWriter] setup");
        Ok(())
    }

    fn frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        thread::sleep(Duration::from_millis(10));
        tracing::info!(
            index = ?frame.event.index,
            bytes = frame.image.data().len(),
            runner_t_ms = frame.meta.get("runner_time_ms").and_then(|v| v.as_f64()),
            "[SimWriter] frame"
        );
        Ok(())
    }

    fn finish(&mut self, _sequence: &Sequence, status: RunStatus) -> anyhow::Result<()> {
        tracing::info!(%status, "[SimWriter] finish");
        Ok(())
    }
}

/// Simulated live display: non-critical and slower than the writer, so under
/// drop-oldest it sheds frames instead of stalling the run.
struct SimDisplay {
    rendered: usize,
}

impl Consumer for SimDisplay {
    fn frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        thread::sleep(Duration::from_millis(40));
        self.rendered += 1;
        tracing::info!(index = ?frame.event.index, n = self.rendered, "[SimDisplay] rendered");
        Ok(())
    }

    fn finish(&mut self, _sequence: &Sequence, status: RunStatus) -> anyhow::Result<()> {
        tracing::info!(%status, rendered = self.rendered, "[SimDisplay] finish");
        Ok(())
    }
}

/// Listener demonstrating the observational signal channel.
struct ProgressSignals;

impl RunnerSignals for ProgressSignals {
    fn sequence_started(&self, sequence: &Sequence, _summary: &Meta) {
        tracing::info!(uid = %sequence.uid, "[Progress] sequence started");
    }

    fn awaiting_event(&self, _event: &Event, remaining_s: f64) {
        tracing::info!(remaining_s, "[Progress] awaiting next event");
    }

    fn sequence_finished(&self, sequence: &Sequence) {
        tracing::info!(uid = %sequence.uid, "[Progress] sequence finished");
    }
}

fn main() -> anyhow::Result<()> {
    // ACQ_LOG_LEVEL / ACQ_LOG_FILE_DIR etc. control the log stream; the
    // guard must outlive the run so file logging stays flushed.
    let _log_guard = LoggerConfig::from_env().init()?;

    let mut runner = Runner::new();
    runner.signals().connect(Arc::new(ProgressSignals));

    // 3 timepoints x 4 z-slices, 100 ms apart.
    let mut events = Vec::new();
    for t in 0..3 {
        for z in 0..4 {
            let mut event = Event::default();
            event.index.insert("t".to_string(), t);
            event.index.insert("z".to_string(), z);
            event.exposure_ms = Some(5.0);
            if z == 0 {
                event.min_start_time = Some(t as f64 * 0.1);
            }
            events.push(event);
        }
    }

    let policy = RunPolicy {
        backpressure: BackpressurePolicy::DropOldest,
        observer_queue: 4,
        ..RunPolicy::default()
    };

    let mut engine = SimCamera {
        width: 512,
        height: 512,
    };
    let report = runner.run(
        &mut engine,
        Sequence::new(),
        events,
        vec![
            ConsumerSpec::critical("sim-writer", SimWriter),
            ConsumerSpec::observer("sim-display", SimDisplay { rendered: 0 }),
        ],
        policy,
    )?;

    println!("\nrun {}:", report.status);
    for c in &report.consumer_reports {
        println!(
            "  {:<14} submitted={:<4} processed={:<4} dropped={:<4} errors={}",
            c.name,
            c.submitted,
            c.processed,
            c.dropped,
            c.errors.len()
        );
    }
    Ok(())
}
