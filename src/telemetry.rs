use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    predict_duration: Histogram<f64>,
    worker_cycle_duration: Histogram<f64>,
    frames_processed: Counter<u64>,
    frames_dropped: Counter<u64>,
    pub registry: Registry,
    // Held so the exporter stays alive after the global provider is replaced.
    _provider: SdkMeterProvider,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("handsign_stream");
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let predict_duration = meter
            .f64_histogram("predict_duration_ms")
            .with_boundaries(generate_boundaries((50, 60, 100, 500, 1000)))
            .with_description("Wall-clock duration of /predict requests in milliseconds")
            .build();

        let worker_cycle_duration = meter
            .f64_histogram("worker_cycle_ms")
            .with_boundaries(generate_boundaries((0, 10, 30, 150, 500)))
            .with_description("Duration of one recognition pipeline pass in milliseconds")
            .build();

        let frames_processed = meter
            .u64_counter("frames_processed_total")
            .with_description("Frames drained and run through the recognition pipeline")
            .build();

        let frames_dropped = meter
            .u64_counter("frames_dropped_total")
            .with_description("Frames overwritten before the worker could drain them")
            .build();

        Ok(Metrics {
            request_counter,
            predict_duration,
            worker_cycle_duration,
            frames_processed,
            frames_dropped,
            registry,
            _provider: provider,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_predict_duration(&self, duration_ms: f64) {
        self.predict_duration.record(duration_ms, &[]);
    }

    pub fn record_worker_cycle(&self, duration_ms: f64, hands: usize) {
        let attributes = [KeyValue::new("hand_detected", hands > 0)];
        self.worker_cycle_duration.record(duration_ms, &attributes);
        self.frames_processed.add(1, &attributes);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.add(1, &[]);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
