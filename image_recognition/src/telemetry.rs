use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;

const PREDICTION_DURATION_BOUNDARIES_MS: [f64; 17] = [
    5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 100.0, 150.0, 200.0, 250.0, 500.0,
    750.0, 1000.0,
];

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
    _provider: SdkMeterProvider,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("image_recognition");
        global::set_meter_provider(provider.clone());

        let request_counter = meter
            .u64_counter("prediction_requests_total")
            .with_description("Total number of prediction requests by outcome")
            .build();

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(PREDICTION_DURATION_BOUNDARIES_MS.to_vec())
            .with_description("Duration of preprocessing plus inference in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_duration,
            registry,
            _provider: provider,
        })
    }

    pub fn record_request(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64) {
        self.prediction_duration.record(duration_ms, &[]);
    }
}
