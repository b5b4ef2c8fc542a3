//! Prometheus registry for the service.
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("shopvoice_requests_total", "Answered requests by validation status"),
            &["status"],
        )?;
        let latency = Histogram::with_opts(HistogramOpts::new(
            "shopvoice_pipeline_seconds",
            "End-to-end pipeline latency",
        ))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        Ok(Self {
            registry,
            requests,
            latency,
        })
    }

    pub fn observe(&self, status: &str, seconds: f64) {
        self.requests.with_label_values(&[status]).inc();
        self.latency.observe(seconds);
    }

    pub fn requests(&self, status: &str) -> u64 {
        self.requests.with_label_values(&[status]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.observe("pass", 0.2);
        metrics.observe("warn", 0.4);
        metrics.observe("pass", 0.1);

        assert_eq!(metrics.requests("pass"), 2);
        let text = encode(metrics.registry()).unwrap();
        assert!(text.contains("shopvoice_requests_total{status=\"pass\"} 2"));
        assert!(text.contains("shopvoice_pipeline_seconds_count 3"));
    }
}
