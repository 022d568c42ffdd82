use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

pub struct DriverMetrics {
    pub registry: Registry,
    pub frames_total: IntCounter,
    pub frame_rate: Gauge,
}

impl DriverMetrics {
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("dome_driver".into()), None).unwrap();

        macro_rules! reg {
            ($m:expr) => {{
                registry.register(Box::new($m.clone())).unwrap();
                $m
            }};
        }

        Self {
            frames_total: reg!(IntCounter::with_opts(prometheus::Opts::new(
                "frames_total",
                "Total frames rendered and dispatched"
            ))
            .unwrap()),
            frame_rate: reg!(Gauge::with_opts(prometheus::Opts::new(
                "frame_rate",
                "Smoothed frames per second"
            ))
            .unwrap()),
            registry,
        }
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let reg = reg.clone();
                async move {
                    let mf = reg.gather();
                    let mut buf = Vec::new();
                    TextEncoder::new().encode(&mf, &mut buf).unwrap();
                    String::from_utf8(buf).unwrap().into_response()
                }
            }),
        )
    }
}
