mod config;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use glam::DVec2;
use tracing_subscriber::{fmt, EnvFilter};

use pixeldrive::color;
use pixeldrive::dome::dome_mesh;
use pixeldrive::{
    AnimationLoop, Dispatcher, OpcEndpoint, SampleSource, SamplerSettings, SamplingEngine,
};

use crate::config::Config;
use crate::metrics::DriverMetrics;

/// Built-in test pattern: a slowly rotating rainbow swirl. Rendering through
/// the motion-blur hook keeps it smooth under temporal jitter.
struct Swirl;

impl SampleSource for Swirl {
    fn sample_point_blurred(&mut self, p: DVec2, t: f64, _jitter: f64) -> u32 {
        let r = p.length();
        let theta = p.y.atan2(p.x);
        let hue = theta / std::f64::consts::TAU + 0.4 * r - 0.12 * t;
        color::hsv(hue, 0.85, 1.0)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "Dome driver starting");

    // Geometry errors are fatal here, before anything is running.
    let mesh = dome_mesh(config.num_panels, config.panel_size)?;
    let dispatcher = Dispatcher::new(
        &mesh,
        vec![OpcEndpoint::new(&config.opc_host, config.opc_port)],
    )?;
    dispatcher
        .channel(0)
        .update_settings(|s| s.set_color_correction(config.gamma, 1.0, 1.0, 1.0));

    let sampler = SamplingEngine::new(SamplerSettings::new(config.subsampling));
    let mut anim = AnimationLoop::new(mesh, sampler, Swirl, dispatcher);

    let metrics = Arc::new(DriverMetrics::new());
    if let Some(addr) = &config.metrics_listen_addr {
        let router = metrics.router();
        let addr: std::net::SocketAddr = addr.parse()?;
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
            tracing::info!(addr = %addr, "Metrics server started");
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });
    }

    tracing::info!("Starting frame loop...");
    let budget = Duration::from_secs_f64(1.0 / config.max_fps);
    loop {
        let start = anim.clock();
        anim.draw(start);
        metrics.frames_total.inc();
        metrics.frame_rate.set(anim.frame_rate());

        let elapsed = Duration::from_secs_f64(anim.clock() - start);
        let delay = budget.saturating_sub(elapsed);
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received.");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("Dome driver shutting down.");
    Ok(())
}
