use clap::Parser;

/// `dome_driver` - drives a triangular-panel dome over Open Pixel Control.
///
/// Renders a built-in test pattern onto one of the defined dome layouts and
/// streams the frames to a lighting controller, reconnecting as the
/// controller comes and goes.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Hostname of the OPC controller endpoint.
    #[arg(long, env = "OPC_HOST", default_value = "127.0.0.1")]
    pub opc_host: String,

    /// Port of the OPC controller endpoint.
    #[arg(long, env = "OPC_PORT", default_value_t = pixeldrive::dispatch::DEFAULT_OPC_PORT)]
    pub opc_port: u16,

    /// Total panel count of the structure; must be one of the defined
    /// layouts (2, 6, 13 or 24).
    #[arg(long, env = "NUM_PANELS", default_value_t = 24)]
    pub num_panels: u32,

    /// Pixels along one panel edge.
    #[arg(long, env = "PANEL_SIZE", default_value_t = pixeldrive::dome::PANEL_SIZE)]
    pub panel_size: u32,

    /// Upper bound on the frame rate.
    #[arg(long, env = "MAX_FPS", default_value_t = 60.0)]
    pub max_fps: f64,

    /// Antialiasing subsamples per pixel.
    #[arg(long, env = "SUBSAMPLING", default_value_t = pixeldrive::sampler::DEFAULT_BASE_SUBSAMPLING)]
    pub subsampling: usize,

    /// Gamma for the controller's color correction.
    #[arg(long, env = "OPC_GAMMA", default_value_t = 2.5)]
    pub gamma: f64,

    /// Listen address for the Prometheus metrics server, e.g.
    /// 127.0.0.1:9090. Disabled when unset.
    #[arg(long, env = "METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<String>,
}
