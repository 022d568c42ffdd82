//! The frame loop: ties the mesh, sampler, color source and dispatcher
//! together and keeps a smoothed frame-rate estimate.

use std::time::{Duration, Instant};

use crate::dispatch::Dispatcher;
use crate::mesh::Mesh;
use crate::pixel::MeshPixel;
use crate::sampler::{SampleSource, SamplingEngine};

/// Exponential smoothing factor for the frame-time average; higher is
/// smoother.
pub const FRAMERATE_SMOOTHING: f64 = 0.9;

const FRAMERATE_LOG_INTERVAL: u64 = 300;

pub struct AnimationLoop<P: MeshPixel + 'static, S: SampleSource> {
    mesh: Mesh<P>,
    sampler: SamplingEngine,
    source: S,
    dispatcher: Dispatcher,
    epoch: Instant,
    last_t: f64,
    frame_rate: f64,
    frames: u64,
    initialized: bool,
}

impl<P: MeshPixel + 'static, S: SampleSource> AnimationLoop<P, S> {
    pub fn new(
        mesh: Mesh<P>,
        sampler: SamplingEngine,
        source: S,
        dispatcher: Dispatcher,
    ) -> AnimationLoop<P, S> {
        AnimationLoop {
            mesh,
            sampler,
            source,
            dispatcher,
            epoch: Instant::now(),
            last_t: 0.0,
            frame_rate: 0.0,
            frames: 0,
            initialized: false,
        }
    }

    /// Seconds since the loop was created; the time base handed to the
    /// color source and the flap envelope.
    pub fn clock(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Smoothed frames per second; 0 until the first frame completes.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn mesh(&self) -> &Mesh<P> {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh<P> {
        &mut self.mesh
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Compute and dispatch one frame at clock time `t`.
    pub fn draw(&mut self, t: f64) {
        if !self.initialized {
            self.mesh.rebuild_chain();
            self.sampler.transform_changed(&self.mesh, &self.source);
            self.last_t = t;
            self.initialized = true;
        }

        if let Some(tick) = self.mesh.tick_driver(t) {
            self.sampler.transform_animating(tick.animating);
        }
        if self.mesh.chain_dirty() {
            self.mesh.rebuild_chain();
            self.sampler.transform_changed(&self.mesh, &self.source);
        }

        let dt = t - self.last_t;
        self.last_t = t;
        self.update_frame_rate(dt);

        self.source.pre_frame(t, dt);
        for i in 0..self.mesh.len() {
            if self.mesh.pixel(i).location().is_spacer() {
                continue;
            }
            let color = self
                .sampler
                .render_pixel(i, t, self.frame_rate, &mut self.source);
            self.mesh.set_color(i, color);
        }
        self.source.post_frame(t);

        self.dispatcher.dispatch(&self.mesh);

        self.frames += 1;
        if self.frames % FRAMERATE_LOG_INTERVAL == 0 {
            tracing::debug!(fps = self.frame_rate, frames = self.frames, "frame loop");
        }
    }

    /// Self-driving loop: draws at up to `max_fps`, sleeping the remaining
    /// frame budget (never negative). Runs until the task is dropped.
    pub async fn run(mut self, max_fps: f64) {
        let budget = 1.0 / max_fps;
        loop {
            let start = self.clock();
            self.draw(start);
            let elapsed = self.clock() - start;
            let delay = (budget - elapsed).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    fn update_frame_rate(&mut self, frame_t: f64) {
        if frame_t <= 0.0 {
            return;
        }
        let avg = if self.frame_rate <= 0.0 {
            frame_t
        } else {
            1.0 / self.frame_rate
        };
        let avg = FRAMERATE_SMOOTHING * avg + (1.0 - FRAMERATE_SMOOTHING) * frame_t;
        self.frame_rate = 1.0 / avg;
    }
}
