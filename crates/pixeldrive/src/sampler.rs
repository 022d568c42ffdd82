//! Spatial and temporal antialiasing.
//!
//! Each visible pixel gets one or more subsample points, precomputed in an
//! intermediate representation whenever the transform chain changes, then
//! blended every frame from the externally supplied color function. While
//! the chain reports itself animating the sampler switches to a lower
//! dynamic subsample count, trading antialiasing for responsiveness.

use glam::DVec2;
use rand::Rng;
use smallvec::SmallVec;

use crate::color;
use crate::mesh::Mesh;
use crate::pixel::MeshPixel;

pub const DEFAULT_BASE_SUBSAMPLING: usize = 1;
pub const MAX_SUBSAMPLING: usize = 64;

/// The external color collaborator: renders one subsample at a time and
/// owns the hooks around a frame.
pub trait SampleSource {
    /// Render one subsample at intermediate-space point `ir` and clock time
    /// `t`. The default adds a temporal jitter of up to half a frame each
    /// way and delegates to [`SampleSource::sample_point_blurred`]; override
    /// this instead if motion blur is irrelevant.
    fn sample_point(&mut self, ir: DVec2, t: f64, frame_rate: f64) -> u32 {
        let jitter = if frame_rate > 0.0 {
            (rand::thread_rng().gen::<f64>() - 0.5) / frame_rate
        } else {
            0.0
        };
        self.sample_point_blurred(ir, t + jitter, jitter)
    }

    /// Render one subsample with the applied temporal jitter passed in, for
    /// sources that can exploit it for motion blur.
    fn sample_point_blurred(&mut self, _ir: DVec2, _t: f64, _jitter: f64) -> u32 {
        unimplemented!("override sample_point or sample_point_blurred")
    }

    /// Convert a chain-output point into whatever representation makes the
    /// per-frame sampling cheap (screen pixels, a UV-mapped texture, ...).
    fn to_intermediate(&self, p: DVec2) -> DVec2 {
        p
    }

    /// Extra subsampling factor for regions that need it.
    fn subsampling_boost(&self, _p: DVec2) -> f64 {
        1.0
    }

    /// Combine a pixel's subsample colors. Unweighted average by default.
    fn blend(&self, samples: &[u32]) -> u32 {
        color::blend(samples)
    }

    fn pre_frame(&mut self, _t: f64, _dt: f64) {}

    fn post_frame(&mut self, _t: f64) {}
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    /// Subsamples per pixel under a steady transform.
    pub base: usize,
    /// Subsamples per pixel while the transform is animating.
    pub dynamic: usize,
}

impl SamplerSettings {
    pub fn new(base: usize) -> SamplerSettings {
        let base = base.max(1);
        SamplerSettings {
            base,
            dynamic: (0.3 * base as f64).ceil() as usize,
        }
    }
}

impl Default for SamplerSettings {
    fn default() -> SamplerSettings {
        SamplerSettings::new(DEFAULT_BASE_SUBSAMPLING)
    }
}

pub struct SamplingEngine {
    settings: SamplerSettings,
    animating: bool,
    /// Subsample points per pixel index; spacer pixels hold empty lists.
    samples: Vec<Vec<DVec2>>,
}

impl SamplingEngine {
    pub fn new(settings: SamplerSettings) -> SamplingEngine {
        SamplingEngine {
            settings,
            animating: false,
            samples: Vec::new(),
        }
    }

    /// Chain-animating notification from the frame loop.
    pub fn transform_animating(&mut self, animating: bool) {
        self.animating = animating;
    }

    pub fn num_subsamples(&self, boost: f64) -> usize {
        let base = if self.animating {
            self.settings.dynamic
        } else {
            self.settings.base
        };
        ((base as f64 * boost).ceil() as usize).clamp(1, MAX_SUBSAMPLING)
    }

    /// Chain-changed notification: recompute every visible pixel's
    /// subsample set against the mesh's current chain. Subsamples beyond
    /// the first jitter inside a disk of the mesh's pixel-buffer radius.
    pub fn transform_changed<P, S>(&mut self, mesh: &Mesh<P>, source: &S)
    where
        P: MeshPixel + 'static,
        S: SampleSource,
    {
        let chain = mesh.chain();
        let radius = mesh.pixel_buffer_radius();
        let mut rng = rand::thread_rng();
        self.samples = vec![Vec::new(); mesh.len()];
        let mut total = 0usize;
        for (i, px) in mesh.visible() {
            let nominal = chain.project(px, DVec2::ZERO);
            let count = self.num_subsamples(source.subsampling_boost(nominal));
            let jitter = count > 1;
            let list = &mut self.samples[i];
            list.reserve(count);
            for _ in 0..count {
                let offset = if jitter {
                    let r = rng.gen::<f64>() * radius;
                    let theta = rng.gen::<f64>() * std::f64::consts::TAU;
                    r * DVec2::from_angle(theta)
                } else {
                    DVec2::ZERO
                };
                list.push(source.to_intermediate(chain.project(px, offset)));
            }
            total += count;
        }
        let pixels = mesh.visible_len();
        tracing::debug!(
            subsamples = total,
            pixels,
            avg = total as f64 / pixels as f64,
            "recomputed subsample map"
        );
    }

    /// Blend one pixel's subsamples for this frame. Every visible pixel has
    /// at least one subsample; rendering a pixel without any is a defect.
    pub fn render_pixel<S: SampleSource>(
        &self,
        index: usize,
        t: f64,
        frame_rate: f64,
        source: &mut S,
    ) -> u32 {
        let subs = &self.samples[index];
        debug_assert!(!subs.is_empty(), "pixel {index} has no subsamples");
        let colors: SmallVec<[u32; 16]> = subs
            .iter()
            .map(|&ir| source.sample_point(ir, t, frame_rate))
            .collect();
        source.blend(&colors)
    }

    pub fn subsamples(&self, index: usize) -> &[DVec2] {
        &self.samples[index]
    }
}
