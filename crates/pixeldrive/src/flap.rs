//! The flap warp: a periodic non-linear transform simulating a hinged
//! wing's open/close motion.
//!
//! Folding is modeled as a dilation of the x-axis about a vanishing point
//! just off the hinge-side edge of the pixel cloud, in a frame rotated by
//! the flap angle. The openness level L runs a raised-cosine envelope while
//! flapping is active; at L = 1 the warp is the identity. Stopping never
//! cuts the motion short: the end time rounds up to the next full period so
//! the wing always comes to rest fully open.
//!
//! State is shared: the mesh holds a clone ticked by the animation loop,
//! and the remote-control side holds another clone for the tuning methods.

use std::sync::Arc;

use glam::DVec2;
use parking_lot::Mutex;

use crate::mesh::{DriverTick, FrameDriver};
use crate::transform::{identity, Chain, PointFn};
use crate::util::{fmod, sine_easing};

// Tuning ranges, from the physical rig.
pub const FLAP_DEPTH_FULL: f64 = 0.01;
pub const FLAP_DEPTH_SHALLOW: f64 = 0.5;
pub const FLAP_ANGLE_MIN_DEG: f64 = -10.0;
pub const FLAP_ANGLE_MAX_DEG: f64 = 20.0;
pub const FLAP_PERIOD_MIN: f64 = 0.25;
pub const FLAP_PERIOD_MAX: f64 = 2.0;

/// Distance of the vanishing point beyond the hinge-side edge, in meters.
const VANISHING_POINT_OFFSET: f64 = 0.25;

/// Floor on the openness level inside the dilation; keeps the stretch
/// factor finite at full fold.
const MIN_LEVEL: f64 = 0.01;

#[derive(Debug)]
struct FlapState {
    angle: f64,
    depth: f64,
    period: f64,
    origin: f64,
    level: f64,
    start: Option<f64>,
    end: Option<f64>,
    was_active: bool,
}

impl FlapState {
    fn active_at(&self, now: f64) -> bool {
        match self.start {
            None => false,
            Some(_) => self.end.map_or(true, |end| now < end),
        }
    }
}

/// Shared flap state. Clones refer to the same underlying wing.
#[derive(Clone)]
pub struct Flap {
    state: Arc<Mutex<FlapState>>,
    positions: Arc<[DVec2]>,
}

impl Flap {
    /// `positions` are the world positions of the wing's visible pixels;
    /// the vanishing point is derived from them.
    pub fn new(positions: Vec<DVec2>) -> Flap {
        let flap = Flap {
            state: Arc::new(Mutex::new(FlapState {
                angle: 0.0,
                depth: FLAP_DEPTH_FULL,
                period: 0.5,
                origin: 0.0,
                level: 1.0,
                start: None,
                end: None,
                was_active: false,
            })),
            positions: positions.into(),
        };
        flap.set_angle(0.0);
        flap
    }

    /// Set the hinge angle, in radians. The vanishing point depends on the
    /// rotated pixel cloud and is recomputed on every change.
    pub fn set_angle(&self, angle: f64) {
        let rot = DVec2::from_angle(angle);
        let mut min_x = f64::INFINITY;
        for &p in self.positions.iter() {
            min_x = min_x.min(rot.rotate(p).x);
        }
        let mut s = self.state.lock();
        s.angle = angle;
        s.origin = min_x - VANISHING_POINT_OFFSET;
    }

    pub fn set_angle_slider(&self, frac: f64) {
        let frac = frac.clamp(0.0, 1.0);
        let deg = FLAP_ANGLE_MIN_DEG * (1.0 - frac) + FLAP_ANGLE_MAX_DEG * frac;
        self.set_angle(deg.to_radians());
    }

    /// Fold depth: slider 0 is a shallow flutter, 1 folds almost flat.
    pub fn set_depth_slider(&self, frac: f64) {
        let frac = frac.clamp(0.0, 1.0);
        self.state.lock().depth = FLAP_DEPTH_SHALLOW * (1.0 - frac) + FLAP_DEPTH_FULL * frac;
    }

    /// Flap period on a log slider between the rig's limits.
    pub fn set_period_slider(&self, frac: f64) {
        let frac = frac.clamp(0.0, 1.0);
        self.state.lock().period =
            FLAP_PERIOD_MAX * (FLAP_PERIOD_MIN / FLAP_PERIOD_MAX).powf(frac);
    }

    pub fn set_period(&self, period: f64) {
        self.state.lock().period = period.clamp(FLAP_PERIOD_MIN, FLAP_PERIOD_MAX);
    }

    /// Begin flapping at `now` (seconds on the animation clock). A running
    /// flap keeps its phase; only a pending stop is cancelled.
    pub fn start(&self, now: f64) {
        let mut s = self.state.lock();
        if !s.active_at(now) {
            s.start = Some(now);
        }
        s.end = None;
    }

    /// Schedule the flap to stop at the next full period boundary, so the
    /// envelope finishes its cycle instead of cutting.
    pub fn stop(&self, now: f64) {
        let mut s = self.state.lock();
        if let Some(start) = s.start {
            let periods = ((now - start) / s.period).ceil();
            s.end = Some(start + s.period * periods);
        }
    }

    pub fn level(&self) -> f64 {
        self.state.lock().level
    }

    /// Advance the envelope. Returns whether the warp changed this frame
    /// and whether it is actively animating.
    pub fn tick(&self, now: f64) -> DriverTick {
        let mut s = self.state.lock();
        let active = s.active_at(now);
        if active {
            let progress = fmod((now - s.start.expect("active flap without start")) / s.period, 1.0);
            let x = 1.0 - (2.0 * progress - 1.0).abs();
            let envelope = 1.0 - sine_easing(x);
            s.level = s.depth + envelope * (1.0 - s.depth);
        } else {
            s.level = 1.0;
        }
        let transition = active != s.was_active;
        s.was_active = active;
        DriverTick {
            changed: active || transition,
            animating: active,
        }
    }

    /// Snapshot the current warp as an immutable chain stage.
    pub fn stage<P: 'static>(&self) -> Chain<P> {
        let (angle, level, origin) = {
            let s = self.state.lock();
            (s.angle, s.level, s.origin)
        };
        if level >= 1.0 {
            return identity();
        }
        let rot = DVec2::from_angle(angle);
        let unrot = DVec2::from_angle(-angle);
        let stretch = 1.0 / level.max(MIN_LEVEL);
        Arc::new(PointFn(move |p: DVec2| {
            let p = rot.rotate(p);
            let p = DVec2::new((p.x - origin) * stretch + origin, p.y);
            unrot.rotate(p)
        }))
    }
}

impl<P: 'static> FrameDriver<P> for Flap {
    fn tick(&mut self, now: f64) -> DriverTick {
        Flap::tick(self, now)
    }

    fn stage(&self) -> Chain<P> {
        Flap::stage(self)
    }
}
