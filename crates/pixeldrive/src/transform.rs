//! Composable coordinate transforms.
//!
//! A transform maps (pixel identity, local offset) to a point: the first
//! stage of every chain embeds the pixel's world position plus the offset,
//! and later stages reshape that point. Chains are immutable values; when a
//! placement or effect parameter changes, the owning mesh rebuilds the chain
//! from its stages rather than mutating it in place.

use std::f64::consts::TAU;
use std::sync::Arc;

use glam::DVec2;

use crate::params::{NumericParameter, ParamError, ParamScale};
use crate::pixel::MeshPixel;

/// Number of directions probed when estimating a transform's margins.
pub const MARGIN_PROBE_STEPS: usize = 64;

pub trait PixelTransform<P>: Send + Sync {
    /// Map a local offset from pixel `px`'s nominal position to a point in
    /// the chain's output space.
    fn project(&self, px: &P, offset: DVec2) -> DVec2;
}

/// A shared, immutable transform stage or chain.
pub type Chain<P> = Arc<dyn PixelTransform<P>>;

/// Stage that depends only on the incoming point.
pub struct PointFn<F>(pub F);

impl<P, F> PixelTransform<P> for PointFn<F>
where
    F: Fn(DVec2) -> DVec2 + Send + Sync,
{
    fn project(&self, _px: &P, offset: DVec2) -> DVec2 {
        (self.0)(offset)
    }
}

/// Stage that varies with the pixel's identity.
pub struct PixelFn<F>(pub F);

impl<P, F> PixelTransform<P> for PixelFn<F>
where
    F: Fn(&P, DVec2) -> DVec2 + Send + Sync,
{
    fn project(&self, px: &P, offset: DVec2) -> DVec2 {
        (self.0)(px, offset)
    }
}

struct Compound<P> {
    first: Chain<P>,
    second: Chain<P>,
}

impl<P> PixelTransform<P> for Compound<P> {
    fn project(&self, px: &P, offset: DVec2) -> DVec2 {
        self.second.project(px, self.first.project(px, offset))
    }
}

/// Left-to-right composition: `compound(a, b)` applies `a`, then `b`.
/// Composition is associative.
pub fn compound<P: 'static>(first: Chain<P>, second: Chain<P>) -> Chain<P> {
    Arc::new(Compound { first, second })
}

pub fn identity<P: 'static>() -> Chain<P> {
    Arc::new(PointFn(|p: DVec2| p))
}

/// Stage that anchors the chain at the pixel's world position: maps a local
/// offset to `position + offset`. Spacer pixels have no position and project
/// the bare offset; nothing downstream ever samples them.
pub fn embed<P: MeshPixel + 'static>() -> Chain<P> {
    Arc::new(PixelFn(|px: &P, offset: DVec2| {
        px.xy().unwrap_or_default() + offset
    }))
}

/// Estimate how far the transform displaces points at `radius` around the
/// reference pixel, as a component-wise maximum over probed directions. This
/// is exact for linear stages (scale, rotation) and a best-effort
/// approximation for non-linear ones (flap warp, viewport stretch); callers
/// pad bounding boxes with it, they do not rely on it as a hard bound.
pub fn probe_margins<P>(tx: &dyn PixelTransform<P>, reference: &P, radius: f64) -> DVec2 {
    let center = tx.project(reference, DVec2::ZERO);
    let mut margin = DVec2::ZERO;
    for i in 0..MARGIN_PROBE_STEPS {
        let theta = i as f64 / MARGIN_PROBE_STEPS as f64 * TAU;
        let probe = radius * DVec2::from_angle(theta);
        let displaced = (tx.project(reference, probe) - center).abs();
        margin = margin.max(displaced);
    }
    margin
}

/// User placement of the rendered content: offset, rotation and scale, each
/// independently tunable. The scale runs on a log slider so equal knob
/// travel feels like equal zoom.
#[derive(Debug, Clone)]
pub struct Placement {
    pub x_offset: NumericParameter,
    pub y_offset: NumericParameter,
    pub rotation: NumericParameter,
    pub scale: NumericParameter,
}

impl Placement {
    pub fn new() -> Result<Placement, ParamError> {
        Ok(Placement {
            x_offset: NumericParameter::new("xo")
                .with_bounds(-2.0, 2.0)
                .with_soft_limits()
                .with_sensitivity(0.01)
                .init(0.0)?,
            y_offset: NumericParameter::new("yo")
                .with_bounds(-2.0, 2.0)
                .with_soft_limits()
                .with_sensitivity(0.01)
                .init(0.0)?,
            rotation: NumericParameter::new("rot")
                .with_bounds(-std::f64::consts::PI, std::f64::consts::PI)
                .with_soft_limits()
                .with_sensitivity(0.01 * std::f64::consts::PI)
                .init(0.0)?,
            scale: NumericParameter::new("scale")
                .with_bounds((-1.0_f64).exp(), 1.0_f64.exp())
                .with_scale(ParamScale::Log)
                .with_sensitivity(0.01)
                .init(1.0)?,
        })
    }

    /// Snapshot the current parameter values into a chain stage: rotate,
    /// then scale, then translate.
    pub fn stage<P: 'static>(&self) -> Chain<P> {
        let rot = DVec2::from_angle(self.rotation.get());
        let scale = self.scale.get();
        let offset = DVec2::new(self.x_offset.get(), self.y_offset.get());
        Arc::new(PointFn(move |p: DVec2| rot.rotate(p) * scale + offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dot;

    impl MeshPixel for Dot {
        fn location(&self) -> crate::pixel::PixelLocation {
            crate::pixel::PixelLocation::Real(DVec2::new(1.0, 2.0))
        }
        fn channel(&self) -> usize {
            0
        }
    }

    fn scale_by<P: 'static>(k: f64) -> Chain<P> {
        Arc::new(PointFn(move |p: DVec2| p * k))
    }

    fn shift_by<P: 'static>(d: DVec2) -> Chain<P> {
        Arc::new(PointFn(move |p: DVec2| p + d))
    }

    #[test]
    fn compound_applies_left_to_right() {
        let tx = compound::<Dot>(scale_by(2.0), shift_by(DVec2::new(1.0, 0.0)));
        let p = tx.project(&Dot, DVec2::new(3.0, 4.0));
        assert_eq!(p, DVec2::new(7.0, 8.0));
    }

    #[test]
    fn compound_is_associative() {
        let a = || scale_by::<Dot>(2.0);
        let b = || shift_by::<Dot>(DVec2::new(1.0, -1.0));
        let c = || scale_by::<Dot>(0.5);
        let left = compound(compound(a(), b()), c());
        let right = compound(a(), compound(b(), c()));
        for i in 0..10 {
            let p = DVec2::new(i as f64 * 0.7, 3.0 - i as f64);
            assert!(
                (left.project(&Dot, p) - right.project(&Dot, p)).length() < 1e-12,
                "diverged at {p}"
            );
        }
    }

    #[test]
    fn embed_offsets_from_pixel_position() {
        let tx = embed::<Dot>();
        assert_eq!(tx.project(&Dot, DVec2::ZERO), DVec2::new(1.0, 2.0));
        assert_eq!(tx.project(&Dot, DVec2::new(0.5, 0.0)), DVec2::new(1.5, 2.0));
    }

    #[test]
    fn margins_exact_for_linear_stages() {
        // a pure scale maps a radius-r probe circle to radius k*r
        let tx = compound::<Dot>(embed(), scale_by(3.0));
        let m = probe_margins(tx.as_ref(), &Dot, 0.5);
        assert!((m.x - 1.5).abs() < 0.01, "{m}");
        assert!((m.y - 1.5).abs() < 0.01, "{m}");
    }

    #[test]
    fn placement_stage_round_trips() {
        let mut placement = Placement::new().unwrap();
        placement.x_offset.set(1.0);
        placement.scale.set(2.0);
        let tx = placement.stage::<Dot>();
        assert_eq!(tx.project(&Dot, DVec2::new(1.0, 0.0)), DVec2::new(3.0, 0.0));
    }
}
