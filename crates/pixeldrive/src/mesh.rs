//! The pixel mesh: the ordered pixel list, per-pixel color state, channel
//! routing, and the composed transform chain layered over the geometry.
//!
//! Pixel order is fixed at construction and is the wire order the
//! controllers expect; it never changes afterwards. The chain is an
//! immutable value rebuilt from its stages whenever a placement or effect
//! parameter changes.

use anyhow::{bail, Result};
use glam::DVec2;

use crate::pixel::MeshPixel;
use crate::transform::{compound, embed, probe_margins, Chain, Placement, PointFn};

/// Result of ticking a mesh's frame driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverTick {
    /// The driver's warp stage changed this frame; the chain must be
    /// rebuilt and subsamples recomputed.
    pub changed: bool,
    /// The driver expects to keep changing every frame; samplers should
    /// trade antialiasing for responsiveness while this holds.
    pub animating: bool,
}

/// Optional per-frame behavior a geometry attaches at construction (e.g. the
/// wing flap envelope). The animation loop queries this capability instead
/// of knowing any concrete mesh kind.
pub trait FrameDriver<P>: Send {
    /// Advance internal state to `now`, reporting what changed.
    fn tick(&mut self, now: f64) -> DriverTick;

    /// Snapshot the driver's current warp as a chain stage, applied in
    /// world space right after the geometric embedding.
    fn stage(&self) -> Chain<P>;
}

/// How [`Mesh::stretch_to_viewport`] fits the pixel extent to a viewport.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Scale both axes by the same factor instead of stretching each to
    /// fill the viewport independently.
    pub preserve_aspect: bool,
    /// Extra per-axis scale, used to squeeze more viewport area onto
    /// geometry with irregular edges.
    pub x_scale: f64,
    pub y_scale: f64,
    /// Offset applied after the fit.
    pub offset: DVec2,
}

impl Default for FitOptions {
    fn default() -> FitOptions {
        FitOptions {
            preserve_aspect: true,
            x_scale: 1.0,
            y_scale: 1.0,
            offset: DVec2::ZERO,
        }
    }
}

pub struct Mesh<P: MeshPixel> {
    pixels: Vec<P>,
    colors: Vec<u32>,
    channel_count: usize,
    channel_sizes: Vec<usize>,
    radius: f64,
    pixel_buffer_radius: f64,

    base: Chain<P>,
    driver: Option<Box<dyn FrameDriver<P>>>,
    placement: Placement,
    symmetry: Option<Chain<P>>,
    fit: Option<Chain<P>>,

    chain: Chain<P>,
    chain_dirty: bool,
}

impl<P: MeshPixel + 'static> Mesh<P> {
    /// Assemble a mesh. `base` is the geometry's normalizing embedding
    /// (applied after the world-position stage and the driver's warp);
    /// `symmetry` mirrors or flips part of the structure after placement.
    ///
    /// Fails on empty or mis-routed pixel lists; geometry errors are fatal
    /// at startup, no partial mesh is ever built.
    pub fn new(
        pixels: Vec<P>,
        channel_count: usize,
        radius: f64,
        pixel_buffer_radius: f64,
        base: Chain<P>,
        driver: Option<Box<dyn FrameDriver<P>>>,
        symmetry: Option<Chain<P>>,
    ) -> Result<Mesh<P>> {
        if !pixels.iter().any(|p| !p.location().is_spacer()) {
            bail!("mesh has no visible pixels");
        }
        let mut channel_sizes = vec![0usize; channel_count];
        for px in &pixels {
            let ch = px.channel();
            if ch >= channel_count {
                bail!("pixel routed to channel {ch} but mesh has {channel_count} channels");
            }
            channel_sizes[ch] += 1;
        }
        let colors = vec![0u32; pixels.len()];
        let mut mesh = Mesh {
            pixels,
            colors,
            channel_count,
            channel_sizes,
            radius,
            pixel_buffer_radius,
            base,
            driver,
            placement: Placement::new()?,
            symmetry,
            fit: None,
            chain: crate::transform::identity(),
            chain_dirty: true,
        };
        mesh.rebuild_chain();
        Ok(mesh)
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[P] {
        &self.pixels
    }

    pub fn pixel(&self, index: usize) -> &P {
        &self.pixels[index]
    }

    /// All pixels, spacers included, in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &P)> {
        self.pixels.iter().enumerate()
    }

    /// Only the physical pixels, in wire order.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &P)> {
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.location().is_spacer())
    }

    pub fn visible_len(&self) -> usize {
        self.visible().count()
    }

    pub fn color(&self, index: usize) -> u32 {
        self.colors[index]
    }

    pub fn set_color(&mut self, index: usize, color: u32) {
        self.colors[index] = color;
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Pixel count per channel, spacers included. Computed once at build;
    /// dispatch buffers are sized from this exactly once.
    pub fn channel_sizes(&self) -> &[usize] {
        &self.channel_sizes
    }

    /// Copy the current colors into per-channel buffers, walking the pixel
    /// list in wire order and filling each buffer at a running index. The
    /// buffers must have been sized from [`Mesh::channel_sizes`].
    pub fn fill_channel_buffers(&self, buffers: &mut [Vec<u32>]) {
        debug_assert_eq!(buffers.len(), self.channel_count);
        let mut cursor = vec![0usize; self.channel_count];
        for (i, px) in self.pixels.iter().enumerate() {
            let ch = px.channel();
            buffers[ch][cursor[ch]] = self.colors[i];
            cursor[ch] += 1;
        }
    }

    /// Nominal world radius of the geometry, in meters.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Half the typical pixel pitch; the radius of the disk a pixel's
    /// antialiasing subsamples are drawn from.
    pub fn pixel_buffer_radius(&self) -> f64 {
        self.pixel_buffer_radius
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Mutable access to the placement parameters. Taking it marks the
    /// chain dirty, since callers take it to change them.
    pub fn placement_mut(&mut self) -> &mut Placement {
        self.chain_dirty = true;
        &mut self.placement
    }

    /// Tick the geometry's frame driver, if it has one.
    pub fn tick_driver(&mut self, now: f64) -> Option<DriverTick> {
        let tick = self.driver.as_mut().map(|d| d.tick(now));
        if let Some(t) = tick {
            if t.changed {
                self.chain_dirty = true;
            }
        }
        tick
    }

    pub fn mark_chain_dirty(&mut self) {
        self.chain_dirty = true;
    }

    pub fn chain_dirty(&self) -> bool {
        self.chain_dirty
    }

    /// The composed chain: embedding, driver warp, base, placement,
    /// symmetry, viewport fit.
    pub fn chain(&self) -> &Chain<P> {
        &self.chain
    }

    fn compose(&self, with_fit: bool) -> Chain<P> {
        let mut chain = embed::<P>();
        if let Some(driver) = &self.driver {
            chain = compound(chain, driver.stage());
        }
        chain = compound(chain, self.base.clone());
        chain = compound(chain, self.placement.stage());
        if let Some(symmetry) = &self.symmetry {
            chain = compound(chain, symmetry.clone());
        }
        if with_fit {
            if let Some(fit) = &self.fit {
                chain = compound(chain, fit.clone());
            }
        }
        chain
    }

    /// Rebuild the chain from the current stage values.
    pub fn rebuild_chain(&mut self) {
        self.chain = self.compose(true);
        self.chain_dirty = false;
    }

    /// Bounding rectangle of the transformed visible pixels, padded by the
    /// probed margins: (lower-left corner, size). Excludes the viewport-fit
    /// stage, since the fit is derived from this box.
    pub fn viewport(&self) -> (DVec2, DVec2) {
        let chain = self.compose(false);
        let mut min = DVec2::splat(f64::INFINITY);
        let mut max = DVec2::splat(f64::NEG_INFINITY);
        let mut reference = None;
        for (_, px) in self.visible() {
            let p = chain.project(px, DVec2::ZERO);
            min = min.min(p);
            max = max.max(p);
            reference.get_or_insert(px);
        }
        let reference = reference.expect("mesh has visible pixels");
        let margin = probe_margins(chain.as_ref(), reference, self.pixel_buffer_radius);
        (min - margin, max - min + 2.0 * margin)
    }

    /// Derive the transform that stretches the current pixel extent onto
    /// the [-1, 1] square viewport.
    pub fn stretch_to_viewport(&self, opts: &FitOptions) -> Chain<P> {
        let (corner, size) = self.viewport();
        let center = corner + 0.5 * size;
        let mut sx = 2.0 / size.x * opts.x_scale;
        let mut sy = 2.0 / size.y * opts.y_scale;
        if opts.preserve_aspect {
            let s = sx.min(sy);
            sx = s;
            sy = s;
        }
        let offset = opts.offset;
        std::sync::Arc::new(PointFn(move |p: DVec2| {
            DVec2::new((p.x - center.x) * sx, (p.y - center.y) * sy) + offset
        }))
    }

    /// Install (or replace) the viewport-fit stage at the end of the chain.
    pub fn fit_to_viewport(&mut self, opts: &FitOptions) {
        self.fit = Some(self.stretch_to_viewport(opts));
        self.chain_dirty = true;
    }

    pub fn clear_viewport_fit(&mut self) {
        self.fit = None;
        self.chain_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelLocation;
    use std::sync::Arc;

    struct TestPixel {
        loc: PixelLocation,
        ch: usize,
    }

    impl MeshPixel for TestPixel {
        fn location(&self) -> PixelLocation {
            self.loc
        }
        fn channel(&self) -> usize {
            self.ch
        }
    }

    fn px(x: f64, y: f64, ch: usize) -> TestPixel {
        TestPixel {
            loc: PixelLocation::Real(DVec2::new(x, y)),
            ch,
        }
    }

    fn spacer(ch: usize) -> TestPixel {
        TestPixel {
            loc: PixelLocation::Spacer,
            ch,
        }
    }

    fn square_mesh() -> Mesh<TestPixel> {
        let pixels = vec![px(-1.0, -1.0, 0), px(1.0, -1.0, 0), spacer(1), px(1.0, 1.0, 1), px(-1.0, 1.0, 1)];
        Mesh::new(
            pixels,
            2,
            1.0,
            0.1,
            crate::transform::identity(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn visible_iteration_skips_spacers() {
        let mesh = square_mesh();
        assert_eq!(mesh.len(), 5);
        assert_eq!(mesh.visible_len(), 4);
        assert!(mesh.visible().all(|(i, _)| i != 2));
    }

    #[test]
    fn channel_sizes_include_spacers() {
        let mesh = square_mesh();
        assert_eq!(mesh.channel_sizes(), &[2, 3]);
    }

    #[test]
    fn channel_buffers_preserve_wire_order() {
        let mut mesh = square_mesh();
        for i in 0..mesh.len() {
            mesh.set_color(i, i as u32 + 1);
        }
        let mut buffers: Vec<Vec<u32>> =
            mesh.channel_sizes().iter().map(|&n| vec![0; n]).collect();
        mesh.fill_channel_buffers(&mut buffers);
        assert_eq!(buffers[0], vec![1, 2]);
        assert_eq!(buffers[1], vec![3, 4, 5]);
    }

    #[test]
    fn misrouted_pixel_is_fatal() {
        let res = Mesh::new(
            vec![px(0.0, 0.0, 3)],
            2,
            1.0,
            0.1,
            crate::transform::identity(),
            None,
            None,
        );
        assert!(res.is_err());
    }

    #[test]
    fn all_spacers_is_fatal() {
        let res = Mesh::new(
            vec![spacer(0)],
            1,
            1.0,
            0.1,
            crate::transform::identity(),
            None,
            None,
        );
        assert!(res.is_err());
    }

    #[test]
    fn viewport_covers_pixels_with_margin() {
        let mesh = square_mesh();
        let (corner, size) = mesh.viewport();
        // pixels span [-1,1]^2, margins add the buffer radius each side
        assert!((corner.x - -1.1).abs() < 0.01, "{corner}");
        assert!((corner.y - -1.1).abs() < 0.01, "{corner}");
        assert!((size.x - 2.2).abs() < 0.02, "{size}");
        assert!((size.y - 2.2).abs() < 0.02, "{size}");
    }

    #[test]
    fn placement_scale_grows_viewport() {
        let mut mesh = square_mesh();
        mesh.placement_mut().scale.set(2.0);
        mesh.rebuild_chain();
        let (_, size) = mesh.viewport();
        assert!((size.x - 4.4).abs() < 0.05, "{size}");
    }

    #[test]
    fn stretch_to_viewport_normalizes_extent() {
        let mut mesh = square_mesh();
        mesh.fit_to_viewport(&FitOptions::default());
        mesh.rebuild_chain();
        let chain = mesh.chain().clone();
        for (_, px) in mesh.visible() {
            let p = chain.project(px, DVec2::ZERO);
            assert!(p.x.abs() <= 1.0 + 1e-9 && p.y.abs() <= 1.0 + 1e-9, "{p}");
        }
    }

    #[test]
    fn placement_mut_marks_chain_dirty() {
        let mut mesh = square_mesh();
        mesh.rebuild_chain();
        assert!(!mesh.chain_dirty());
        mesh.placement_mut().x_offset.set(0.5);
        assert!(mesh.chain_dirty());
    }

    #[test]
    fn symmetry_stage_sees_pixel_identity() {
        let pixels = vec![px(1.0, 0.0, 0), px(1.0, 0.0, 1)];
        let symmetry: Chain<TestPixel> = Arc::new(crate::transform::PixelFn(
            |px: &TestPixel, p: DVec2| {
                if px.channel() == 1 {
                    DVec2::new(-p.x, p.y)
                } else {
                    p
                }
            },
        ));
        let mesh = Mesh::new(
            pixels,
            2,
            1.0,
            0.1,
            crate::transform::identity(),
            None,
            Some(symmetry),
        )
        .unwrap();
        let chain = mesh.chain();
        assert_eq!(
            chain.project(mesh.pixel(0), DVec2::ZERO),
            DVec2::new(1.0, 0.0)
        );
        assert_eq!(
            chain.project(mesh.pixel(1), DVec2::ZERO),
            DVec2::new(-1.0, 0.0)
        );
    }
}
