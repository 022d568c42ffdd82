//! Wing geometry: two mirrored wings whose pixel positions come from
//! measured layout data rather than a lattice.
//!
//! The geometry input is an ordered list of world positions per wing, with
//! spacer slots marking reserved addresses; how that list is produced is the
//! caller's business. Each wing is one output channel. The second wing can
//! track the first in several display modes, and the flap warp rides along
//! as the mesh's frame driver.

use std::sync::Arc;

use anyhow::{bail, Result};
use glam::DVec2;
use parking_lot::Mutex;

use crate::flap::Flap;
use crate::mesh::{DriverTick, FrameDriver, Mesh};
use crate::pixel::{MeshPixel, PixelLocation};
use crate::transform::{Chain, PixelFn};

/// Width of the platform separating the wing roots, in meters.
pub const PLATFORM_WIDTH: f64 = 1.0;

/// Tip-to-tip span of the structure, in meters (platform included).
pub const WINGSPAN: f64 = 15.5;

pub const WING_COUNT: usize = 2;

/// Measured pitch between neighboring wing pixels, in meters. The sample
/// buffer radius is shrunk below the usual half pitch to account for the
/// denser regions of the wing.
const WING_PIXEL_SPACING: f64 = 0.15;

/// How the second wing maps relative to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WingMode {
    /// Both wings form one canvas, matching their physical arrangement.
    Unified,
    /// The second wing repeats the first exactly.
    Mirror,
    /// The second wing is the first flipped across the vertical axis of
    /// the placed content.
    FlipHoriz,
}

#[derive(Debug, Clone, Copy)]
pub struct WingPixel {
    /// 0 = left, 1 = right, from the creature's own perspective.
    pub wing: usize,
    pub index: usize,
    location: PixelLocation,
}

impl MeshPixel for WingPixel {
    fn location(&self) -> PixelLocation {
        self.location
    }

    fn channel(&self) -> usize {
        self.wing
    }
}

struct ModeCell {
    mode: WingMode,
    epoch: u64,
}

/// Remote-control handle for the wing rig: display mode plus the flap
/// envelope. Clones share state with the mesh.
#[derive(Clone)]
pub struct WingControl {
    mode: Arc<Mutex<ModeCell>>,
    pub flap: Flap,
}

impl WingControl {
    pub fn mode(&self) -> WingMode {
        self.mode.lock().mode
    }

    pub fn set_mode(&self, mode: WingMode) {
        let mut cell = self.mode.lock();
        if cell.mode != mode {
            cell.mode = mode;
            cell.epoch += 1;
            tracing::info!(?mode, "wing display mode set");
        }
    }
}

/// Frame driver for the wing rig: advances the flap envelope and notices
/// display-mode flips, so the loop rebuilds the chain on either.
struct WingDriver {
    flap: Flap,
    mode: Arc<Mutex<ModeCell>>,
    seen_epoch: u64,
}

impl FrameDriver<WingPixel> for WingDriver {
    fn tick(&mut self, now: f64) -> DriverTick {
        let tick = self.flap.tick(now);
        let epoch = self.mode.lock().epoch;
        let mode_changed = epoch != self.seen_epoch;
        self.seen_epoch = epoch;
        DriverTick {
            changed: tick.changed || mode_changed,
            animating: tick.animating,
        }
    }

    fn stage(&self) -> Chain<WingPixel> {
        self.flap.stage()
    }
}

fn realign(layout: &[PixelLocation]) -> Result<Vec<PixelLocation>> {
    let mut min_x = f64::INFINITY;
    for loc in layout {
        if let Some(p) = loc.xy() {
            min_x = min_x.min(p.x);
        }
    }
    if !min_x.is_finite() {
        bail!("wing layout has no physical pixels");
    }
    // root the wing at half the platform width and flip the y-axis, which
    // the layout data has reversed
    Ok(layout
        .iter()
        .map(|loc| match loc.xy() {
            Some(p) => {
                PixelLocation::Real(DVec2::new(p.x - min_x + 0.5 * PLATFORM_WIDTH, -p.y))
            }
            None => PixelLocation::Spacer,
        })
        .collect())
}

/// Build the two-wing mesh from per-wing layouts. A single layout is shared
/// by both wings; otherwise exactly one layout per wing is required, in
/// wing order. Returns the mesh and the shared control handle.
pub fn wing_mesh(layouts: &[Vec<PixelLocation>]) -> Result<(Mesh<WingPixel>, WingControl)> {
    if layouts.is_empty() {
        bail!("no wing pixel layout provided");
    }
    if layouts.len() != 1 && layouts.len() != WING_COUNT {
        bail!(
            "number of pixel layouts ({}) matches neither 1 nor the number of wings ({})",
            layouts.len(),
            WING_COUNT
        );
    }

    let realigned: Vec<Vec<PixelLocation>> =
        layouts.iter().map(|l| realign(l)).collect::<Result<_>>()?;

    let mut pixels = Vec::new();
    for wing in 0..WING_COUNT {
        let layout = &realigned[if realigned.len() == 1 { 0 } else { wing }];
        for (index, &location) in layout.iter().enumerate() {
            pixels.push(WingPixel {
                wing,
                index,
                location,
            });
        }
    }
    tracing::info!(pixels = pixels.len(), "built wing layout");

    let positions: Vec<DVec2> = pixels.iter().filter_map(|p| p.xy()).collect();
    let flap = Flap::new(positions);
    let mode = Arc::new(Mutex::new(ModeCell {
        mode: WingMode::Unified,
        epoch: 0,
    }));

    // In unified mode the second wing's content is mirrored so the pair
    // reads as one canvas; everything is then normalized by the wingspan.
    let base_mode = mode.clone();
    let base: Chain<WingPixel> = Arc::new(PixelFn(move |px: &WingPixel, p: DVec2| {
        let p = if px.wing == 1 && base_mode.lock().mode == WingMode::Unified {
            DVec2::new(-p.x, p.y)
        } else {
            p
        };
        p * (2.0 / WINGSPAN)
    }));

    let sym_mode = mode.clone();
    let symmetry: Chain<WingPixel> = Arc::new(PixelFn(move |px: &WingPixel, p: DVec2| {
        if px.wing == 1 && sym_mode.lock().mode == WingMode::FlipHoriz {
            DVec2::new(-p.x, p.y)
        } else {
            p
        }
    }));

    let driver = WingDriver {
        flap: flap.clone(),
        mode: mode.clone(),
        seen_epoch: 0,
    };

    let mesh = Mesh::new(
        pixels,
        WING_COUNT,
        0.5 * WINGSPAN,
        0.5 * WING_PIXEL_SPACING * 0.7,
        base,
        Some(Box::new(driver)),
        Some(symmetry),
    )?;

    Ok((mesh, WingControl { mode, flap }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn layout() -> Vec<PixelLocation> {
        vec![
            PixelLocation::Real(DVec2::new(2.0, 1.0)),
            PixelLocation::Spacer,
            PixelLocation::Real(DVec2::new(4.5, -0.5)),
        ]
    }

    #[test]
    fn shared_layout_populates_both_wings() {
        let (mesh, _ctl) = wing_mesh(&[layout()]).unwrap();
        assert_eq!(mesh.len(), 6);
        assert_eq!(mesh.visible_len(), 4);
        assert_eq!(mesh.channel_sizes(), &[3, 3]);
    }

    #[test]
    fn layout_is_realigned_to_platform() {
        let (mesh, _ctl) = wing_mesh(&[layout()]).unwrap();
        // min x (2.0) moves to half the platform width, y flips
        let p = mesh.pixel(0).xy().unwrap();
        assert!((p - DVec2::new(0.5, -1.0)).length() < 1e-12);
        let p = mesh.pixel(2).xy().unwrap();
        assert!((p - DVec2::new(3.0, 0.5)).length() < 1e-12);
    }

    #[test]
    fn unified_mode_mirrors_second_wing() {
        let (mesh, ctl) = wing_mesh(&[layout()]).unwrap();
        assert_eq!(ctl.mode(), WingMode::Unified);
        let chain = mesh.chain();
        let left = chain.project(mesh.pixel(0), DVec2::ZERO);
        let right = chain.project(mesh.pixel(3), DVec2::ZERO);
        assert!((left.x + right.x).abs() < 1e-12, "mirrored x");
        assert!((left.y - right.y).abs() < 1e-12);
    }

    #[test]
    fn mirror_mode_repeats_first_wing() {
        let (mut mesh, ctl) = wing_mesh(&[layout()]).unwrap();
        ctl.set_mode(WingMode::Mirror);
        let tick = mesh.tick_driver(0.0).unwrap();
        assert!(tick.changed && !tick.animating);
        mesh.rebuild_chain();
        let chain = mesh.chain();
        let left = chain.project(mesh.pixel(0), DVec2::ZERO);
        let right = chain.project(mesh.pixel(3), DVec2::ZERO);
        assert!((left - right).length() < 1e-12);
    }

    #[test]
    fn mode_change_flags_one_tick_only() {
        let (mut mesh, ctl) = wing_mesh(&[layout()]).unwrap();
        let tick = mesh.tick_driver(0.0).unwrap();
        assert!(!tick.changed);
        ctl.set_mode(WingMode::FlipHoriz);
        assert!(mesh.tick_driver(0.1).unwrap().changed);
        mesh.rebuild_chain();
        assert!(!mesh.tick_driver(0.2).unwrap().changed);
    }

    #[test]
    fn wrong_layout_count_is_fatal() {
        let three = vec![layout(), layout(), layout()];
        assert!(wing_mesh(&three).is_err());
        assert!(wing_mesh(&[]).is_err());
    }

    #[test]
    fn spacer_only_layout_is_fatal() {
        assert!(wing_mesh(&[vec![PixelLocation::Spacer]]).is_err());
    }
}
