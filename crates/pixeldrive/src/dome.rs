//! Dome geometry: triangular panels on the lattice layouts from `trigrid`.

use anyhow::Result;
use glam::DVec2;
use std::sync::Arc;

use trigrid::{pixel_spacing, GridCoord, PanelLayout};

use crate::mesh::Mesh;
use crate::pixel::{MeshPixel, PixelLocation};
use crate::transform::PointFn;

/// Pixels along one edge of the panels actually manufactured.
pub const PANEL_SIZE: u32 = 15;

/// One lattice pixel of the dome. All dome pixels are driven through a
/// single output channel.
#[derive(Debug, Clone, Copy)]
pub struct DomePixel {
    pub coord: GridCoord,
    xy: DVec2,
}

impl MeshPixel for DomePixel {
    fn location(&self) -> PixelLocation {
        PixelLocation::Real(self.xy)
    }

    fn channel(&self) -> usize {
        0
    }
}

/// Build the mesh for a dome with the given total panel count (one of the
/// defined layouts) and panel size. Unknown panel counts fail here, before
/// any mesh state exists.
pub fn dome_mesh(panel_count: u32, panel_size: u32) -> Result<Mesh<DomePixel>> {
    let layout = PanelLayout::from_panel_count(panel_count)?;
    let pixels: Vec<DomePixel> = layout
        .fill(panel_size)
        .into_iter()
        .map(|coord| DomePixel {
            coord,
            xy: coord.xy(),
        })
        .collect();
    tracing::info!(panels = panel_count, pixels = pixels.len(), "built dome layout");

    // normalize the layout onto the unit circle
    let offset = layout.offset();
    let radius = layout.radius();
    let base = Arc::new(PointFn(move |p: DVec2| (p - offset) / radius));

    Mesh::new(
        pixels,
        1,
        radius,
        0.5 * pixel_spacing(panel_size),
        base,
        None,
        None,
    )
}
