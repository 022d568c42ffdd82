//! Triangular-lattice coordinate math and panel tiling for segmented LED
//! structures.
//!
//! The lattice is oriented so triangle edges run horizontally and at +/-60
//! degrees. For an axial coordinate (u, v), u increases along the direction
//! 60 degrees counter-clockwise from the +x axis, and v increases along the
//! +x axis itself. A [`TriCoord`] names one triangle of the grid: the anchor
//! vertex (u, v) plus an orientation:
//!
//! - `Orient::A` - horizontal edge at the bottom; corners (u,v) (u+1,v) (u,v+1)
//! - `Orient::B` - horizontal edge at the top; corners (u+1,v+1) (u,v+1) (u+1,v)
//!
//! The same type addresses three nested scales:
//!
//! - universal: one pixel triangle anywhere on the structure
//! - panel: one physical panel (a triangle of `n` pixels per edge)
//! - pixel: a pixel within a single panel, in the panel's local frame
//!
//! [`GridCoord`] binds the three together for a fixed panel size. The
//! decomposition is a bijection: splitting a universal coordinate into
//! (panel, pixel) and recombining returns the original coordinate, for any
//! panel size.
//!
//! Panels are filled in a boustrophedon order (row by row, alternating
//! direction) so that consecutive indices are physically adjacent, which is
//! what the controller wiring expects. Composite structures are declared as
//! fans of panels swept clockwise around a hexagonal sector; the named
//! [`PanelLayout`]s cover the structures that have actually been built.

use glam::{DVec2, IVec2};
use thiserror::Error;

pub const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Offsets applied on top of the axial rotation when rotating a triangle
/// coordinate k * 60 degrees clockwise about the origin. Indexed by k mod 6.
const ROT_OFFSETS: [(i32, i32); 6] = [(0, 0), (-1, 0), (-1, 0), (-1, -1), (0, -1), (0, -1)];

/// Which way a triangle (or panel) points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orient {
    /// Horizontal edge at the bottom.
    A,
    /// Horizontal edge at the top.
    B,
}

impl Orient {
    pub fn flipped(self) -> Orient {
        match self {
            Orient::A => Orient::B,
            Orient::B => Orient::A,
        }
    }
}

/// Coordinate of a single triangle in the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriCoord {
    pub u: i32,
    pub v: i32,
    pub orient: Orient,
}

impl TriCoord {
    pub fn new(u: i32, v: i32, orient: Orient) -> TriCoord {
        TriCoord { u, v, orient }
    }

    pub fn a(u: i32, v: i32) -> TriCoord {
        TriCoord::new(u, v, Orient::A)
    }

    pub fn b(u: i32, v: i32) -> TriCoord {
        TriCoord::new(u, v, Orient::B)
    }

    /// Rotate this coordinate k * 60 degrees clockwise around the lattice
    /// origin. Orientation flips on odd k; the anchor moves through the
    /// fixed offset table. Satisfies rotate(rotate(c, k1), k2) ==
    /// rotate(c, k1 + k2).
    pub fn rotate(self, k: i32) -> TriCoord {
        // A B-triangle is the point reflection of an A-triangle, i.e. an A
        // coordinate rotated a further 3 steps.
        let (u, v, k) = match self.orient {
            Orient::A => (self.u, self.v, k.rem_euclid(6)),
            Orient::B => (-self.u - 1, -self.v - 1, (k + 3).rem_euclid(6)),
        };
        let k = k as usize;
        let (mut ru, mut rv) = (u, v);
        for _ in 0..k {
            // one 60-degree clockwise step in the axial basis
            let t = ru;
            ru = -rv;
            rv = t + rv;
        }
        let (du, dv) = ROT_OFFSETS[k];
        let orient = if k % 2 == 0 { Orient::A } else { Orient::B };
        TriCoord::new(ru + du, rv + dv, orient)
    }

    /// The three axial corner vertices of this triangle.
    pub fn corners(self) -> [IVec2; 3] {
        let (u, v) = (self.u, self.v);
        match self.orient {
            Orient::A => [
                IVec2::new(u, v),
                IVec2::new(u + 1, v),
                IVec2::new(u, v + 1),
            ],
            Orient::B => [
                IVec2::new(u + 1, v + 1),
                IVec2::new(u, v + 1),
                IVec2::new(u + 1, v),
            ],
        }
    }
}

/// A pixel address carrying its universal coordinate together with the
/// (panel, within-panel) decomposition for a fixed panel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub universal: TriCoord,
    pub panel: TriCoord,
    pub pixel: TriCoord,
    pub panel_size: u32,
}

impl GridCoord {
    pub fn from_universal(universal: TriCoord, panel_size: u32) -> GridCoord {
        GridCoord {
            universal,
            panel: to_panel(universal, panel_size),
            pixel: to_pixel(universal, panel_size),
            panel_size,
        }
    }

    pub fn from_parts(panel: TriCoord, pixel: TriCoord, panel_size: u32) -> GridCoord {
        GridCoord {
            universal: to_universal(panel, pixel, panel_size),
            panel,
            pixel,
            panel_size,
        }
    }

    /// Cartesian position of this pixel, in panel-edge units.
    pub fn xy(&self) -> DVec2 {
        coord_to_xy(self)
    }
}

fn split(uni: TriCoord, n: u32) -> (TriCoord, TriCoord) {
    let n = n as i32;
    let (p, q) = (uni.u.div_euclid(n), uni.v.div_euclid(n));
    let (ru, rv) = (uni.u.rem_euclid(n), uni.v.rem_euclid(n));
    // An A panel owns the A triangles of its cell up to row+col n-1 and the
    // B triangles up to n-2; everything else belongs to the B panel sharing
    // the cell, whose local frame is the point reflection of the A frame.
    let limit = match uni.orient {
        Orient::A => n - 1,
        Orient::B => n - 2,
    };
    if ru + rv <= limit {
        (TriCoord::a(p, q), TriCoord::new(ru, rv, uni.orient))
    } else {
        (
            TriCoord::b(p, q),
            TriCoord::new(n - 1 - ru, n - 1 - rv, uni.orient.flipped()),
        )
    }
}

/// Panel component of a universal coordinate.
pub fn to_panel(uni: TriCoord, panel_size: u32) -> TriCoord {
    split(uni, panel_size).0
}

/// Within-panel component of a universal coordinate.
pub fn to_pixel(uni: TriCoord, panel_size: u32) -> TriCoord {
    split(uni, panel_size).1
}

/// Recombine a (panel, pixel) pair into the universal coordinate.
pub fn to_universal(panel: TriCoord, pixel: TriCoord, panel_size: u32) -> TriCoord {
    let n = panel_size as i32;
    match panel.orient {
        Orient::A => TriCoord::new(n * panel.u + pixel.u, n * panel.v + pixel.v, pixel.orient),
        Orient::B => TriCoord::new(
            n * panel.u + n - 1 - pixel.u,
            n * panel.v + n - 1 - pixel.v,
            pixel.orient.flipped(),
        ),
    }
}

/// Spacing between grid points of a panel with n pixels per edge, chosen so
/// that the distance from an edge pixel to the opposing pixel of the
/// neighboring panel visually matches the in-panel pitch despite the
/// physical seam.
pub fn pixel_spacing(n: u32) -> f64 {
    1.0 / (n as f64 - 1.0 + SQRT_3)
}

/// Number of pixels in a single panel with n pixels per edge.
pub fn pixels_per_panel(n: u32) -> u32 {
    n * (n + 1) / 2
}

fn basis_transform(p: DVec2, u: DVec2, v: DVec2) -> DVec2 {
    u * p.x + v * p.y
}

/// Axial (u, v) to cartesian (x, y), with U = (1/2, sqrt(3)/2) and V = (1, 0).
pub fn axial_to_xy(p: DVec2) -> DVec2 {
    basis_transform(p, DVec2::new(0.5, 0.5 * SQRT_3), DVec2::new(1.0, 0.0))
}

/// Inverse of [`axial_to_xy`].
pub fn xy_to_axial(p: DVec2) -> DVec2 {
    basis_transform(
        p,
        DVec2::new(0.0, 1.0),
        DVec2::new(2.0 / SQRT_3, -1.0 / SQRT_3),
    )
}

/// Cartesian position of a pixel. A panels inset their local frame from the
/// anchor corner; B panels run the same frame from the opposite corner with
/// the sign flipped, so the two tile seamlessly across their shared edge.
pub fn coord_to_xy(c: &GridCoord) -> DVec2 {
    let s = pixel_spacing(c.panel_size);
    let inset = DVec2::splat(1.0 / SQRT_3);
    let px = DVec2::new(c.pixel.u as f64, c.pixel.v as f64);
    let root = DVec2::new(c.panel.u as f64, c.panel.v as f64);
    let axial = match c.panel.orient {
        Orient::A => root + s * (px + inset),
        Orient::B => root + DVec2::ONE - s * (px + inset),
    };
    axial_to_xy(axial)
}

/// The adjacent axial vertex moving from `p` in direction `rot` (60-degree
/// steps, clockwise).
pub fn axial_neighbor(p: IVec2, rot: i32) -> IVec2 {
    let axis = rot.rem_euclid(3);
    let hemi = rot.rem_euclid(6) < 3;
    let du = if axis == 0 {
        0
    } else if hemi {
        -1
    } else {
        1
    };
    let dv = if axis == 2 {
        0
    } else if hemi {
        1
    } else {
        -1
    };
    IVec2::new(p.x + du, p.y + dv)
}

/// Whether two axial vertices are adjacent lattice points.
pub fn axials_adjacent(a: IVec2, b: IVec2) -> bool {
    let du = a.x - b.x;
    let dv = a.y - b.y;
    (-1..=1).contains(&du) && (-1..=1).contains(&dv) && du != dv
}

/// Fill a unit panel with a grid of pixels, n per edge, traversed in a
/// boustrophedon manner: row 0 near the anchor corner proceeding along +v,
/// then alternating direction row by row upward. The first pixel is the
/// panel's entry point and the last (apex) pixel its exit point.
pub fn fill_triangle(n: u32) -> Vec<TriCoord> {
    let n = n as i32;
    let mut coords = Vec::with_capacity((n * (n + 1) / 2) as usize);
    for row in 0..n {
        let width = n - row;
        let reversed = row % 2 == 1;
        for col in 0..width {
            let c = if reversed { width - 1 - col } else { col };
            coords.push(TriCoord::a(row, c));
        }
    }
    coords
}

/// Fill one panel whose entry corner sits at the axial vertex `entry`,
/// rotated clockwise by `rot` * 60 degrees about that corner. The panel
/// anchor comes from the rotation offset table; the boustrophedon pattern is
/// remapped into the panel's local frame according to the rotation class.
pub fn fill_panel(entry: IVec2, rot: i32, panel_size: u32) -> Vec<GridCoord> {
    let k = rot.rem_euclid(6) as usize;
    let (du, dv) = ROT_OFFSETS[k];
    let orient = if k % 2 == 0 { Orient::A } else { Orient::B };
    let panel = TriCoord::new(entry.x + du, entry.y + dv, orient);
    let n = panel_size as i32;
    fill_triangle(panel_size)
        .into_iter()
        .map(|c| {
            let (u, v) = match k % 3 {
                0 => (c.u, c.v),
                1 => (c.v, n - 1 - c.u - c.v),
                _ => (n - 1 - c.u - c.v, c.u),
            };
            GridCoord::from_parts(panel, TriCoord::a(u, v), panel_size)
        })
        .collect()
}

/// Exit vertex of a panel fill: the axial neighbor of the entry in direction
/// rot - 1. Feeding it back in as the next entry sweeps a fan clockwise.
pub fn fill_exit(entry: IVec2, rot: i32) -> IVec2 {
    axial_neighbor(entry, rot - 1)
}

/// Fill a fan of up to 6 panels proceeding clockwise around the hexagonal
/// sector whose perimeter touches `entry`. `orientation` picks the starting
/// rotation; `segments` is the number of panels to fill.
pub fn fill_fan(orientation: i32, segments: u32, panel_size: u32, entry: IVec2) -> Vec<GridCoord> {
    let mut points = Vec::new();
    let mut entry = entry;
    let mut rot = orientation;
    for _ in 0..segments {
        points.extend(fill_panel(entry, rot, panel_size));
        entry = fill_exit(entry, rot);
        rot += 1;
    }
    points
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("no defined layout for {0} panels")]
    UnknownPanelCount(u32),
}

/// The panel arrangements that exist as physical structures, keyed by total
/// panel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelLayout {
    Two,
    Six,
    Thirteen,
    TwentyFour,
}

impl PanelLayout {
    pub fn from_panel_count(count: u32) -> Result<PanelLayout, LayoutError> {
        match count {
            2 => Ok(PanelLayout::Two),
            6 => Ok(PanelLayout::Six),
            13 => Ok(PanelLayout::Thirteen),
            24 => Ok(PanelLayout::TwentyFour),
            other => Err(LayoutError::UnknownPanelCount(other)),
        }
    }

    pub fn panel_count(self) -> u32 {
        self.arms().iter().sum()
    }

    /// Panels per controller arm.
    pub fn arms(self) -> &'static [u32] {
        match self {
            PanelLayout::Two => &[2],
            PanelLayout::Six => &[4, 2],
            PanelLayout::Thirteen => &[4, 4, 4, 1],
            PanelLayout::TwentyFour => &[4, 4, 4, 4, 4, 4],
        }
    }

    /// Maximum radius of the layout, in panel-edge units.
    pub fn radius(self) -> f64 {
        match self {
            PanelLayout::Two => 2.0 / 3.0 * SQRT_3,
            PanelLayout::Six => 1.0,
            PanelLayout::Thirteen => (7.0 / 3.0_f64).sqrt(),
            PanelLayout::TwentyFour => 2.0,
        }
    }

    /// Center of the layout, in axial coordinates.
    pub fn origin(self) -> DVec2 {
        match self {
            // the 2-panel layout is inherently off-center
            PanelLayout::Two => DVec2::new(1.0 / 3.0, 1.0 / 3.0),
            PanelLayout::Six => DVec2::ZERO,
            PanelLayout::Thirteen => DVec2::new(1.0 / 3.0, 1.0 / 3.0),
            PanelLayout::TwentyFour => DVec2::ZERO,
        }
    }

    /// Center of the layout, in cartesian coordinates.
    pub fn offset(self) -> DVec2 {
        axial_to_xy(self.origin())
    }

    /// Generate the full pixel set of this layout, in wire order.
    pub fn fill(self, panel_size: u32) -> Vec<GridCoord> {
        match self {
            PanelLayout::Two => fill_fan(0, 2, panel_size, IVec2::ZERO),
            PanelLayout::Six => {
                let mut points = fill_fan(4, 4, panel_size, IVec2::new(-1, 1));
                points.extend(fill_fan(5, 2, panel_size, IVec2::new(-1, 1)));
                points
            }
            PanelLayout::Thirteen => {
                let entries = [IVec2::new(1, 0), IVec2::new(0, 1), IVec2::ZERO];
                let mut points = Vec::new();
                for (i, entry) in entries.into_iter().enumerate() {
                    points.extend(fill_fan(2 * i as i32 + 1, 4, panel_size, entry));
                }
                points.extend(fill_panel(IVec2::ZERO, 0, panel_size));
                points
            }
            PanelLayout::TwentyFour => (0..6)
                .flat_map(|i| fill_fan(i, 4, panel_size, IVec2::ZERO))
                .collect(),
        }
    }
}
