//! The addressable-pixel model.

use glam::DVec2;

/// Where an addressable slot physically sits. Controller wiring sometimes
/// reserves addresses with no LED behind them; those slots stay in the pixel
/// list to keep wire order stable but carry no position or color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelLocation {
    /// A real LED at this world position, in meters.
    Real(DVec2),
    /// A reserved, non-physical slot.
    Spacer,
}

impl PixelLocation {
    pub fn xy(&self) -> Option<DVec2> {
        match self {
            PixelLocation::Real(p) => Some(*p),
            PixelLocation::Spacer => None,
        }
    }

    pub fn is_spacer(&self) -> bool {
        matches!(self, PixelLocation::Spacer)
    }
}

/// One addressable LED slot of a mesh. Implementations carry whatever
/// identity their geometry needs (lattice coordinate, wing index, ...); the
/// mesh only requires a location and a fixed output channel.
pub trait MeshPixel {
    fn location(&self) -> PixelLocation;

    /// Output channel this pixel is wired to. Fixed at mesh build time.
    fn channel(&self) -> usize;

    fn xy(&self) -> Option<DVec2> {
        self.location().xy()
    }
}
