//! Pict format and visual negotiation
//!
//! Pixel data is always 32-bit little-endian BGRA(X). Windows on a depth-24
//! root and alpha-capable depth-32 pixmaps both need a RENDER format with that
//! layout, so both are required at startup.

use crate::backend::{Backend, DirectFormat, PictFormatInfo, ScreenInfo, Xid};
use crate::error::{Error, Result};

/// The negotiated pict formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictFormats {
    pub depth24: Xid,
    pub depth32: Xid,
}

impl PictFormats {
    /// Format for a window of the given depth
    pub fn for_depth(&self, depth: u8) -> Result<Xid> {
        match depth {
            24 => Ok(self.depth24),
            32 => Ok(self.depth32),
            _ => Err(Error::UnsupportedDepth(depth)),
        }
    }
}

/// Query the server's formats once and pick the depth-24 and depth-32 ones
pub fn negotiate(backend: &dyn Backend) -> Result<PictFormats> {
    let formats = backend.query_pict_formats()?;
    let negotiated = PictFormats {
        depth24: find_pict_format(&formats, 24)?,
        depth32: find_pict_format(&formats, 32)?,
    };
    log::debug!(
        "pict formats: depth24=0x{:x} depth32=0x{:x}",
        negotiated.depth24,
        negotiated.depth32
    );
    Ok(negotiated)
}

fn wanted_layout(depth: u8) -> DirectFormat {
    let mut want = DirectFormat {
        red_shift: 16,
        red_mask: 0xff,
        green_shift: 8,
        green_mask: 0xff,
        blue_shift: 0,
        blue_mask: 0xff,
        alpha_shift: 24,
        alpha_mask: 0xff,
    };
    if depth == 24 {
        want.alpha_shift = 0;
        want.alpha_mask = 0;
    }
    want
}

pub fn find_pict_format(formats: &[PictFormatInfo], depth: u8) -> Result<Xid> {
    let want = wanted_layout(depth);
    formats
        .iter()
        .find(|f| f.direct && f.depth == depth && f.layout == want)
        .map(|f| f.id)
        .ok_or(Error::NoPictFormat(depth))
}

pub fn find_visual(screen: &ScreenInfo, depth: u8) -> Result<u32> {
    screen
        .visuals
        .iter()
        .filter(|v| v.depth == depth)
        .find(|v| v.red_mask == 0xff0000 && v.green_mask == 0xff00 && v.blue_mask == 0xff)
        .map(|v| v.visual_id)
        .ok_or(Error::NoVisual(depth))
}
