//! Resize and crop geometry.
//!
//! Pure functions shared by the editors and the coordinator so that the
//! logical size reported to callers always agrees with the pixels written.
//! Nothing here fails: degenerate input yields a zero-sized or unchanged
//! result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width and height swapped, as after a quarter turn
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// A region of a source image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// True if the rectangle lies entirely inside `(0, 0, bounds)`
    pub fn fits_in(&self, bounds: Size) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(bounds.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(bounds.height)
    }
}

fn round_px(value: f64) -> u32 {
    // f64::round rounds half away from zero
    let rounded = value.round();
    if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// Scale `(src_w, src_h)` proportionally so it fits inside the bounds.
///
/// The tighter constraint binds, so the result may be larger than the
/// source when both bounds exceed it. An unset bound leaves that axis
/// unconstrained; with both unset the source is returned unchanged.
pub fn fit_within(src_w: u32, src_h: u32, max_w: Option<u32>, max_h: Option<u32>) -> Size {
    if max_w.is_none() && max_h.is_none() {
        return Size::new(src_w, src_h);
    }
    if src_w == 0 || src_h == 0 {
        return Size::new(0, 0);
    }

    let ratio_w = max_w.map(|w| f64::from(w) / f64::from(src_w));
    let ratio_h = max_h.map(|h| f64::from(h) / f64::from(src_h));
    let ratio = match (ratio_w, ratio_h) {
        (Some(rw), Some(rh)) => rw.min(rh),
        (Some(r), None) | (None, Some(r)) => r,
        (None, None) => 1.0,
    };

    Size::new(
        round_px(f64::from(src_w) * ratio),
        round_px(f64::from(src_h) * ratio),
    )
}

/// Largest centered region of the source with the target's aspect ratio.
///
/// Extracting this region and scaling it to `(target_w, target_h)` fills the
/// target exactly.
pub fn cover_crop(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> Rect {
    let inter = fit_within(target_w, target_h, Some(src_w), Some(src_h));

    let x = round_px(f64::from(src_w) / 2.0 - f64::from(inter.width) / 2.0);
    let y = round_px(f64::from(src_h) / 2.0 - f64::from(inter.height) / 2.0);

    Rect::new(x, y, inter.width, inter.height)
}

/// What a `resize(max_w, max_h, crop)` request does to an image of
/// `current` size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Already the requested size
    Unchanged,
    /// Proportional scale to the given size
    Fit(Size),
    /// Extract `source`, then scale it to `target`
    Crop { source: Rect, target: Size },
}

impl ResizePlan {
    /// Size of the image after the plan is applied
    pub fn result_size(&self, current: Size) -> Size {
        match self {
            ResizePlan::Unchanged => current,
            ResizePlan::Fit(size) => *size,
            ResizePlan::Crop { target, .. } => *target,
        }
    }
}

/// Plan a resize request.
///
/// Cropping needs both bounds; a crop request with an unset axis falls back
/// to a proportional fit.
pub fn plan_resize(
    current: Size,
    max_w: Option<u32>,
    max_h: Option<u32>,
    crop: bool,
) -> ResizePlan {
    if max_w == Some(current.width) && max_h == Some(current.height) {
        return ResizePlan::Unchanged;
    }

    match (crop, max_w, max_h) {
        (true, Some(w), Some(h)) => ResizePlan::Crop {
            source: cover_crop(current.width, current.height, w, h),
            target: Size::new(w, h),
        },
        _ => ResizePlan::Fit(fit_within(current.width, current.height, max_w, max_h)),
    }
}
