//! Per-fragment visibility flags and draw modes
//!
//! Each fragment carries one flag byte in the fragment list. The renderer
//! walks the scene up to three times per frame - normal, ghosted, and
//! highlighted - and the predicate below decides which fragments a given
//! pass touches.

use bitflags::bitflags;

bitflags! {
    /// Per-fragment visibility flag byte
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FragFlags: u8 {
        /// Fragment is shown in the normal render pass
        const VISIBLE = 0x01;
        /// Fragment is part of the current highlight set
        const HIGHLIGHTED = 0x02;
        /// Fragment is fully hidden (not even ghosted)
        const HIDDEN = 0x04;
    }
}

/// Which render pass a draw-call partition is computed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawMode {
    /// Plain visible fragments
    Normal,
    /// Ghosted pass: fragments that are neither visible nor hidden
    Hidden,
    /// Highlight pass
    Highlighted,
}

/// Whether a fragment with the given flag byte is drawn in the given pass
#[inline]
pub fn frag_visible(flags: u8, mode: DrawMode) -> bool {
    let f = FragFlags::from_bits_truncate(flags);
    match mode {
        DrawMode::Normal => {
            f & (FragFlags::VISIBLE | FragFlags::HIDDEN | FragFlags::HIGHLIGHTED)
                == FragFlags::VISIBLE
        }
        DrawMode::Hidden => (f & (FragFlags::VISIBLE | FragFlags::HIDDEN)).is_empty(),
        DrawMode::Highlighted => {
            f & (FragFlags::HIGHLIGHTED | FragFlags::HIDDEN) == FragFlags::HIGHLIGHTED
        }
    }
}
