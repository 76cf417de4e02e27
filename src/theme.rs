//! Centralized visual defaults.
//!
//! The skin atlas regions, margins, and colors every widget starts from.
//! One explicit theme object handed to the manager at construction; widgets
//! read from it instead of per-widget mutable defaults. Loadable from a RON
//! file, falling back to the built-in atlas layout on any failure.

use serde::Deserialize;

use crate::clip::Rect;

/// sRGB RGBA color.
pub type Color = [f32; 4];

pub const WHITE: Color = [1.0, 1.0, 1.0, 1.0];
pub const BLACK: Color = [0.0, 0.0, 0.0, 1.0];
pub const GRAY: Color = [0.5, 0.5, 0.5, 1.0];
/// White at half alpha, used to ghost disabled icons.
pub const GHOSTED: Color = [1.0, 1.0, 1.0, 0.5];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Theme {
    // -- Menu atlas regions --
    /// Popup menu background.
    pub popup_skin: Rect,
    /// Menu button hover/selection highlight.
    pub highlight_skin: Rect,
    /// Submenu arrow glyph.
    pub arrow_skin: Rect,
    /// Separator rule.
    pub separator_skin: Rect,
    /// Menu bar strip background.
    pub menu_bar_skin: Rect,
    /// Generic panel background.
    pub panel_skin: Rect,
    /// Check box face, unchecked.
    pub check_box_skin: Rect,
    /// Check box face, checked.
    pub check_box_checked_skin: Rect,

    // -- Menu metrics (pixels) --
    /// Horizontal padding inside a menu item.
    pub item_h_margin: i32,
    /// Vertical padding inside a menu item.
    pub item_v_margin: i32,
    /// Padding between a popup's border and its items.
    pub popup_margin: i32,
    /// Menu bar height.
    pub menu_bar_height: i32,

    // -- Text colors --
    pub text_color: Color,
    pub disabled_text_color: Color,
    /// Tint for icons on disabled items.
    pub disabled_icon_tint: Color,
}

impl Default for Theme {
    fn default() -> Self {
        // Region coordinates match the stock skin atlas layout.
        Self {
            popup_skin: Rect::new(84, 41, 25, 25),
            highlight_skin: Rect::new(61, 67, 15, 15),
            arrow_skin: Rect::new(114, 43, 4, 7),
            separator_skin: Rect::new(111, 124, 14, 2),
            menu_bar_skin: Rect::new(1, 91, 25, 25),
            panel_skin: Rect::new(27, 91, 25, 25),
            check_box_skin: Rect::new(53, 91, 15, 15),
            check_box_checked_skin: Rect::new(69, 91, 15, 15),

            item_h_margin: 5,
            item_v_margin: 2,
            popup_margin: 2,
            menu_bar_height: 24,

            text_color: BLACK,
            disabled_text_color: GRAY,
            disabled_icon_tint: GHOSTED,
        }
    }
}

impl Theme {
    /// Load a theme from a RON file. Logs a warning and returns the
    /// default theme when the file is missing or malformed.
    pub fn load(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("failed to read {path}: {e}, using default theme");
                return Self::default();
            }
        };
        match ron::from_str::<Theme>(&content) {
            Ok(theme) => theme,
            Err(e) => {
                log::warn!("failed to parse RON {path}: {e}, using default theme");
                Self::default()
            }
        }
    }
}
