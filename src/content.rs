//! Asset loading: the skin atlas and the glyph atlas.
//!
//! Missing or unreadable files log a warning and fall back to a flat white
//! placeholder so the toolkit still runs (skins become plain rectangles,
//! glyphs become solid cells).

use crate::render::{GlyphFont, Renderer, TextureId};

/// Fixed-cell glyph grid dimensions: 16 columns by 6 rows covering ASCII
/// 0x20..=0x7F.
const FONT_COLS: u32 = 16;
const FONT_ROWS: u32 = 6;

/// Textures the widget draw code samples from.
#[derive(Debug, Clone, Copy)]
pub struct Assets {
    /// Shared skin atlas all skin regions index into.
    pub atlas: TextureId,
    pub font: GlyphFont,
}

impl Assets {
    /// Load the skin atlas and glyph atlas from disk, registering both with
    /// the renderer.
    pub fn load(renderer: &mut dyn Renderer, atlas_path: &str, font_path: &str) -> Self {
        let (aw, ah, atlas_rgba) = load_rgba(atlas_path).unwrap_or_else(placeholder);
        let atlas = renderer.create_texture(aw, ah, &atlas_rgba);

        let (fw, fh, font_rgba) = load_rgba(font_path).unwrap_or_else(placeholder_font);
        let texture = renderer.create_texture(fw, fh, &font_rgba);
        let font = GlyphFont {
            texture,
            cell_width: (fw / FONT_COLS) as i32,
            cell_height: (fh / FONT_ROWS) as i32,
        };
        Self { atlas, font }
    }
}

/// Decode a PNG into RGBA8. Logs a warning and returns None on failure.
fn load_rgba(path: &str) -> Option<(u32, u32, Vec<u8>)> {
    match image::open(path) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            Some((w, h, rgba.into_raw()))
        }
        Err(e) => {
            log::warn!("failed to load {}: {}, using placeholder", path, e);
            None
        }
    }
}

fn placeholder() -> (u32, u32, Vec<u8>) {
    (2, 2, vec![0xff; 2 * 2 * 4])
}

/// Placeholder glyph atlas keeping the expected cell grid shape.
fn placeholder_font() -> (u32, u32, Vec<u8>) {
    let (w, h) = (FONT_COLS * 8, FONT_ROWS * 16);
    (w, h, vec![0xff; (w * h * 4) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingRenderer;

    #[test]
    fn missing_files_fall_back_to_placeholders() {
        let mut r = RecordingRenderer::new();
        let assets = Assets::load(&mut r, "/nonexistent/skin.png", "/nonexistent/font.png");
        // The placeholder font keeps the 16x6 cell grid.
        assert_eq!(assets.font.cell_width, 8);
        assert_eq!(assets.font.cell_height, 16);
        assert_ne!(assets.atlas, assets.font.texture);
    }
}
