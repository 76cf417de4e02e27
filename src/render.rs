//! The renderer seam.
//!
//! The GUI core never talks to the GPU directly. Everything it needs is
//! expressed through the [`Renderer`] trait: offscreen color targets,
//! batched draw passes with a chosen blend mode, and textured quads.
//! `src/gpu.rs` implements it on wgpu; [`RecordingRenderer`] is a
//! headless implementation that records draw calls for tests and tools.

use slotmap::{SlotMap, new_key_type};

use crate::clip::Rect;

new_key_type! {
    /// Handle to an offscreen render target (and its resolved image).
    pub struct TargetId;
}

new_key_type! {
    /// Handle to a loaded sampleable texture (skin atlas, font atlas).
    pub struct TextureId;
}

/// Errors surfaced by the GUI core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuiError {
    /// Caller passed an argument the operation cannot accept.
    InvalidArgument(&'static str),
    /// The renderer could not allocate an offscreen target. Recoverable:
    /// the affected node skips this frame and retries on the next.
    TargetAllocation { width: u32, height: u32 },
}

impl std::fmt::Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            GuiError::TargetAllocation { width, height } => {
                write!(f, "failed to allocate {width}x{height} render target")
            }
        }
    }
}

impl std::error::Error for GuiError {}

/// Blend mode for a draw pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Plain source-over alpha blending, used when presenting to screen.
    SourceOver,
    /// Source-over color with additive destination alpha. Used when
    /// compositing into an offscreen cache so that overlapping siblings do
    /// not carve holes into the accumulated alpha channel.
    SeparateAlpha,
}

/// What a quad samples from: a loaded texture or a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureRef {
    Texture(TextureId),
    Target(TargetId),
}

/// A fixed-advance ASCII glyph atlas: 16 columns by 6 rows covering
/// codepoints 0x20..=0x7F, one cell per glyph.
#[derive(Debug, Clone, Copy)]
pub struct GlyphFont {
    pub texture: TextureId,
    pub cell_width: i32,
    pub cell_height: i32,
}

impl GlyphFont {
    /// Source rect for one character; unknown characters map to '?'.
    pub fn glyph_source(&self, ch: char) -> Rect {
        let code = if (' '..='\u{7f}').contains(&ch) {
            ch as u32
        } else {
            '?' as u32
        };
        let index = code - 0x20;
        Rect::new(
            (index % 16) as i32 * self.cell_width,
            (index / 16) as i32 * self.cell_height,
            self.cell_width,
            self.cell_height,
        )
    }

    /// Pixel extent of a run. Fixed advance, single line.
    pub fn measure(&self, text: &str) -> (i32, i32) {
        (
            text.chars().count() as i32 * self.cell_width,
            self.cell_height,
        )
    }
}

/// Capabilities the GUI core requires of its rendering collaborator.
pub trait Renderer {
    /// Create an offscreen color target of exactly the given size.
    fn create_target(&mut self, width: u32, height: u32) -> Result<TargetId, GuiError>;

    /// Release a target and its resolved image.
    fn destroy_target(&mut self, target: TargetId);

    /// Register an RGBA8 texture (row-major, `width * height * 4` bytes).
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId;

    /// Begin a batched draw pass. `target == None` draws to the screen.
    /// `clear` fills the target before drawing.
    fn begin_pass(&mut self, target: Option<TargetId>, blend: BlendMode, clear: Option<[f32; 4]>);

    /// Flush and end the current pass.
    fn end_pass(&mut self);

    /// Draw one textured quad. Must be called inside a pass.
    fn draw_quad(&mut self, texture: TextureRef, source: Rect, dest: Rect, tint: [f32; 4]);

    /// Make a target's contents sampleable by later passes.
    fn resolve_target(&mut self, target: TargetId);
}

// ---------------------------------------------------------------------------
// Recording renderer
// ---------------------------------------------------------------------------

/// One recorded renderer call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    BeginPass {
        target: Option<TargetId>,
        blend: BlendMode,
        cleared: bool,
    },
    EndPass,
    Quad {
        texture: TextureRef,
        source: Rect,
        dest: Rect,
        tint: [f32; 4],
    },
    Resolve(TargetId),
}

/// Headless renderer that records every call. Used by the test suite and
/// handy for dumping a frame's draw stream when debugging compositing.
pub struct RecordingRenderer {
    targets: SlotMap<TargetId, (u32, u32)>,
    textures: SlotMap<TextureId, (u32, u32)>,
    pub calls: Vec<DrawCall>,
    /// When > 0, the next `create_target` calls fail (decrementing once
    /// per call). Simulates target-memory exhaustion.
    pub fail_allocations: u32,
    in_pass: bool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self {
            targets: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            calls: Vec::new(),
            fail_allocations: 0,
            in_pass: false,
        }
    }

    /// Size of a live target, if it exists.
    pub fn target_size(&self, target: TargetId) -> Option<(u32, u32)> {
        self.targets.get(target).copied()
    }

    /// Number of live (not yet destroyed) targets.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of offscreen render passes recorded so far.
    pub fn offscreen_passes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DrawCall::BeginPass { target: Some(_), .. }))
            .count()
    }

    /// Quads recorded so far, in order: (texture, source, dest).
    pub fn quads(&self) -> impl Iterator<Item = (&TextureRef, &Rect, &Rect)> {
        self.calls.iter().filter_map(|c| match c {
            DrawCall::Quad {
                texture,
                source,
                dest,
                ..
            } => Some((texture, source, dest)),
            _ => None,
        })
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for RecordingRenderer {
    fn create_target(&mut self, width: u32, height: u32) -> Result<TargetId, GuiError> {
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return Err(GuiError::TargetAllocation { width, height });
        }
        Ok(self.targets.insert((width, height)))
    }

    fn destroy_target(&mut self, target: TargetId) {
        self.targets.remove(target);
    }

    fn create_texture(&mut self, width: u32, height: u32, _rgba: &[u8]) -> TextureId {
        self.textures.insert((width, height))
    }

    fn begin_pass(&mut self, target: Option<TargetId>, blend: BlendMode, clear: Option<[f32; 4]>) {
        debug_assert!(!self.in_pass, "nested draw pass");
        self.in_pass = true;
        self.calls.push(DrawCall::BeginPass {
            target,
            blend,
            cleared: clear.is_some(),
        });
    }

    fn end_pass(&mut self) {
        debug_assert!(self.in_pass, "end_pass outside pass");
        self.in_pass = false;
        self.calls.push(DrawCall::EndPass);
    }

    fn draw_quad(&mut self, texture: TextureRef, source: Rect, dest: Rect, tint: [f32; 4]) {
        debug_assert!(self.in_pass, "draw_quad outside pass");
        self.calls.push(DrawCall::Quad {
            texture,
            source,
            dest,
            tint,
        });
    }

    fn resolve_target(&mut self, target: TargetId) {
        self.calls.push(DrawCall::Resolve(target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_source_cells() {
        let mut r = RecordingRenderer::new();
        let tex = r.create_texture(128, 96, &[]);
        let font = GlyphFont {
            texture: tex,
            cell_width: 8,
            cell_height: 16,
        };

        // Space is the first cell.
        assert_eq!(font.glyph_source(' '), Rect::new(0, 0, 8, 16));
        // '!' is the next one over.
        assert_eq!(font.glyph_source('!'), Rect::new(8, 0, 8, 16));
        // '0' = 0x30, index 16: second row, first column.
        assert_eq!(font.glyph_source('0'), Rect::new(0, 16, 8, 16));
        // Non-ASCII falls back to '?'.
        assert_eq!(font.glyph_source('é'), font.glyph_source('?'));
    }

    #[test]
    fn measure_is_fixed_advance() {
        let mut r = RecordingRenderer::new();
        let tex = r.create_texture(128, 96, &[]);
        let font = GlyphFont {
            texture: tex,
            cell_width: 8,
            cell_height: 16,
        };
        assert_eq!(font.measure("Hello"), (40, 16));
        assert_eq!(font.measure(""), (0, 16));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut r = RecordingRenderer::new();
        r.fail_allocations = 1;
        let err = r.create_target(64, 64).expect_err("forced failure");
        assert_eq!(
            err,
            GuiError::TargetAllocation {
                width: 64,
                height: 64
            }
        );
        // Next attempt succeeds.
        assert!(r.create_target(64, 64).is_ok());
    }

    #[test]
    fn destroy_removes_target() {
        let mut r = RecordingRenderer::new();
        let t = r.create_target(32, 16).expect("create");
        assert_eq!(r.target_size(t), Some((32, 16)));
        r.destroy_target(t);
        assert_eq!(r.target_size(t), None);
        assert_eq!(r.live_targets(), 0);
    }
}
