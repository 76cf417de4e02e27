//! Skin-state to atlas-region mapping for skinned widgets.
//!
//! A skinned node carries a [`SkinSet`]: up to one source rectangle per
//! interaction state on the shared skin atlas, plus an optional per-node
//! texture override. Exactly one state is active at a time; switching the
//! active state requests a redraw only when the state actually changed.

use crate::clip::{Rect, clip_draw_call};
use crate::render::{GuiError, Renderer, TextureId, TextureRef};

/// Interaction states a skinned widget can present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SkinState {
    Normal,
    Hover,
    Pressed,
    Checked,
    CheckedHover,
    CheckedPressed,
}

impl SkinState {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            SkinState::Normal => 0,
            SkinState::Hover => 1,
            SkinState::Pressed => 2,
            SkinState::Checked => 3,
            SkinState::CheckedHover => 4,
            SkinState::CheckedPressed => 5,
        }
    }
}

/// Per-node skin mapping. States without a region fall through to nothing
/// (a widget with only a Normal region keeps drawing it while hovered).
#[derive(Debug, Clone, Default)]
pub struct SkinSet {
    regions: [Option<Rect>; SkinState::COUNT],
    /// Texture override; `None` means the shared skin atlas.
    custom_texture: Option<TextureId>,
    active: Option<SkinState>,
}

impl SkinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-state skin drawing `region` in the Normal state.
    pub fn single(region: Rect) -> Result<Self, GuiError> {
        let mut set = Self::new();
        set.set_region(SkinState::Normal, region)?;
        Ok(set)
    }

    /// Unchecked/checked pair, the check box shape.
    pub fn toggle(normal: Rect, checked: Rect) -> Result<Self, GuiError> {
        let mut set = Self::new();
        set.set_region(SkinState::Normal, normal)?;
        set.set_region(SkinState::Checked, checked)?;
        Ok(set)
    }

    /// Normal/Hover/Pressed triple, the common button shape.
    pub fn three(normal: Rect, hover: Rect, pressed: Rect) -> Result<Self, GuiError> {
        let mut set = Self::new();
        set.set_region(SkinState::Normal, normal)?;
        set.set_region(SkinState::Hover, hover)?;
        set.set_region(SkinState::Pressed, pressed)?;
        Ok(set)
    }

    /// Register the atlas region for a state. The first region registered
    /// becomes the active state. Zero-area regions are rejected.
    pub fn set_region(&mut self, state: SkinState, region: Rect) -> Result<(), GuiError> {
        if region.width <= 0 || region.height <= 0 {
            return Err(GuiError::InvalidArgument("skin region must have positive extent"));
        }
        let first = self.regions.iter().all(Option::is_none);
        self.regions[state.index()] = Some(region);
        if first {
            self.active = Some(state);
        }
        Ok(())
    }

    pub fn region(&self, state: SkinState) -> Option<Rect> {
        self.regions[state.index()]
    }

    /// Switch the active state. Returns true when the caller should mark
    /// the node for redraw: the state changed and has a region. Switching
    /// to a state with no registered region is ignored.
    #[must_use]
    pub fn set_active(&mut self, state: SkinState) -> bool {
        if self.active == Some(state) {
            return false;
        }
        if self.regions[state.index()].is_none() {
            return false;
        }
        self.active = Some(state);
        true
    }

    pub fn active(&self) -> Option<SkinState> {
        self.active
    }

    pub fn active_region(&self) -> Option<Rect> {
        self.active.and_then(|s| self.regions[s.index()])
    }

    pub fn set_custom_texture(&mut self, texture: Option<TextureId>) {
        self.custom_texture = texture;
    }

    /// Texture this skin samples from.
    pub fn texture(&self, atlas: TextureId) -> TextureRef {
        TextureRef::Texture(self.custom_texture.unwrap_or(atlas))
    }

    /// Draw the active region stretched across `dest`, trimmed to the
    /// parent scissor. A skin stretched to its destination is a non-1:1
    /// blit, so clipping shrinks only the destination.
    pub fn draw(
        &self,
        renderer: &mut dyn Renderer,
        atlas: TextureId,
        dest: Rect,
        scissor: Rect,
    ) {
        let Some(source) = self.active_region() else {
            return;
        };
        if let Some(clipped) = clip_draw_call(source, dest, scissor) {
            renderer.draw_quad(self.texture(atlas), clipped.source, clipped.dest, [1.0; 4]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCall, RecordingRenderer};

    #[test]
    fn first_region_becomes_active() {
        let mut set = SkinSet::new();
        set.set_region(SkinState::Hover, Rect::new(0, 0, 10, 10))
            .expect("valid region");
        assert_eq!(set.active(), Some(SkinState::Hover));
    }

    #[test]
    fn zero_area_region_rejected() {
        let mut set = SkinSet::new();
        let err = set
            .set_region(SkinState::Normal, Rect::new(0, 0, 0, 10))
            .expect_err("zero width");
        assert!(matches!(err, GuiError::InvalidArgument(_)));
    }

    #[test]
    fn switching_state_requests_redraw_only_on_change() {
        let mut set = SkinSet::three(
            Rect::new(0, 0, 10, 10),
            Rect::new(10, 0, 10, 10),
            Rect::new(20, 0, 10, 10),
        )
        .expect("valid regions");

        // Already active: no redraw.
        assert!(!set.set_active(SkinState::Normal));
        // Actual change: redraw.
        assert!(set.set_active(SkinState::Hover));
        assert_eq!(set.active_region(), Some(Rect::new(10, 0, 10, 10)));
        // Unregistered state: ignored, no redraw.
        assert!(!set.set_active(SkinState::Checked));
        assert_eq!(set.active(), Some(SkinState::Hover));
    }

    #[test]
    fn draw_emits_stretched_quad() {
        let mut r = RecordingRenderer::new();
        let atlas = r.create_texture(256, 256, &[]);
        let set = SkinSet::single(Rect::new(84, 41, 25, 25)).expect("valid region");

        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        set.draw(&mut r, atlas, Rect::new(5, 5, 80, 40), Rect::new(0, 0, 200, 200));
        r.end_pass();

        let quad = r
            .calls
            .iter()
            .find_map(|c| match c {
                DrawCall::Quad { source, dest, .. } => Some((*source, *dest)),
                _ => None,
            })
            .expect("one quad");
        assert_eq!(quad.0, Rect::new(84, 41, 25, 25));
        assert_eq!(quad.1, Rect::new(5, 5, 80, 40));
    }

    #[test]
    fn custom_texture_overrides_atlas() {
        let mut r = RecordingRenderer::new();
        let atlas = r.create_texture(256, 256, &[]);
        let custom = r.create_texture(64, 64, &[]);

        let mut set = SkinSet::single(Rect::new(0, 0, 8, 8)).expect("valid region");
        assert_eq!(set.texture(atlas), TextureRef::Texture(atlas));
        set.set_custom_texture(Some(custom));
        assert_eq!(set.texture(atlas), TextureRef::Texture(custom));
    }
}
