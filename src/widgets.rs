//! Widget payloads carried by tree nodes.
//!
//! One closed enum instead of a class tower: dispatch over widget kinds is
//! exhaustive, and "is this a menu button?" is a match, not a downcast.

use crate::clip::{Point, Rect, clip_draw_call};
use crate::content::Assets;
use crate::render::{GlyphFont, Renderer};
use crate::skin::{SkinSet, SkinState};
use crate::theme::{Color, Theme, WHITE};
use crate::tree::NodeId;

/// Draw a single-line glyph run, trimming each glyph quad to the scissor.
/// Glyph cells are 1:1 blits, so partially visible characters are cut
/// cleanly at the scissor edge instead of being dropped whole.
pub fn draw_text(
    renderer: &mut dyn Renderer,
    font: &GlyphFont,
    text: &str,
    pos: Point,
    tint: Color,
    scissor: Rect,
) {
    for (i, ch) in text.chars().enumerate() {
        let dest = Rect::new(
            pos.x + i as i32 * font.cell_width,
            pos.y,
            font.cell_width,
            font.cell_height,
        );
        if let Some(clipped) = clip_draw_call(font.glyph_source(ch), dest, scissor) {
            renderer.draw_quad(
                crate::render::TextureRef::Texture(font.texture),
                clipped.source,
                clipped.dest,
                tint,
            );
        }
    }
}

/// Text label. Optionally renders a trailing cursor glyph (blink state is
/// toggled by the host; the label only knows whether to show it).
#[derive(Debug, Clone)]
pub struct LabelWidget {
    pub text: String,
    pub color: Color,
    pub show_cursor: bool,
}

impl LabelWidget {
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
            show_cursor: false,
        }
    }
}

/// Skinned image/icon. `scale` stretches the region to the node bounds;
/// otherwise the region draws 1:1 at the node origin.
#[derive(Debug, Clone)]
pub struct ImageWidget {
    pub skin: SkinSet,
    pub tint: Color,
    pub scale: bool,
}

/// Skinned background box.
#[derive(Debug, Clone)]
pub struct PanelWidget {
    pub skin: SkinSet,
}

/// Two-state toggle with a label. The box face comes from the skin's
/// checked and unchecked state regions; clicking flips the state.
#[derive(Debug, Clone)]
pub struct CheckBoxWidget {
    pub skin: SkinSet,
    pub text: String,
    pub checked: bool,
    /// Cursor-over highlight, maintained by the manager.
    pub highlighted: bool,
    /// Held down with the pointer captured on this box.
    pub pressed: bool,
}

impl CheckBoxWidget {
    pub fn new(text: impl Into<String>, skin: SkinSet) -> Self {
        Self {
            skin,
            text: text.into(),
            checked: false,
            highlighted: false,
            pressed: false,
        }
    }

    /// Region for the current interaction state, falling back to the plain
    /// checked or unchecked face when a variant has no region.
    fn face_region(&self) -> Option<Rect> {
        let state = match (self.checked, self.pressed, self.highlighted) {
            (false, true, _) => SkinState::Pressed,
            (false, false, true) => SkinState::Hover,
            (false, false, false) => SkinState::Normal,
            (true, true, _) => SkinState::CheckedPressed,
            (true, false, true) => SkinState::CheckedHover,
            (true, false, false) => SkinState::Checked,
        };
        let base = if self.checked {
            SkinState::Checked
        } else {
            SkinState::Normal
        };
        self.skin
            .region(state)
            .or_else(|| self.skin.region(base))
            .or_else(|| self.skin.region(SkinState::Normal))
    }
}

/// Horizontal strip of menu buttons across the top of its parent.
#[derive(Debug, Clone)]
pub struct MenuBarWidget {
    pub skin: SkinSet,
}

/// A clickable menu entry, optionally owning a popup submenu. The popup is
/// a detached node attached as a top-level root while shown.
#[derive(Debug, Clone)]
pub struct MenuButtonWidget {
    pub text: String,
    /// Optional icon region on the skin atlas.
    pub icon: Option<Rect>,
    pub enabled: bool,
    /// Hover/selection highlight drawn under the label.
    pub highlight: SkinSet,
    pub highlighted: bool,
    /// Submenu node; `None` for plain clickable items.
    pub popup: Option<NodeId>,
    pub popup_open: bool,
    /// Left-button releases seen inside this button while its popup is
    /// open. The popup closes when this passes 1, so a hover-traversal
    /// open (armed at 1) dismisses on the very next click.
    pub num_clicks: u32,
    /// Whether to draw the submenu arrow (nested button with children).
    pub show_arrow: bool,
    /// Width of the icon margin column, set by popup layout.
    pub icon_margin: i32,
}

impl MenuButtonWidget {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            icon: None,
            enabled: true,
            highlight: SkinSet::new(),
            highlighted: false,
            popup: None,
            popup_open: false,
            num_clicks: 0,
            show_arrow: false,
            icon_margin: 0,
        }
    }
}

/// Popup menu container. Accepts only menu items as children.
#[derive(Debug, Clone)]
pub struct PopUpWidget {
    pub skin: SkinSet,
    /// Layout is computed once per opening; cleared on close.
    pub populated: bool,
    /// The child menu button whose submenu is currently open. At most one.
    pub selected: Option<NodeId>,
    /// The menu button this popup belongs to, for outward close
    /// propagation.
    pub owner: Option<NodeId>,
}

impl PopUpWidget {
    pub fn new(skin: SkinSet) -> Self {
        Self {
            skin,
            populated: false,
            selected: None,
            owner: None,
        }
    }
}

/// Closed set of widget kinds.
#[derive(Debug, Clone)]
pub enum WidgetKind {
    /// Plain layout container. Draws nothing and owns no texture cache.
    Container,
    Label(LabelWidget),
    Image(ImageWidget),
    Panel(PanelWidget),
    CheckBox(CheckBoxWidget),
    MenuBar(MenuBarWidget),
    MenuButton(MenuButtonWidget),
    /// Horizontal rule inside a popup.
    Separator,
    PopUpMenu(PopUpWidget),
}

impl WidgetKind {
    /// Whether this kind owns a render-target-backed image cache.
    /// Non-caching kinds draw directly into the nearest caching ancestor.
    pub fn caches(&self) -> bool {
        match self {
            WidgetKind::Label(_)
            | WidgetKind::Panel(_)
            | WidgetKind::MenuBar(_)
            | WidgetKind::PopUpMenu(_) => true,
            WidgetKind::Container
            | WidgetKind::Image(_)
            | WidgetKind::CheckBox(_)
            | WidgetKind::MenuButton(_)
            | WidgetKind::Separator => false,
        }
    }

    /// Whether nodes of this kind take keyboard focus by default.
    pub fn default_focusable(&self) -> bool {
        matches!(self, WidgetKind::PopUpMenu(_))
    }

    /// Whether `child` may be attached under this widget. Menus are the
    /// restrictive containers: popups and bars take only menu items.
    pub fn accepts_child(&self, child: &WidgetKind) -> bool {
        match self {
            WidgetKind::PopUpMenu(_) => {
                matches!(child, WidgetKind::MenuButton(_) | WidgetKind::Separator)
            }
            WidgetKind::MenuBar(_) => matches!(child, WidgetKind::MenuButton(_)),
            WidgetKind::MenuButton(_)
            | WidgetKind::Label(_)
            | WidgetKind::CheckBox(_)
            | WidgetKind::Separator => false,
            WidgetKind::Container | WidgetKind::Image(_) | WidgetKind::Panel(_) => true,
        }
    }

    /// Draw this widget's own visual content. `bounds` is the node rect in
    /// the current target's space; children are composited by the caller.
    pub fn draw(
        &self,
        renderer: &mut dyn Renderer,
        assets: &Assets,
        theme: &Theme,
        bounds: Rect,
        scissor: Rect,
    ) {
        match self {
            WidgetKind::Container => {}
            WidgetKind::Label(label) => {
                let color = label.color;
                let origin = Point::new(bounds.x, bounds.y);
                if label.show_cursor {
                    let mut text = label.text.clone();
                    text.push('_');
                    draw_text(renderer, &assets.font, &text, origin, color, scissor);
                } else {
                    draw_text(renderer, &assets.font, &label.text, origin, color, scissor);
                }
            }
            WidgetKind::Image(image) => {
                let Some(source) = image.skin.active_region() else {
                    return;
                };
                let dest = if image.scale {
                    bounds
                } else {
                    Rect::new(bounds.x, bounds.y, source.width, source.height)
                };
                if let Some(clipped) = clip_draw_call(source, dest, scissor) {
                    renderer.draw_quad(
                        image.skin.texture(assets.atlas),
                        clipped.source,
                        clipped.dest,
                        image.tint,
                    );
                }
            }
            WidgetKind::Panel(panel) => {
                panel.skin.draw(renderer, assets.atlas, bounds, scissor);
            }
            WidgetKind::CheckBox(check) => {
                let mut box_w = 0;
                if let Some(source) = check.face_region() {
                    box_w = source.width;
                    let dest = Rect::new(
                        bounds.x,
                        bounds.y + (bounds.height - source.height) / 2,
                        source.width,
                        source.height,
                    );
                    if let Some(clipped) = clip_draw_call(source, dest, scissor) {
                        renderer.draw_quad(
                            check.skin.texture(assets.atlas),
                            clipped.source,
                            clipped.dest,
                            WHITE,
                        );
                    }
                }
                let (_, text_h) = assets.font.measure(&check.text);
                let text_pos = Point::new(
                    bounds.x + box_w + theme.item_h_margin,
                    bounds.y + (bounds.height - text_h) / 2,
                );
                draw_text(
                    renderer,
                    &assets.font,
                    &check.text,
                    text_pos,
                    theme.text_color,
                    scissor,
                );
            }
            WidgetKind::MenuBar(bar) => {
                bar.skin.draw(renderer, assets.atlas, bounds, scissor);
            }
            WidgetKind::MenuButton(button) => {
                if button.highlighted && button.enabled {
                    button.highlight.draw(renderer, assets.atlas, bounds, scissor);
                }
                if let Some(icon) = button.icon {
                    let dest = Rect::new(
                        bounds.x + (button.icon_margin - icon.width).max(0) / 2,
                        bounds.y + (bounds.height - icon.height) / 2,
                        icon.width,
                        icon.height,
                    );
                    let tint = if button.enabled {
                        WHITE
                    } else {
                        theme.disabled_icon_tint
                    };
                    if let Some(clipped) = clip_draw_call(icon, dest, scissor) {
                        renderer.draw_quad(
                            crate::render::TextureRef::Texture(assets.atlas),
                            clipped.source,
                            clipped.dest,
                            tint,
                        );
                    }
                }
                let color = if button.enabled {
                    theme.text_color
                } else {
                    theme.disabled_text_color
                };
                let (_, text_h) = assets.font.measure(&button.text);
                let text_pos = Point::new(
                    bounds.x + button.icon_margin + theme.item_h_margin,
                    bounds.y + (bounds.height - text_h) / 2,
                );
                draw_text(renderer, &assets.font, &button.text, text_pos, color, scissor);
                if button.show_arrow {
                    let arrow = theme.arrow_skin;
                    let dest = Rect::new(
                        bounds.right() - arrow.width - theme.item_h_margin,
                        bounds.y + (bounds.height - arrow.height) / 2,
                        arrow.width,
                        arrow.height,
                    );
                    let tint = if button.enabled {
                        WHITE
                    } else {
                        theme.disabled_icon_tint
                    };
                    if let Some(clipped) = clip_draw_call(arrow, dest, scissor) {
                        renderer.draw_quad(
                            crate::render::TextureRef::Texture(assets.atlas),
                            clipped.source,
                            clipped.dest,
                            tint,
                        );
                    }
                }
            }
            WidgetKind::Separator => {
                let source = theme.separator_skin;
                if let Some(clipped) = clip_draw_call(source, bounds, scissor) {
                    renderer.draw_quad(
                        crate::render::TextureRef::Texture(assets.atlas),
                        clipped.source,
                        clipped.dest,
                        WHITE,
                    );
                }
            }
            WidgetKind::PopUpMenu(popup) => {
                popup.skin.draw(renderer, assets.atlas, bounds, scissor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{RecordingRenderer, TextureRef};
    use crate::skin::SkinSet;

    fn assets(renderer: &mut RecordingRenderer) -> Assets {
        let atlas = renderer.create_texture(256, 256, &[]);
        let font_tex = renderer.create_texture(128, 96, &[]);
        Assets {
            atlas,
            font: GlyphFont {
                texture: font_tex,
                cell_width: 8,
                cell_height: 16,
            },
        }
    }

    #[test]
    fn container_draws_nothing() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        WidgetKind::Container.draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 50, 50),
            Rect::new(0, 0, 100, 100),
        );
        r.end_pass();
        assert_eq!(r.quads().count(), 0);
    }

    #[test]
    fn label_inside_clip_draws_unmodified() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        let label = WidgetKind::Label(LabelWidget::new("Hello", theme.text_color));

        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        label.draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 50, 20),
            Rect::new(0, 0, 100, 100),
        );
        r.end_pass();

        let quads: Vec<_> = r.quads().collect();
        assert_eq!(quads.len(), 5);
        // Each glyph dest matches its full fixed cell: nothing was trimmed.
        for (i, (_, source, dest)) in quads.iter().enumerate() {
            assert_eq!(dest.width, 8);
            assert_eq!(dest.height, 16);
            assert_eq!(dest.x, i as i32 * 8);
            assert_eq!(source.width, 8);
        }
    }

    #[test]
    fn label_clips_partially_visible_glyphs() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        let label = WidgetKind::Label(LabelWidget::new("Hello", theme.text_color));

        // Scissor cuts off after 20px: two full glyphs + 4px of the third.
        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        label.draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 50, 20),
            Rect::new(0, 0, 20, 100),
        );
        r.end_pass();

        let quads: Vec<_> = r.quads().collect();
        assert_eq!(quads.len(), 3);
        assert_eq!(quads[2].2.width, 4);
        // 1:1 glyph blit: the source is trimmed in step.
        assert_eq!(quads[2].1.width, 4);
    }

    #[test]
    fn cursor_appends_a_glyph() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        let mut label = LabelWidget::new("ab", theme.text_color);
        label.show_cursor = true;

        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        WidgetKind::Label(label).draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 50, 20),
            Rect::new(0, 0, 100, 100),
        );
        r.end_pass();
        assert_eq!(r.quads().count(), 3);
    }

    #[test]
    fn disabled_button_uses_disabled_colors() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        let mut button = MenuButtonWidget::new("File");
        button.enabled = false;
        button.highlighted = true; // disabled: no highlight drawn
        button.highlight = SkinSet::single(theme.highlight_skin).expect("region");

        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        WidgetKind::MenuButton(button).draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 60, 20),
            Rect::new(0, 0, 200, 200),
        );
        r.end_pass();

        // Only the four label glyphs; the highlight was suppressed.
        let calls: Vec<_> = r.quads().collect();
        assert_eq!(calls.len(), 4);
        for (tex, ..) in &calls {
            assert_eq!(**tex, TextureRef::Texture(assets.font.texture));
        }
    }

    #[test]
    fn check_box_face_follows_checked_state_with_fallback() {
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();
        let skin = SkinSet::toggle(theme.check_box_skin, theme.check_box_checked_skin)
            .expect("regions");
        let mut check = CheckBoxWidget::new("Grid", skin);

        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        WidgetKind::CheckBox(check.clone()).draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 120, 20),
            Rect::new(0, 0, 200, 200),
        );
        r.end_pass();
        let (_, source, _) = r.quads().next().expect("box face");
        assert_eq!(*source, theme.check_box_skin);
        // Box face plus one glyph per label character.
        assert_eq!(r.quads().count(), 1 + 4);

        // Checked and hovered with no CheckedHover region registered:
        // falls back to the plain checked face.
        check.checked = true;
        check.highlighted = true;
        r.clear_calls();
        r.begin_pass(None, crate::render::BlendMode::SourceOver, None);
        WidgetKind::CheckBox(check).draw(
            &mut r,
            &assets,
            &theme,
            Rect::new(0, 0, 120, 20),
            Rect::new(0, 0, 200, 200),
        );
        r.end_pass();
        let (_, source, _) = r.quads().next().expect("box face");
        assert_eq!(*source, theme.check_box_checked_skin);
    }

    #[test]
    fn popup_restricts_children_to_menu_items() {
        let popup = WidgetKind::PopUpMenu(PopUpWidget::new(SkinSet::new()));
        assert!(popup.accepts_child(&WidgetKind::MenuButton(MenuButtonWidget::new("x"))));
        assert!(popup.accepts_child(&WidgetKind::Separator));
        assert!(!popup.accepts_child(&WidgetKind::Label(LabelWidget::new("x", WHITE))));
        assert!(!popup.accepts_child(&WidgetKind::Container));

        let bar = WidgetKind::MenuBar(MenuBarWidget {
            skin: SkinSet::new(),
        });
        assert!(bar.accepts_child(&WidgetKind::MenuButton(MenuButtonWidget::new("x"))));
        assert!(!bar.accepts_child(&WidgetKind::Separator));
    }
}
