//! Top-level GUI coordinator: owns the tree, interaction state, and theme,
//! and routes pointer traffic through the menu intercepts before normal
//! dispatch.

use crate::clip::Rect;
use crate::compositor;
use crate::content::Assets;
use crate::input::{GuiEvent, InputState, Key, MouseButton, PointerEvent};
use crate::menu::MenuContext;
use crate::render::Renderer;
use crate::theme::Theme;
use crate::tree::{ComponentTree, NodeId};
use crate::widgets::WidgetKind;

pub struct GuiManager {
    pub tree: ComponentTree,
    pub input: InputState,
    pub theme: Theme,
    /// Menu bars registered for pointer interception.
    menu_bars: Vec<NodeId>,
}

impl GuiManager {
    pub fn new(theme: Theme) -> Self {
        Self {
            tree: ComponentTree::new(),
            input: InputState::new(),
            theme,
            menu_bars: Vec::new(),
        }
    }

    /// Add a top-level node. Menu bars start intercepting pointer events
    /// as soon as they are added.
    pub fn add(&mut self, widget: WidgetKind) -> NodeId {
        let is_bar = matches!(widget, WidgetKind::MenuBar(_));
        let id = self.tree.insert_root(widget);
        if is_bar {
            self.menu_bars.push(id);
        }
        self.tree.initialize(id);
        id
    }

    /// Remove a node and its subtree, releasing cached images and
    /// forgetting any interaction state that pointed into it.
    pub fn remove(&mut self, id: NodeId, renderer: &mut dyn Renderer) {
        let mut doomed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            doomed.push(next);
            if let Some(n) = self.tree.get(next) {
                stack.extend(n.children.iter().copied());
                // Popups die with their button even while detached.
                if let WidgetKind::MenuButton(b) = &n.widget
                    && let Some(popup) = b.popup
                {
                    stack.push(popup);
                }
            }
        }
        for d in &doomed {
            self.input.forget(*d);
        }
        self.menu_bars.retain(|b| !doomed.contains(b));
        self.tree.remove(id, renderer);
    }

    pub fn bring_to_top(&mut self, id: NodeId) {
        self.tree.bring_to_top(id);
    }

    pub fn set_focus(&mut self, id: Option<NodeId>) {
        self.input.set_focus(id);
    }

    /// Drain the next queued toolkit event.
    pub fn poll_event(&mut self) -> Option<GuiEvent> {
        self.input.poll_event()
    }

    /// Route one pointer event: menu intercepts first, then hit-test
    /// dispatch, then hover-highlight upkeep for menu buttons. Returns
    /// true when the GUI consumed the event.
    pub fn handle_pointer(&mut self, assets: &Assets, event: PointerEvent) -> bool {
        let mut ctx = MenuContext {
            tree: &mut self.tree,
            input: &mut self.input,
            theme: &self.theme,
            font: &assets.font,
        };
        let menu_consumed = ctx.on_pointer(&self.menu_bars, event);

        let hovered_before = self.input.hovered;
        let captured_before = self.input.captured;
        let clicked = self.input.handle_pointer(&self.tree, event);
        let hovered_after = self.input.hovered;

        if hovered_before != hovered_after {
            if let Some(old) = hovered_before {
                self.leave_highlight(old);
            }
            if let Some(new) = hovered_after {
                self.enter_highlight(new);
            }
        }

        // Check boxes show their pressed face while captured and toggle on
        // a completed click.
        match event {
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                ..
            } => {
                if let Some(id) = self.input.captured {
                    self.set_check_box_pressed(id, true);
                }
            }
            PointerEvent::ButtonUp {
                button: MouseButton::Left,
                ..
            } => {
                if let Some(id) = captured_before {
                    self.set_check_box_pressed(id, false);
                }
            }
            _ => {}
        }
        if let Some(id) = clicked {
            self.toggle_check_box(id);
        }

        // Consumed events should be withheld from whatever sits under the
        // GUI in the host application. A captured node eats the event even
        // when the cursor has wandered off every widget.
        let (x, y) = event.position();
        menu_consumed || captured_before.is_some() || self.tree.hit_test(x, y).is_some()
    }

    /// Route one key press: the menu layer sees it first (Escape closes an
    /// open cascade), then the focused node. Returns true when consumed.
    pub fn handle_key(&mut self, assets: &Assets, key: Key) -> bool {
        let mut ctx = MenuContext {
            tree: &mut self.tree,
            input: &mut self.input,
            theme: &self.theme,
            font: &assets.font,
        };
        if ctx.on_key(&self.menu_bars, key) {
            return true;
        }
        self.input.handle_key(&self.tree, key)
    }

    /// Recompute a menu bar's button strip after its buttons change.
    pub fn layout_menu_bar(&mut self, assets: &Assets, bar: NodeId) {
        let mut ctx = MenuContext {
            tree: &mut self.tree,
            input: &mut self.input,
            theme: &self.theme,
            font: &assets.font,
        };
        ctx.layout_bar(bar);
    }

    fn enter_highlight(&mut self, id: NodeId) {
        let changed = match self.tree.get_mut(id).map(|n| &mut n.widget) {
            Some(WidgetKind::MenuButton(b)) if b.enabled && !b.highlighted => {
                b.highlighted = true;
                true
            }
            Some(WidgetKind::CheckBox(c)) if !c.highlighted => {
                c.highlighted = true;
                true
            }
            _ => false,
        };
        if changed {
            self.tree.mark_redraw(id);
        }
    }

    /// Open buttons keep their highlight while the cursor roams their
    /// cascade.
    fn leave_highlight(&mut self, id: NodeId) {
        let changed = match self.tree.get_mut(id).map(|n| &mut n.widget) {
            Some(WidgetKind::MenuButton(b)) if b.highlighted && !b.popup_open => {
                b.highlighted = false;
                true
            }
            Some(WidgetKind::CheckBox(c)) if c.highlighted => {
                c.highlighted = false;
                true
            }
            _ => false,
        };
        if changed {
            self.tree.mark_redraw(id);
        }
    }

    fn set_check_box_pressed(&mut self, id: NodeId, on: bool) {
        let changed = match self.tree.get_mut(id).map(|n| &mut n.widget) {
            Some(WidgetKind::CheckBox(c)) if c.pressed != on => {
                c.pressed = on;
                true
            }
            _ => false,
        };
        if changed {
            self.tree.mark_redraw(id);
        }
    }

    /// A completed click on a check box flips it and reports the new state.
    fn toggle_check_box(&mut self, id: NodeId) {
        let checked = match self.tree.get_mut(id).map(|n| &mut n.widget) {
            Some(WidgetKind::CheckBox(c)) => {
                c.checked = !c.checked;
                Some(c.checked)
            }
            _ => None,
        };
        if let Some(checked) = checked {
            self.tree.mark_redraw(id);
            self.input.push_event(GuiEvent::Toggled(id, checked));
        }
    }

    /// Regenerate stale caches and present the frame.
    pub fn draw(
        &mut self,
        renderer: &mut dyn Renderer,
        assets: &Assets,
        screen: Rect,
        clear: Option<[f32; 4]>,
    ) {
        compositor::refresh(&mut self.tree, renderer, assets, &self.theme);
        compositor::present(&mut self.tree, renderer, assets, &self.theme, screen, clear);
    }

    /// Drop every cached image after the graphics device was lost. Caches
    /// regenerate on the next draw.
    pub fn device_reset(&mut self, renderer: &mut dyn Renderer) {
        self.tree.invalidate_all(renderer);
    }

    /// Release every render target ahead of shutdown.
    pub fn clean_up(&mut self, renderer: &mut dyn Renderer) {
        self.tree.invalidate_all(renderer);
    }
}
