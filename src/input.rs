//! Pointer and keyboard dispatch, focus, and capture.
//!
//! Interactions surface as a typed event queue the host drains each frame,
//! rather than per-widget callbacks. Menu interception happens a layer
//! above, in the manager, before events reach this dispatcher.

use std::collections::VecDeque;

use crate::tree::{ComponentTree, NodeId};

/// Mouse button identifier (decoupled from winit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A pointer event in absolute screen coordinates.
#[derive(Debug, Clone, Copy)]
pub enum PointerEvent {
    Moved { x: i32, y: i32 },
    ButtonDown { button: MouseButton, x: i32, y: i32 },
    ButtonUp { button: MouseButton, x: i32, y: i32 },
}

impl PointerEvent {
    pub fn position(&self) -> (i32, i32) {
        match *self {
            PointerEvent::Moved { x, y }
            | PointerEvent::ButtonDown { x, y, .. }
            | PointerEvent::ButtonUp { x, y, .. } => (x, y),
        }
    }
}

/// Keyboard key identifier (decoupled from winit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

/// Events emitted by the toolkit for the host to consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiEvent {
    /// Cursor entered a node's bounds.
    PointerEntered(NodeId),
    /// Cursor left a node's bounds.
    PointerLeft(NodeId),
    /// Press and release landed on the same node.
    Clicked(NodeId, MouseButton),
    /// A key went down while the node held keyboard focus.
    KeyPressed(NodeId, Key),
    /// A check box changed state.
    Toggled(NodeId, bool),
    /// A leaf menu item was activated (the cascade has closed).
    MenuItemChosen(NodeId),
    FocusChanged {
        from: Option<NodeId>,
        to: Option<NodeId>,
    },
}

/// Interaction state for the component tree.
pub struct InputState {
    /// Node currently under the cursor.
    pub hovered: Option<NodeId>,
    /// Node receiving keyboard focus.
    pub focused: Option<NodeId>,
    /// Node that received the initial pointer-down. While set, every
    /// pointer event routes here regardless of cursor position; released
    /// on pointer-up.
    pub captured: Option<NodeId>,
    pressed_button: Option<MouseButton>,
    /// Last known cursor position.
    pub cursor: (i32, i32),
    events: VecDeque<GuiEvent>,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            hovered: None,
            focused: None,
            captured: None,
            pressed_button: None,
            cursor: (0, 0),
            events: VecDeque::new(),
        }
    }

    /// Drain the next queued event.
    pub fn poll_event(&mut self) -> Option<GuiEvent> {
        self.events.pop_front()
    }

    pub fn push_event(&mut self, event: GuiEvent) {
        self.events.push_back(event);
    }

    /// Route one pointer event through the tree. Returns the node that
    /// registered a click, if any.
    pub fn handle_pointer(&mut self, tree: &ComponentTree, event: PointerEvent) -> Option<NodeId> {
        match event {
            PointerEvent::Moved { x, y } => {
                self.cursor = (x, y);
                self.update_hover(tree, x, y);
                None
            }
            PointerEvent::ButtonDown { button, x, y } => {
                self.cursor = (x, y);
                self.update_hover(tree, x, y);
                let hit = tree.hit_test(x, y);
                if let Some(id) = hit {
                    self.captured = Some(id);
                    self.pressed_button = Some(button);
                    if button == MouseButton::Left
                        && tree.get(id).is_some_and(|n| n.focusable)
                        && self.focused != Some(id)
                    {
                        self.set_focus(Some(id));
                    }
                } else if self.focused.is_some() {
                    // Press on empty space clears focus.
                    self.set_focus(None);
                }
                None
            }
            PointerEvent::ButtonUp { button, x, y } => {
                self.cursor = (x, y);
                let captured = self.captured.take();
                let pressed_button = self.pressed_button.take();
                let mut clicked = None;
                if let Some(id) = captured
                    && pressed_button == Some(button)
                    && tree.contains_point(id, x, y)
                    && tree.enabled_resolved(id)
                {
                    self.events.push_back(GuiEvent::Clicked(id, button));
                    clicked = Some(id);
                }
                self.update_hover(tree, x, y);
                clicked
            }
        }
    }

    /// Deliver a key press to the focused node. Returns true when a node
    /// received it.
    pub fn handle_key(&mut self, tree: &ComponentTree, key: Key) -> bool {
        match self.focused {
            Some(id) if tree.enabled_resolved(id) => {
                self.events.push_back(GuiEvent::KeyPressed(id, key));
                true
            }
            _ => false,
        }
    }

    fn update_hover(&mut self, tree: &ComponentTree, x: i32, y: i32) {
        let hit = tree.hit_test(x, y);
        if hit != self.hovered {
            if let Some(old) = self.hovered {
                self.events.push_back(GuiEvent::PointerLeft(old));
            }
            if let Some(new) = hit {
                self.events.push_back(GuiEvent::PointerEntered(new));
            }
            self.hovered = hit;
        }
    }

    /// Move keyboard focus, emitting a change event.
    pub fn set_focus(&mut self, to: Option<NodeId>) {
        if self.focused == to {
            return;
        }
        let from = self.focused;
        self.focused = to;
        self.events.push_back(GuiEvent::FocusChanged { from, to });
    }

    /// Forget any state referring to a node that left the tree.
    pub fn forget(&mut self, id: NodeId) {
        if self.hovered == Some(id) {
            self.hovered = None;
        }
        if self.captured == Some(id) {
            self.captured = None;
            self.pressed_button = None;
        }
        if self.focused == Some(id) {
            self.set_focus(None);
        }
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Rect;
    use crate::skin::SkinSet;
    use crate::widgets::{PanelWidget, PopUpWidget, WidgetKind};

    fn panel_tree() -> (ComponentTree, NodeId, NodeId) {
        let mut tree = ComponentTree::new();
        let a = tree.insert_root(WidgetKind::Panel(PanelWidget {
            skin: SkinSet::new(),
        }));
        tree.set_bounds(a, Rect::new(0, 0, 100, 100)).expect("set");
        let b = tree.insert_root(WidgetKind::Panel(PanelWidget {
            skin: SkinSet::new(),
        }));
        tree.set_bounds(b, Rect::new(200, 0, 100, 100)).expect("set");
        (tree, a, b)
    }

    fn drain(input: &mut InputState) -> Vec<GuiEvent> {
        let mut out = Vec::new();
        while let Some(e) = input.poll_event() {
            out.push(e);
        }
        out
    }

    #[test]
    fn enter_and_leave_pair_up() {
        let (tree, a, b) = panel_tree();
        let mut input = InputState::new();

        input.handle_pointer(&tree, PointerEvent::Moved { x: 10, y: 10 });
        assert_eq!(drain(&mut input), vec![GuiEvent::PointerEntered(a)]);

        input.handle_pointer(&tree, PointerEvent::Moved { x: 210, y: 10 });
        assert_eq!(
            drain(&mut input),
            vec![GuiEvent::PointerLeft(a), GuiEvent::PointerEntered(b)]
        );

        input.handle_pointer(&tree, PointerEvent::Moved { x: 150, y: 10 });
        assert_eq!(drain(&mut input), vec![GuiEvent::PointerLeft(b)]);
    }

    #[test]
    fn click_requires_release_on_the_pressed_node() {
        let (tree, a, b) = panel_tree();
        let mut input = InputState::new();

        input.handle_pointer(
            &tree,
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                x: 10,
                y: 10,
            },
        );
        assert_eq!(input.captured, Some(a));

        // Release over the other panel: capture ends, no click.
        input.handle_pointer(
            &tree,
            PointerEvent::ButtonUp {
                button: MouseButton::Left,
                x: 210,
                y: 10,
            },
        );
        assert_eq!(input.captured, None);
        let events = drain(&mut input);
        assert!(!events.iter().any(|e| matches!(e, GuiEvent::Clicked(..))));

        // Press and release in place: click.
        input.handle_pointer(
            &tree,
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                x: 210,
                y: 10,
            },
        );
        input.handle_pointer(
            &tree,
            PointerEvent::ButtonUp {
                button: MouseButton::Left,
                x: 220,
                y: 20,
            },
        );
        let events = drain(&mut input);
        assert!(
            events
                .iter()
                .any(|e| *e == GuiEvent::Clicked(b, MouseButton::Left))
        );
    }

    #[test]
    fn focus_follows_presses_on_focusable_nodes() {
        let mut tree = ComponentTree::new();
        let popup = tree.insert_root(WidgetKind::PopUpMenu(PopUpWidget::new(SkinSet::new())));
        tree.set_bounds(popup, Rect::new(0, 0, 80, 120)).expect("set");
        let mut input = InputState::new();

        input.handle_pointer(
            &tree,
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                x: 5,
                y: 5,
            },
        );
        assert_eq!(input.focused, Some(popup));

        // Press on empty space clears it.
        input.handle_pointer(
            &tree,
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                x: 500,
                y: 500,
            },
        );
        assert_eq!(input.focused, None);
        let events = drain(&mut input);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, GuiEvent::FocusChanged { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn key_presses_reach_only_the_focused_node() {
        let (mut tree, a, _) = panel_tree();
        let mut input = InputState::new();

        // Nothing focused: the key falls through to the host.
        assert!(!input.handle_key(&tree, Key::Enter));
        assert!(drain(&mut input).is_empty());

        input.set_focus(Some(a));
        drain(&mut input);
        assert!(input.handle_key(&tree, Key::Char('a')));
        assert_eq!(
            drain(&mut input),
            vec![GuiEvent::KeyPressed(a, Key::Char('a'))]
        );

        // Disabling the focus owner stops delivery.
        tree.set_enabled(a, false);
        assert!(!input.handle_key(&tree, Key::Char('b')));
        assert!(drain(&mut input).is_empty());
    }

    #[test]
    fn disabled_nodes_never_emit_clicks() {
        let (mut tree, a, _) = panel_tree();
        let mut input = InputState::new();

        input.handle_pointer(
            &tree,
            PointerEvent::ButtonDown {
                button: MouseButton::Left,
                x: 10,
                y: 10,
            },
        );
        tree.set_enabled(a, false);
        input.handle_pointer(
            &tree,
            PointerEvent::ButtonUp {
                button: MouseButton::Left,
                x: 10,
                y: 10,
            },
        );
        assert!(
            !drain(&mut input)
                .iter()
                .any(|e| matches!(e, GuiEvent::Clicked(..)))
        );
    }
}
