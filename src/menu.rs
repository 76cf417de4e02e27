//! Menu bar and cascading popup state machine.
//!
//! Menu state lives on the widgets themselves (`popup_open`, `selected`,
//! click counters); this module owns the transitions. Popups are detached
//! nodes owned by their button and attached as top-level roots while open,
//! so they draw above everything without z-order fights inside the bar.
//!
//! Logical misuse (double-open, closing a closed popup) is a safe no-op
//! throughout, never an error.

use crate::clip::Rect;
use crate::input;
use crate::render::{GlyphFont, GuiError};
use crate::theme::Theme;
use crate::tree::{ComponentTree, NodeId};
use crate::widgets::WidgetKind;

/// Link a popup to its owning menu button. The popup stays detached until
/// the button is selected.
pub fn set_popup(tree: &mut ComponentTree, button: NodeId, popup: NodeId) -> Result<(), GuiError> {
    match tree.get(popup).map(|n| &n.widget) {
        Some(WidgetKind::PopUpMenu(_)) => {}
        _ => return Err(GuiError::InvalidArgument("popup must be a popup menu node")),
    }
    match tree.get_mut(button).map(|n| &mut n.widget) {
        Some(WidgetKind::MenuButton(b)) => b.popup = Some(popup),
        _ => return Err(GuiError::InvalidArgument("owner must be a menu button node")),
    }
    if let Some(node) = tree.get_mut(popup)
        && let WidgetKind::PopUpMenu(p) = &mut node.widget
    {
        p.owner = Some(button);
    }
    Ok(())
}

/// Whether the point lies anywhere in the menu structure rooted at this
/// button: the button itself, its open popup, or any open descendant.
pub fn contains_menu_point(tree: &ComponentTree, button: NodeId, x: i32, y: i32) -> bool {
    if tree.contains_point(button, x, y) {
        return true;
    }
    let Some((popup, open)) = button_popup(tree, button) else {
        return false;
    };
    if !open {
        return false;
    }
    if tree.contains_point(popup, x, y) {
        return true;
    }
    let items = tree.get(popup).map(|n| n.children.to_vec()).unwrap_or_default();
    items
        .iter()
        .any(|&item| is_menu_button(tree, item) && contains_menu_point(tree, item, x, y))
}

/// Mutating menu operations bundled with their collaborators.
pub struct MenuContext<'a> {
    pub tree: &'a mut ComponentTree,
    pub input: &'a mut input::InputState,
    pub theme: &'a Theme,
    pub font: &'a GlyphFont,
}

impl MenuContext<'_> {
    /// Open a button's popup. Disabled buttons, buttons without a popup or
    /// with an empty one are a no-op; an already-open popup is brought to
    /// the top instead.
    pub fn select(&mut self, button: NodeId) {
        let Some(WidgetKind::MenuButton(b)) = self.tree.get(button).map(|n| &n.widget) else {
            return;
        };
        let (enabled, popup, open) = (b.enabled, b.popup, b.popup_open);
        let Some(popup) = popup else {
            return;
        };
        if open {
            self.tree.bring_to_top(popup);
            return;
        }
        let has_items = self.tree.get(popup).is_some_and(|n| !n.children.is_empty());
        if !enabled || !has_items {
            return;
        }

        // At most one open sibling: the previous selection's whole cascade
        // closes before this one opens.
        if let Some(parent) = self.tree.get(button).and_then(|n| n.parent) {
            if let Some(open_sibling) = open_child(self.tree, parent)
                && open_sibling != button
            {
                self.close_cascade(open_sibling);
            }
            if let Some(node) = self.tree.get_mut(parent)
                && let WidgetKind::PopUpMenu(p) = &mut node.widget
            {
                p.selected = Some(button);
            }
        }

        self.populate(popup);

        // Below the button when sitting in a bar, beside it when nested.
        let button_node = self.tree.get(button);
        let (abs, height) = match button_node {
            Some(n) => (n.abs, n.bounds.height),
            None => return,
        };
        let parent = self.tree.get(button).and_then(|n| n.parent);
        let in_bar = parent
            .and_then(|p| self.tree.get(p))
            .is_some_and(|n| matches!(n.widget, WidgetKind::MenuBar(_)));
        let (x, y) = if in_bar {
            (abs.x, abs.y + height - 1)
        } else {
            let parent_node = parent.and_then(|p| self.tree.get(p));
            match parent_node {
                Some(p) => (p.abs.x + p.bounds.width - 1, abs.y),
                None => (abs.x, abs.y + height - 1),
            }
        };
        if self.tree.set_position(popup, x, y).is_err() {
            return;
        }

        if self.tree.attach_root(popup).is_err() {
            return;
        }
        self.tree.bring_to_top(popup);
        self.tree.initialize(popup);
        self.input.set_focus(Some(popup));

        if let Some(node) = self.tree.get_mut(button)
            && let WidgetKind::MenuButton(b) = &mut node.widget
        {
            b.popup_open = true;
            b.num_clicks = 0;
            b.highlighted = true;
        }
        self.tree.mark_redraw(button);
    }

    /// Open via hover traversal: the close counter starts armed so the
    /// next release anywhere on the button dismisses the popup.
    pub fn select_by_move(&mut self, button: NodeId) {
        let already_open = matches!(
            self.tree.get(button).map(|n| &n.widget),
            Some(WidgetKind::MenuButton(b)) if b.popup_open
        );
        if already_open {
            return;
        }
        self.select(button);
        if let Some(node) = self.tree.get_mut(button)
            && let WidgetKind::MenuButton(b) = &mut node.widget
            && b.popup_open
        {
            b.num_clicks = 1;
        }
    }

    /// Close a button's popup and, first, every open descendant below it.
    /// Closing a closed popup is a no-op.
    pub fn close_cascade(&mut self, button: NodeId) {
        let Some((popup, open)) = button_popup(self.tree, button) else {
            return;
        };
        if !open {
            return;
        }

        // Recursive teardown, innermost first, so no open submenu is ever
        // orphaned.
        if let Some(selected) = popup_selected(self.tree, popup) {
            self.close_cascade(selected);
        }

        self.tree.detach(popup);
        self.input.forget(popup);
        if let Some(node) = self.tree.get_mut(popup)
            && let WidgetKind::PopUpMenu(p) = &mut node.widget
        {
            p.populated = false;
            p.selected = None;
        }
        if let Some(node) = self.tree.get_mut(button)
            && let WidgetKind::MenuButton(b) = &mut node.widget
        {
            b.popup_open = false;
            b.highlighted = false;
        }
        self.tree.mark_redraw(button);

        // Tell the owning popup its selection is gone.
        if let Some(parent) = self.tree.get(button).and_then(|n| n.parent)
            && let Some(node) = self.tree.get_mut(parent)
            && let WidgetKind::PopUpMenu(p) = &mut node.widget
            && p.selected == Some(button)
        {
            p.selected = None;
        }
    }

    /// Close the entire chain containing this button, outermost-in:
    /// propagates from the given node out to the bar-level ancestor, then
    /// tears the cascade down from there.
    pub fn close_all(&mut self, from: NodeId) {
        let mut outer = from;
        loop {
            let owner = self
                .tree
                .get(outer)
                .and_then(|n| n.parent)
                .and_then(|p| match self.tree.get(p).map(|n| &n.widget) {
                    Some(WidgetKind::PopUpMenu(popup)) => popup.owner,
                    _ => None,
                });
            match owner {
                Some(o) => outer = o,
                None => break,
            }
        }
        self.close_cascade(outer);
    }

    /// Lay out a bar's buttons in a left-to-right strip. Button widths come
    /// from their measured labels; heights fill the bar.
    pub fn layout_bar(&mut self, bar: NodeId) {
        let Some(node) = self.tree.get(bar) else {
            return;
        };
        if !matches!(node.widget, WidgetKind::MenuBar(_)) {
            return;
        }
        let items = node.children.to_vec();
        let height = node.bounds.height;
        let h_margin = self.theme.item_h_margin;
        let mut x = 0;
        for &item in &items {
            let width = match self.tree.get(item).map(|n| &n.widget) {
                Some(WidgetKind::MenuButton(b)) => {
                    let (text_w, _) = self.font.measure(&b.text);
                    h_margin * 2 + text_w
                }
                _ => continue,
            };
            let _ = self.tree.set_bounds(item, Rect::new(x, 0, width, height));
            x += width;
        }
    }

    /// Lay out a popup's items in a vertical stack, widened to the widest
    /// item. Runs once per opening; highlights and close counters reset.
    pub fn populate(&mut self, popup: NodeId) {
        let already = matches!(
            self.tree.get(popup).map(|n| &n.widget),
            Some(WidgetKind::PopUpMenu(p)) if p.populated
        );
        if already {
            return;
        }
        let items = match self.tree.get(popup) {
            Some(n) => n.children.to_vec(),
            None => return,
        };
        let margin = self.theme.popup_margin;
        let h_margin = self.theme.item_h_margin;
        let v_margin = self.theme.item_v_margin;
        let arrow = self.theme.arrow_skin;

        // Icon column is shared by every item; sized to the widest icon.
        let icon_margin = items
            .iter()
            .filter_map(|&item| match self.tree.get(item).map(|n| &n.widget) {
                Some(WidgetKind::MenuButton(b)) => b.icon.map(|i| i.width + h_margin),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let mut width = 0;
        let mut height = margin;
        let mut placed: Vec<(NodeId, Rect)> = Vec::new();

        for &item in &items {
            let item_size = match self.tree.get_mut(item).map(|n| &mut n.widget) {
                Some(WidgetKind::MenuButton(b)) => {
                    b.highlighted = false;
                    b.num_clicks = 0;
                    b.icon_margin = icon_margin;
                    let has_items = b.popup.is_some();
                    b.show_arrow = has_items;
                    let (text_w, text_h) = self.font.measure(&b.text);
                    let mut w = h_margin * 2 + icon_margin + text_w;
                    if has_items {
                        w += arrow.width + h_margin;
                    }
                    (w, text_h + v_margin * 2)
                }
                Some(WidgetKind::Separator) => {
                    (self.theme.separator_skin.width, self.theme.separator_skin.height + v_margin * 2)
                }
                _ => continue,
            };
            placed.push((item, Rect::new(margin, height, item_size.0, item_size.1)));
            width = width.max(item_size.0);
            height += item_size.1;
        }

        for (item, rect) in placed {
            let widened = Rect::new(rect.x, rect.y, width, rect.height);
            let _ = self.tree.set_bounds(item, widened);
        }

        let _ = self
            .tree
            .set_size(popup, width + margin * 2, height + margin);

        if let Some(node) = self.tree.get_mut(popup)
            && let WidgetKind::PopUpMenu(p) = &mut node.widget
        {
            p.populated = true;
        }
    }

    /// Intercept a pointer event before normal dispatch. `bars` are the
    /// registered menu bars. Returns true when the event was consumed by
    /// menu logic.
    pub fn on_pointer(&mut self, bars: &[NodeId], event: input::PointerEvent) -> bool {
        let (x, y) = event.position();
        let mut consumed = false;
        for &bar in bars {
            match event {
                input::PointerEvent::Moved { .. } => {
                    let Some(open) = open_child(self.tree, bar) else {
                        continue;
                    };
                    // Hover traversal across bar siblings while a menu is
                    // open.
                    if let Some(sibling) = child_button_at(self.tree, bar, x, y) {
                        if sibling != open {
                            self.close_cascade(open);
                            self.select_by_move(sibling);
                        }
                        consumed = true;
                    } else {
                        consumed |= self.move_intercept(open, x, y);
                    }
                }
                input::PointerEvent::ButtonDown {
                    button: input::MouseButton::Left,
                    ..
                } => {
                    if let Some(hit) = child_button_at(self.tree, bar, x, y) {
                        self.select(hit);
                        consumed = true;
                    } else if let Some(open) = open_child(self.tree, bar) {
                        if let Some(item) = cascade_button_at(self.tree, open, x, y) {
                            self.select(item);
                            consumed = true;
                        } else if !contains_menu_point(self.tree, open, x, y) {
                            // Pressed outside the whole structure.
                            self.close_all(open);
                        }
                    }
                }
                input::PointerEvent::ButtonUp {
                    button: input::MouseButton::Left,
                    ..
                } => {
                    let Some(open) = open_child(self.tree, bar) else {
                        continue;
                    };
                    if self.tree.contains_point(open, x, y) {
                        // Click counting on the open bar button: the press
                        // that opened it releases here once; the next
                        // release closes.
                        let close = match self.tree.get_mut(open).map(|n| &mut n.widget) {
                            Some(WidgetKind::MenuButton(b)) if b.popup_open => {
                                b.num_clicks += 1;
                                b.num_clicks > 1
                            }
                            _ => false,
                        };
                        if close {
                            self.close_cascade(open);
                            // Pointer is still on the button.
                            set_highlight(self.tree, open, true);
                        }
                        consumed = true;
                    } else {
                        consumed |= self.release_intercept(open, x, y);
                    }
                }
                _ => {}
            }
        }
        consumed
    }

    /// Intercept a key press before focus dispatch. Escape collapses the
    /// open cascade of any registered bar.
    pub fn on_key(&mut self, bars: &[NodeId], key: input::Key) -> bool {
        if key != input::Key::Escape {
            return false;
        }
        let mut consumed = false;
        for &bar in bars {
            if let Some(open) = open_child(self.tree, bar) {
                self.close_cascade(open);
                consumed = true;
            }
        }
        consumed
    }

    /// Hover handling inside an open cascade: moving onto a different item
    /// in a shown popup closes the previous selection and hover-opens the
    /// new one.
    fn move_intercept(&mut self, button: NodeId, x: i32, y: i32) -> bool {
        let Some((popup, open)) = button_popup(self.tree, button) else {
            return false;
        };
        if !open {
            return false;
        }
        if self.tree.contains_point(popup, x, y) {
            if let Some(item) = child_button_at(self.tree, popup, x, y) {
                let selected = popup_selected(self.tree, popup);
                if selected != Some(item) {
                    if let Some(sel) = selected {
                        self.close_cascade(sel);
                    }
                    self.select_by_move(item);
                }
            }
            true
        } else if let Some(selected) = popup_selected(self.tree, popup) {
            self.move_intercept(selected, x, y)
        } else {
            false
        }
    }

    /// Release inside an open cascade: a leaf item click fires the chosen
    /// event and collapses the whole chain.
    fn release_intercept(&mut self, button: NodeId, x: i32, y: i32) -> bool {
        let Some((popup, open)) = button_popup(self.tree, button) else {
            return false;
        };
        if !open {
            return false;
        }
        if self.tree.contains_point(popup, x, y) {
            if let Some(item) = child_button_at(self.tree, popup, x, y) {
                let leaf_enabled = matches!(
                    self.tree.get(item).map(|n| &n.widget),
                    Some(WidgetKind::MenuButton(b)) if b.popup.is_none() && b.enabled
                );
                if leaf_enabled {
                    self.input.push_event(input::GuiEvent::MenuItemChosen(item));
                    self.close_all(item);
                }
            }
            true
        } else if let Some(selected) = popup_selected(self.tree, popup) {
            self.release_intercept(selected, x, y)
        } else {
            false
        }
    }
}

fn is_menu_button(tree: &ComponentTree, id: NodeId) -> bool {
    matches!(
        tree.get(id).map(|n| &n.widget),
        Some(WidgetKind::MenuButton(_))
    )
}

fn button_popup(tree: &ComponentTree, button: NodeId) -> Option<(NodeId, bool)> {
    match tree.get(button).map(|n| &n.widget) {
        Some(WidgetKind::MenuButton(b)) => b.popup.map(|p| (p, b.popup_open)),
        _ => None,
    }
}

fn popup_selected(tree: &ComponentTree, popup: NodeId) -> Option<NodeId> {
    match tree.get(popup).map(|n| &n.widget) {
        Some(WidgetKind::PopUpMenu(p)) => p.selected,
        _ => None,
    }
}

/// The child menu button of `parent` whose popup is currently open.
fn open_child(tree: &ComponentTree, parent: NodeId) -> Option<NodeId> {
    let node = tree.get(parent)?;
    node.children.iter().copied().find(|&child| {
        matches!(
            tree.get(child).map(|n| &n.widget),
            Some(WidgetKind::MenuButton(b)) if b.popup_open
        )
    })
}

/// The direct child menu button of `parent` under the point, if any.
fn child_button_at(tree: &ComponentTree, parent: NodeId, x: i32, y: i32) -> Option<NodeId> {
    let node = tree.get(parent)?;
    node.children
        .iter()
        .copied()
        .find(|&child| is_menu_button(tree, child) && tree.contains_point(child, x, y))
}

/// Search every shown popup in a cascade for a button under the point.
fn cascade_button_at(tree: &ComponentTree, button: NodeId, x: i32, y: i32) -> Option<NodeId> {
    let (popup, open) = button_popup(tree, button)?;
    if !open {
        return None;
    }
    if tree.contains_point(popup, x, y) {
        return child_button_at(tree, popup, x, y);
    }
    popup_selected(tree, popup).and_then(|sel| cascade_button_at(tree, sel, x, y))
}

fn set_highlight(tree: &mut ComponentTree, button: NodeId, on: bool) {
    let changed = match tree.get_mut(button).map(|n| &mut n.widget) {
        Some(WidgetKind::MenuButton(b)) if b.highlighted != on => {
            b.highlighted = on;
            true
        }
        _ => false,
    };
    if changed {
        tree.mark_redraw(button);
    }
}
