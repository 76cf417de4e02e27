//! Arena-backed retained component tree.
//!
//! Nodes are owned by a slotmap arena and linked by ids, so popups can be
//! detached from their owning button and reattached as top-level roots
//! without fighting the borrow checker. Bounds are parent-local; absolute
//! positions are recomputed eagerly on structural or bounds changes.

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::clip::{Point, Rect};
use crate::render::{GuiError, Renderer, TargetId};
use crate::widgets::WidgetKind;

new_key_type! {
    /// Stable id of a tree node.
    pub struct NodeId;
}

/// Offscreen cache owned by a drawable node. Width/height mirror the
/// target's allocation so a resize can be detected without asking the
/// renderer.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub target: TargetId,
    pub width: i32,
    pub height: i32,
}

/// Arena entry pairing a widget with tree metadata.
pub struct Node {
    pub widget: WidgetKind,
    pub parent: Option<NodeId>,
    pub children: SmallVec<[NodeId; 8]>,
    /// Parent-local bounds.
    pub bounds: Rect,
    /// Absolute position of the top-left corner, derived from ancestors.
    pub abs: Point,
    /// Draw order among siblings; higher draws later (on top). Ties keep
    /// insertion order.
    pub z_order: f32,
    /// Composite-time opacity in [0, 1]. Applied when the node's cached
    /// image is blended into its ancestor or the screen, never baked into
    /// the image itself.
    pub alpha: f32,
    /// Composite-time RGBA tint, applied alongside `alpha`.
    pub tint: [f32; 4],
    pub visible: bool,
    pub enabled: bool,
    pub focusable: bool,
    /// Cache regeneration is gated on this; see `ComponentTree::mark_redraw`.
    pub redraw: bool,
    pub initialized: bool,
    pub cache: Option<CacheEntry>,
}

impl Node {
    /// Bounds in absolute coordinates.
    pub fn absolute_bounds(&self) -> Rect {
        Rect::new(self.abs.x, self.abs.y, self.bounds.width, self.bounds.height)
    }
}

/// The retained component tree.
pub struct ComponentTree {
    arena: SlotMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self {
            arena: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    /// Create a detached node. It draws and receives nothing until attached
    /// under a parent or as a root.
    pub fn new_node(&mut self, widget: WidgetKind) -> NodeId {
        let focusable = widget.default_focusable();
        self.arena.insert(Node {
            widget,
            parent: None,
            children: SmallVec::new(),
            bounds: Rect::default(),
            abs: Point::new(0, 0),
            z_order: 0.0,
            alpha: 1.0,
            tint: [1.0; 4],
            visible: true,
            enabled: true,
            focusable,
            redraw: true,
            initialized: false,
            cache: None,
        })
    }

    /// Create a node and attach it as a top-level root.
    pub fn insert_root(&mut self, widget: WidgetKind) -> NodeId {
        let id = self.new_node(widget);
        self.roots.push(id);
        id
    }

    /// Create a node and attach it under `parent`. Fails if the parent
    /// restricts child kinds (menus) and rejects this one.
    pub fn insert(&mut self, parent: NodeId, widget: WidgetKind) -> Result<NodeId, GuiError> {
        let id = self.new_node(widget);
        match self.attach(parent, id) {
            Ok(()) => Ok(id),
            Err(e) => {
                self.arena.remove(id);
                Err(e)
            }
        }
    }

    /// Attach an existing detached node under `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), GuiError> {
        if parent == child {
            return Err(GuiError::InvalidArgument("node cannot parent itself"));
        }
        if self.is_ancestor(child, parent) {
            return Err(GuiError::InvalidArgument("attach would create a cycle"));
        }
        {
            let Some(child_node) = self.arena.get(child) else {
                return Err(GuiError::InvalidArgument("unknown child node"));
            };
            if child_node.parent.is_some() || self.roots.contains(&child) {
                return Err(GuiError::InvalidArgument("child is already attached"));
            }
            let Some(parent_node) = self.arena.get(parent) else {
                return Err(GuiError::InvalidArgument("unknown parent node"));
            };
            if !parent_node.widget.accepts_child(&child_node.widget) {
                return Err(GuiError::InvalidArgument("child kind not accepted here"));
            }
        }
        if let Some(parent_node) = self.arena.get_mut(parent) {
            parent_node.children.push(child);
        }
        if let Some(child_node) = self.arena.get_mut(child) {
            child_node.parent = Some(parent);
        }
        self.recompute_abs(child);
        self.mark_redraw(child);
        Ok(())
    }

    /// Attach an existing detached node as a top-level root (how popups are
    /// shown).
    pub fn attach_root(&mut self, child: NodeId) -> Result<(), GuiError> {
        let Some(node) = self.arena.get(child) else {
            return Err(GuiError::InvalidArgument("unknown node"));
        };
        if node.parent.is_some() || self.roots.contains(&child) {
            return Err(GuiError::InvalidArgument("node is already attached"));
        }
        self.roots.push(child);
        self.recompute_abs(child);
        self.mark_redraw(child);
        Ok(())
    }

    /// Unlink a node from its parent or from the root list without
    /// destroying it. The node keeps its subtree and cache.
    pub fn detach(&mut self, id: NodeId) {
        let parent = self.arena.get(id).and_then(|n| n.parent);
        if let Some(pid) = parent {
            if let Some(parent_node) = self.arena.get_mut(pid) {
                parent_node.children.retain(|c| *c != id);
            }
            self.mark_redraw(pid);
            if let Some(node) = self.arena.get_mut(id) {
                node.parent = None;
            }
        } else {
            self.roots.retain(|r| *r != id);
        }
    }

    /// Remove a node and its entire subtree, releasing every cache target.
    /// Menu buttons own their popup even while it is detached, so popup
    /// subtrees are destroyed along with their button.
    pub fn remove(&mut self, id: NodeId, renderer: &mut dyn Renderer) {
        let mut to_remove = Vec::new();
        self.collect_subtree(id, &mut to_remove);

        self.detach(id);

        for rid in to_remove {
            if let Some(node) = self.arena.remove(rid) {
                if let Some(cache) = node.cache {
                    renderer.destroy_target(cache.target);
                }
                // A shown popup of a removed button is still in `roots`.
                self.roots.retain(|r| *r != rid);
            }
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.arena.get(id) {
            for &child in &node.children {
                self.collect_subtree(child, out);
            }
            if let WidgetKind::MenuButton(button) = &node.widget
                && let Some(popup) = button.popup
            {
                self.collect_subtree(popup, out);
            }
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = self.arena.get(of).and_then(|n| n.parent);
        while let Some(cid) = current {
            if cid == candidate {
                return true;
            }
            current = self.arena.get(cid).and_then(|n| n.parent);
        }
        false
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains_key(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Move a root to the end of the root list so it draws last (on top)
    /// among roots with equal z-order.
    pub fn bring_to_top(&mut self, id: NodeId) {
        if let Some(pos) = self.roots.iter().position(|r| *r == id) {
            let root = self.roots.remove(pos);
            self.roots.push(root);
        }
    }

    // ------------------------------------------------------------------
    // Bounds
    // ------------------------------------------------------------------

    /// Update a node's parent-local bounds. Identical bounds are a no-op
    /// with no dirty marking. A size change invalidates the node's own
    /// cache; a pure move only recomposites the ancestors.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) -> Result<(), GuiError> {
        if bounds.width < 0 || bounds.height < 0 {
            return Err(GuiError::InvalidArgument("negative bounds"));
        }
        let Some(node) = self.arena.get_mut(id) else {
            return Err(GuiError::InvalidArgument("unknown node"));
        };
        if node.bounds == bounds {
            return Ok(());
        }
        let resized = node.bounds.width != bounds.width || node.bounds.height != bounds.height;
        let parent = node.parent;
        node.bounds = bounds;
        self.recompute_abs(id);
        if resized {
            self.mark_redraw(id);
        } else if let Some(pid) = parent {
            self.mark_redraw(pid);
        }
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, x: i32, y: i32) -> Result<(), GuiError> {
        let Some(node) = self.arena.get(id) else {
            return Err(GuiError::InvalidArgument("unknown node"));
        };
        let b = node.bounds;
        self.set_bounds(id, Rect::new(x, y, b.width, b.height))
    }

    pub fn set_size(&mut self, id: NodeId, width: i32, height: i32) -> Result<(), GuiError> {
        let Some(node) = self.arena.get(id) else {
            return Err(GuiError::InvalidArgument("unknown node"));
        };
        let b = node.bounds;
        self.set_bounds(id, Rect::new(b.x, b.y, width, height))
    }

    fn recompute_abs(&mut self, id: NodeId) {
        let parent_abs = self
            .arena
            .get(id)
            .and_then(|n| n.parent)
            .and_then(|pid| self.arena.get(pid))
            .map(|p| p.abs)
            .unwrap_or(Point::new(0, 0));
        self.recompute_abs_from(id, parent_abs);
    }

    fn recompute_abs_from(&mut self, id: NodeId, parent_abs: Point) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        node.abs = Point::new(parent_abs.x + node.bounds.x, parent_abs.y + node.bounds.y);
        let abs = node.abs;
        let children: SmallVec<[NodeId; 8]> = node.children.clone();
        for child in children {
            self.recompute_abs_from(child, abs);
        }
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.arena.get_mut(id)
            && node.visible != visible
        {
            node.visible = visible;
            self.mark_redraw(id);
        }
    }

    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        if let Some(node) = self.arena.get_mut(id)
            && node.enabled != enabled
        {
            node.enabled = enabled;
            self.mark_redraw(id);
        }
    }

    pub fn set_z_order(&mut self, id: NodeId, z: f32) {
        if let Some(node) = self.arena.get_mut(id)
            && node.z_order != z
        {
            node.z_order = z;
            self.mark_redraw(id);
        }
    }

    /// Set composite-time opacity. The node's own cache stays valid, so
    /// only the compositing ancestor is marked.
    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        let parent = match self.arena.get_mut(id) {
            Some(node) if node.alpha != alpha => {
                node.alpha = alpha;
                node.parent
            }
            _ => return,
        };
        if let Some(pid) = parent {
            self.mark_redraw(pid);
        }
    }

    /// Set the composite-time tint, marking the compositing ancestor.
    pub fn set_tint(&mut self, id: NodeId, tint: [f32; 4]) {
        let parent = match self.arena.get_mut(id) {
            Some(node) if node.tint != tint => {
                node.tint = tint;
                node.parent
            }
            _ => return,
        };
        if let Some(pid) = parent {
            self.mark_redraw(pid);
        }
    }

    /// A node is effectively enabled only when every ancestor is too.
    pub fn enabled_resolved(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(node) = self.arena.get(cid) else {
                return false;
            };
            if !node.enabled {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Set the redraw flag on a node and on every caching ancestor whose
    /// image embeds it. Plain containers are passed through without being
    /// flagged (they own no cache to invalidate). Stops early once a
    /// caching ancestor is already flagged, since its ancestors were
    /// flagged along with it.
    pub fn mark_redraw(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        node.redraw = true;
        let mut current = node.parent;
        while let Some(cid) = current {
            let Some(node) = self.arena.get_mut(cid) else {
                break;
            };
            current = node.parent;
            if node.widget.caches() {
                if node.redraw {
                    break;
                }
                node.redraw = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // Draw order and hit testing
    // ------------------------------------------------------------------

    /// Sort ids ascending by z-order, keeping insertion order for ties.
    pub fn draw_order(&self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut sorted: Vec<NodeId> = ids.to_vec();
        sorted.sort_by(|a, b| {
            let za = self.arena.get(*a).map(|n| n.z_order).unwrap_or(0.0);
            let zb = self.arena.get(*b).map(|n| n.z_order).unwrap_or(0.0);
            za.total_cmp(&zb)
        });
        sorted
    }

    /// Find the deepest visible, enabled node containing the absolute
    /// point. Higher z-order wins among overlapping siblings; roots later
    /// in the list win ties.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<NodeId> {
        let roots = self.draw_order(&self.roots);
        for &root in roots.iter().rev() {
            if let Some(hit) = self.hit_test_node(root, x, y) {
                return Some(hit);
            }
        }
        None
    }

    fn hit_test_node(&self, id: NodeId, x: i32, y: i32) -> Option<NodeId> {
        let node = self.arena.get(id)?;
        if !node.visible || !node.enabled {
            return None;
        }
        if !node.absolute_bounds().contains(x, y) {
            return None;
        }
        let children = self.draw_order(&node.children);
        for &child in children.iter().rev() {
            if let Some(hit) = self.hit_test_node(child, x, y) {
                return Some(hit);
            }
        }
        Some(id)
    }

    /// Point-in-rectangle test against a single node's absolute bounds.
    pub fn contains_point(&self, id: NodeId, x: i32, y: i32) -> bool {
        self.arena
            .get(id)
            .is_some_and(|n| n.absolute_bounds().contains(x, y))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// One-time recursive setup for a newly attached subtree.
    pub fn initialize(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if !node.initialized {
            node.initialized = true;
            node.redraw = true;
        }
        let children: SmallVec<[NodeId; 8]> = node.children.clone();
        for child in children {
            self.initialize(child);
        }
    }

    /// Release every cache target in a subtree. Nodes stay in the tree and
    /// regenerate lazily on their next eligible draw.
    pub fn clean_up(&mut self, id: NodeId, renderer: &mut dyn Renderer) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        if let Some(cache) = node.cache.take() {
            renderer.destroy_target(cache.target);
        }
        node.redraw = true;
        let children: SmallVec<[NodeId; 8]> = node.children.clone();
        for child in children {
            self.clean_up(child, renderer);
        }
    }

    /// Drop every cached image in the arena after a device reset. Detached
    /// popups are covered too since they live in the same arena.
    pub fn invalidate_all(&mut self, renderer: &mut dyn Renderer) {
        for (_, node) in self.arena.iter_mut() {
            if let Some(cache) = node.cache.take() {
                renderer.destroy_target(cache.target);
            }
            node.redraw = true;
        }
    }

    /// Ids of every node in the arena, attached or not.
    pub fn ids(&self) -> Vec<NodeId> {
        self.arena.keys().collect()
    }
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingRenderer;
    use crate::skin::SkinSet;
    use crate::theme::WHITE;
    use crate::widgets::{LabelWidget, MenuButtonWidget, PanelWidget, PopUpWidget};

    fn panel() -> WidgetKind {
        WidgetKind::Panel(PanelWidget {
            skin: SkinSet::new(),
        })
    }

    fn label() -> WidgetKind {
        WidgetKind::Label(LabelWidget::new("x", WHITE))
    }

    #[test]
    fn insert_rejects_disallowed_child_kinds() {
        let mut tree = ComponentTree::new();
        let popup = tree.insert_root(WidgetKind::PopUpMenu(PopUpWidget::new(SkinSet::new())));

        assert!(
            tree.insert(popup, WidgetKind::MenuButton(MenuButtonWidget::new("a")))
                .is_ok()
        );
        let err = tree.insert(popup, label()).expect_err("labels rejected");
        assert!(matches!(err, GuiError::InvalidArgument(_)));
        // The rejected node was not leaked into the arena.
        assert_eq!(tree.ids().len(), 2);
    }

    #[test]
    fn attach_rejects_double_attachment_and_cycles() {
        let mut tree = ComponentTree::new();
        let a = tree.insert_root(panel());
        let b = tree.insert(a, panel()).expect("attach");

        assert!(tree.attach(a, b).is_err());
        assert!(tree.attach(b, a).is_err());
        assert!(tree.attach_root(b).is_err());

        tree.detach(b);
        assert!(tree.attach_root(b).is_ok());
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn identical_bounds_are_a_no_op() {
        let mut tree = ComponentTree::new();
        let a = tree.insert_root(panel());
        tree.set_bounds(a, Rect::new(10, 10, 50, 50)).expect("set");

        tree.get_mut(a).expect("node").redraw = false;
        tree.set_bounds(a, Rect::new(10, 10, 50, 50)).expect("set");
        assert!(!tree.get(a).expect("node").redraw);

        assert!(tree.set_bounds(a, Rect::new(0, 0, -1, 5)).is_err());
    }

    #[test]
    fn move_without_resize_keeps_own_cache_valid() {
        let mut tree = ComponentTree::new();
        let parent = tree.insert_root(panel());
        tree.set_bounds(parent, Rect::new(0, 0, 200, 200)).expect("set");
        let child = tree.insert(parent, panel()).expect("insert");
        tree.set_bounds(child, Rect::new(10, 10, 50, 50)).expect("set");

        tree.get_mut(parent).expect("node").redraw = false;
        tree.get_mut(child).expect("node").redraw = false;

        tree.set_bounds(child, Rect::new(30, 10, 50, 50)).expect("set");
        assert!(!tree.get(child).expect("node").redraw);
        assert!(tree.get(parent).expect("node").redraw);

        tree.get_mut(parent).expect("node").redraw = false;
        tree.set_bounds(child, Rect::new(30, 10, 80, 50)).expect("set");
        assert!(tree.get(child).expect("node").redraw);
        assert!(tree.get(parent).expect("node").redraw);
    }

    #[test]
    fn bounds_changes_recompute_subtree_absolutes() {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(panel());
        tree.set_bounds(root, Rect::new(5, 5, 300, 300)).expect("set");
        let mid = tree.insert(root, WidgetKind::Container).expect("insert");
        tree.set_bounds(mid, Rect::new(10, 20, 100, 100)).expect("set");
        let leaf = tree.insert(mid, label()).expect("insert");
        tree.set_bounds(leaf, Rect::new(1, 2, 10, 10)).expect("set");

        assert_eq!(tree.get(leaf).expect("node").abs, Point::new(16, 27));

        tree.set_position(root, 0, 0).expect("move");
        assert_eq!(tree.get(leaf).expect("node").abs, Point::new(11, 22));
    }

    #[test]
    fn redraw_passes_through_plain_containers() {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(panel());
        let container = tree.insert(root, WidgetKind::Container).expect("insert");
        let leaf = tree.insert(container, label()).expect("insert");

        tree.get_mut(root).expect("node").redraw = false;
        tree.get_mut(container).expect("node").redraw = false;
        tree.get_mut(leaf).expect("node").redraw = false;

        tree.mark_redraw(leaf);
        assert!(tree.get(leaf).expect("node").redraw);
        // The container caches nothing, so it is not flagged...
        assert!(!tree.get(container).expect("node").redraw);
        // ...but the caching ancestor above it is.
        assert!(tree.get(root).expect("node").redraw);
    }

    #[test]
    fn hit_test_prefers_higher_z_then_deeper_nodes() {
        let mut tree = ComponentTree::new();
        let root = tree.insert_root(panel());
        tree.set_bounds(root, Rect::new(0, 0, 100, 100)).expect("set");

        let low = tree.insert(root, panel()).expect("insert");
        tree.set_bounds(low, Rect::new(0, 0, 60, 60)).expect("set");
        let high = tree.insert(root, panel()).expect("insert");
        tree.set_bounds(high, Rect::new(0, 0, 60, 60)).expect("set");
        tree.set_z_order(high, 1.0);
        tree.set_z_order(low, 2.0);

        assert_eq!(tree.hit_test(30, 30), Some(low));
        assert_eq!(tree.hit_test(90, 90), Some(root));
        assert_eq!(tree.hit_test(200, 200), None);

        tree.set_visible(low, false);
        assert_eq!(tree.hit_test(30, 30), Some(high));
        tree.set_enabled(high, false);
        assert_eq!(tree.hit_test(30, 30), Some(root));
    }

    #[test]
    fn remove_destroys_detached_popups_and_their_targets() {
        let mut tree = ComponentTree::new();
        let mut renderer = RecordingRenderer::new();

        let bar = tree.insert_root(WidgetKind::MenuBar(crate::widgets::MenuBarWidget {
            skin: SkinSet::new(),
        }));
        let popup = tree.new_node(WidgetKind::PopUpMenu(PopUpWidget::new(SkinSet::new())));
        let mut button = MenuButtonWidget::new("File");
        button.popup = Some(popup);
        let button_id = tree
            .insert(bar, WidgetKind::MenuButton(button))
            .expect("insert");

        let target = renderer.create_target(32, 32).expect("target");
        tree.get_mut(popup).expect("node").cache = Some(CacheEntry {
            target,
            width: 32,
            height: 32,
        });

        tree.remove(button_id, &mut renderer);
        assert!(!tree.contains(button_id));
        assert!(!tree.contains(popup));
        assert_eq!(renderer.live_targets(), 0);
        assert!(tree.contains(bar));
    }
}
