//! Render-to-texture caching and layered compositing.
//!
//! Each caching node owns at most one offscreen target sized exactly to its
//! bounds. A frame runs two phases: `refresh` regenerates every cache whose
//! redraw flag is set (children first, so parents composite fresh images),
//! then `present` blends the root caches into the screen.

use log::warn;

use crate::clip::{Point, Rect, clip_draw_call};
use crate::content::Assets;
use crate::render::{BlendMode, Renderer, TextureRef};
use crate::theme::Theme;
use crate::tree::{CacheEntry, ComponentTree, NodeId};

/// Fully transparent clear color for offscreen caches.
const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// Regenerate stale caches across the whole tree, deepest first.
pub fn refresh(
    tree: &mut ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
) {
    let roots: Vec<NodeId> = tree.roots().to_vec();
    for root in roots {
        refresh_subtree(tree, renderer, assets, theme, root);
    }
}

fn refresh_subtree(
    tree: &mut ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
    id: NodeId,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    // Invisible subtrees keep their flags and regenerate on first
    // eligible draw.
    if !node.visible {
        return;
    }
    let caches = node.widget.caches();
    let children: Vec<NodeId> = node.children.to_vec();
    for child in children {
        refresh_subtree(tree, renderer, assets, theme, child);
    }
    if caches {
        refresh_cache(tree, renderer, assets, theme, id);
    }
}

/// The per-node regeneration step. No-op when the cache is still valid.
fn refresh_cache(
    tree: &mut ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
    id: NodeId,
) {
    let (bounds, redraw, cache) = match tree.get(id) {
        Some(node) => (node.bounds, node.redraw, node.cache),
        None => return,
    };
    let (width, height) = (bounds.width, bounds.height);

    if width <= 0 || height <= 0 {
        // Zero-size nodes hold no target and draw nothing. The flag is
        // retained until the node gains extent.
        if let Some(node) = tree.get_mut(id)
            && let Some(entry) = node.cache.take()
        {
            renderer.destroy_target(entry.target);
        }
        return;
    }

    let sized_ok = cache.is_some_and(|c| c.width == width && c.height == height);
    if !redraw && sized_ok {
        return; // cache hit
    }

    // One target per node: a stale-sized target is released before its
    // replacement is allocated.
    if let Some(entry) = cache
        && !sized_ok
        && let Some(node) = tree.get_mut(id)
    {
        node.cache = None;
        renderer.destroy_target(entry.target);
    }

    let entry = match tree.get(id).and_then(|n| n.cache) {
        Some(entry) => entry,
        None => match renderer.create_target(width as u32, height as u32) {
            Ok(target) => {
                let entry = CacheEntry {
                    target,
                    width,
                    height,
                };
                if let Some(node) = tree.get_mut(id) {
                    node.cache = Some(entry);
                }
                // A fresh target may be the retry of an allocation that
                // failed on a prior frame, after the compositing ancestor
                // already regenerated without this image. Re-flag upward;
                // children refresh first, so the ancestor recomposites in
                // this same pass.
                tree.mark_redraw(id);
                entry
            }
            Err(e) => {
                // Recoverable: skip this node for the frame and retry on
                // the next pass (the redraw flag stays set).
                warn!("cache target allocation failed, skipping node this frame: {e}");
                return;
            }
        },
    };

    let local = Rect::new(0, 0, width, height);
    let mut drawn: Vec<NodeId> = Vec::new();

    renderer.begin_pass(Some(entry.target), BlendMode::SeparateAlpha, Some(TRANSPARENT));
    if let Some(node) = tree.get(id) {
        node.widget.draw(renderer, assets, theme, local, local);
    }
    composite_children(tree, renderer, assets, theme, id, Point::new(0, 0), local, &mut drawn);
    renderer.end_pass();
    renderer.resolve_target(entry.target);

    if let Some(node) = tree.get_mut(id) {
        node.redraw = false;
    }
    // Inline-drawn descendants were re-rendered along with this cache.
    for did in drawn {
        if let Some(node) = tree.get_mut(did) {
            node.redraw = false;
        }
    }
}

/// Composite a node's children into the current pass, ascending z-order.
/// Caching children contribute their resolved image; plain children draw
/// their content directly and recurse.
fn composite_children(
    tree: &ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
    id: NodeId,
    origin: Point,
    scissor: Rect,
    drawn: &mut Vec<NodeId>,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    for child in tree.draw_order(&node.children) {
        draw_node_into(tree, renderer, assets, theme, child, origin, scissor, drawn);
    }
}

/// Draw one node into the current pass at `origin` (the node's parent
/// coordinates mapped into target space), trimmed to `scissor`.
fn draw_node_into(
    tree: &ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
    id: NodeId,
    origin: Point,
    scissor: Rect,
    drawn: &mut Vec<NodeId>,
) {
    let Some(node) = tree.get(id) else {
        return;
    };
    if !node.visible {
        return;
    }
    let dest = node.bounds.translated(origin.x, origin.y);

    if node.widget.caches() {
        // The child's children live inside its image already. Opacity and
        // tint apply here, at composite time, never baked into the image.
        let Some(entry) = node.cache else {
            return; // zero-size or allocation failure this frame
        };
        if node.alpha <= 0.0 {
            return;
        }
        let tint = [
            node.tint[0],
            node.tint[1],
            node.tint[2],
            node.tint[3] * node.alpha,
        ];
        let source = Rect::new(0, 0, entry.width, entry.height);
        if let Some(clipped) = clip_draw_call(source, dest, scissor) {
            renderer.draw_quad(TextureRef::Target(entry.target), clipped.source, clipped.dest, tint);
        }
        return;
    }

    node.widget.draw(renderer, assets, theme, dest, scissor);
    drawn.push(id);

    let child_scissor = scissor.intersection(&dest);
    if child_scissor.is_empty() {
        return;
    }
    composite_children(
        tree,
        renderer,
        assets,
        theme,
        id,
        Point::new(dest.x, dest.y),
        child_scissor,
        drawn,
    );
}

/// Blend the root nodes into the screen in draw order. Assumes `refresh`
/// ran this frame; stale roots simply present their previous image.
pub fn present(
    tree: &mut ComponentTree,
    renderer: &mut dyn Renderer,
    assets: &Assets,
    theme: &Theme,
    screen: Rect,
    clear: Option<[f32; 4]>,
) {
    let mut drawn: Vec<NodeId> = Vec::new();
    renderer.begin_pass(None, BlendMode::SourceOver, clear);
    let roots = tree.draw_order(tree.roots());
    for root in roots {
        draw_node_into(
            tree,
            renderer,
            assets,
            theme,
            root,
            Point::new(0, 0),
            screen,
            &mut drawn,
        );
    }
    renderer.end_pass();
    for did in drawn {
        if let Some(node) = tree.get_mut(did) {
            node.redraw = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCall, RecordingRenderer};
    use crate::skin::SkinSet;
    use crate::widgets::{PanelWidget, WidgetKind};

    fn assets(renderer: &mut RecordingRenderer) -> Assets {
        let atlas = renderer.create_texture(256, 256, &[]);
        let font_tex = renderer.create_texture(128, 96, &[]);
        Assets {
            atlas,
            font: crate::render::GlyphFont {
                texture: font_tex,
                cell_width: 8,
                cell_height: 16,
            },
        }
    }

    fn panel(theme: &Theme) -> WidgetKind {
        WidgetKind::Panel(PanelWidget {
            skin: SkinSet::single(theme.panel_skin).expect("region"),
        })
    }

    #[test]
    fn clean_tree_runs_no_offscreen_passes() {
        let mut tree = ComponentTree::new();
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();

        let root = tree.insert_root(panel(&theme));
        tree.set_bounds(root, Rect::new(0, 0, 100, 100)).expect("set");

        refresh(&mut tree, &mut r, &assets, &theme);
        assert_eq!(r.offscreen_passes(), 1);

        r.clear_calls();
        refresh(&mut tree, &mut r, &assets, &theme);
        assert_eq!(r.offscreen_passes(), 0);
        assert_eq!(r.live_targets(), 1);
    }

    #[test]
    fn children_regenerate_before_their_parent_composites() {
        let mut tree = ComponentTree::new();
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();

        let root = tree.insert_root(panel(&theme));
        tree.set_bounds(root, Rect::new(0, 0, 100, 100)).expect("set");
        let child = tree.insert(root, panel(&theme)).expect("insert");
        tree.set_bounds(child, Rect::new(10, 10, 40, 40)).expect("set");

        refresh(&mut tree, &mut r, &assets, &theme);

        // Two offscreen passes, child resolved before the parent's pass
        // begins so the parent composites a fresh image.
        assert_eq!(r.offscreen_passes(), 2);
        let child_target = tree.get(child).expect("node").cache.expect("cache").target;
        let root_target = tree.get(root).expect("node").cache.expect("cache").target;
        let resolve_child = r
            .calls
            .iter()
            .position(|c| *c == DrawCall::Resolve(child_target))
            .expect("child resolve");
        let begin_root = r
            .calls
            .iter()
            .position(|c| matches!(c, DrawCall::BeginPass { target: Some(t), .. } if *t == root_target))
            .expect("root pass");
        assert!(resolve_child < begin_root);

        // The parent pass samples the child's target at its local offset.
        let composite = r
            .calls
            .iter()
            .find_map(|c| match c {
                DrawCall::Quad {
                    texture: TextureRef::Target(t),
                    dest,
                    ..
                } if *t == child_target => Some(*dest),
                _ => None,
            })
            .expect("composited child");
        assert_eq!(composite, Rect::new(10, 10, 40, 40));
    }

    #[test]
    fn offscreen_passes_use_separate_alpha() {
        let mut tree = ComponentTree::new();
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();

        let root = tree.insert_root(panel(&theme));
        tree.set_bounds(root, Rect::new(0, 0, 64, 64)).expect("set");
        refresh(&mut tree, &mut r, &assets, &theme);
        present(&mut tree, &mut r, &assets, &theme, Rect::new(0, 0, 800, 600), None);

        let blends: Vec<(Option<crate::render::TargetId>, BlendMode, bool)> = r
            .calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::BeginPass {
                    target,
                    blend,
                    cleared,
                } => Some((*target, *blend, *cleared)),
                _ => None,
            })
            .collect();
        assert_eq!(blends.len(), 2);
        assert_eq!(blends[0].1, BlendMode::SeparateAlpha);
        assert!(blends[0].2, "cache cleared to transparent before drawing");
        assert_eq!(blends[1].0, None);
        assert_eq!(blends[1].1, BlendMode::SourceOver);
    }

    #[test]
    fn alpha_and_tint_apply_at_composite_time() {
        let mut tree = ComponentTree::new();
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();

        let root = tree.insert_root(panel(&theme));
        tree.set_bounds(root, Rect::new(0, 0, 100, 100)).expect("set");
        let child = tree.insert(root, panel(&theme)).expect("insert");
        tree.set_bounds(child, Rect::new(10, 10, 40, 40)).expect("set");
        refresh(&mut tree, &mut r, &assets, &theme);

        // Fading the child regenerates no cache, only the parent composite.
        r.clear_calls();
        tree.set_alpha(child, 0.5);
        tree.set_tint(child, [1.0, 0.0, 0.0, 1.0]);
        refresh(&mut tree, &mut r, &assets, &theme);
        assert_eq!(r.offscreen_passes(), 1);

        let child_target = tree.get(child).expect("node").cache.expect("cache").target;
        let tint = r
            .calls
            .iter()
            .find_map(|c| match c {
                DrawCall::Quad {
                    texture: TextureRef::Target(t),
                    tint,
                    ..
                } if *t == child_target => Some(*tint),
                _ => None,
            })
            .expect("composited child");
        assert_eq!(tint, [1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn zero_size_nodes_hold_no_target_and_keep_their_flag() {
        let mut tree = ComponentTree::new();
        let mut r = RecordingRenderer::new();
        let assets = assets(&mut r);
        let theme = Theme::default();

        let root = tree.insert_root(panel(&theme));
        refresh(&mut tree, &mut r, &assets, &theme);
        assert_eq!(r.live_targets(), 0);
        assert!(tree.get(root).expect("node").redraw);

        // First eligible draw after gaining extent.
        tree.set_bounds(root, Rect::new(0, 0, 10, 10)).expect("set");
        refresh(&mut tree, &mut r, &assets, &theme);
        assert_eq!(r.live_targets(), 1);
        assert!(!tree.get(root).expect("node").redraw);
    }
}
