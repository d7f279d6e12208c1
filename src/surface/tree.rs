//! Retained node tree shared by every backend. Backends differ only in how
//! they paint or serialise it.

use glam::DVec2;

use super::pattern::PatternCache;
use super::{ElementKey, ImageRequest, ImageSize, ImageTarget, NodeId, TextAlign, Transform};
use crate::path;
use crate::style::StyleAttributes;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Path {
        d: String,
        /// Flattened outline, in the node's own coordinates.
        rings: Vec<Vec<DVec2>>,
    },
    Circle {
        center: DVec2,
    },
    Image {
        anchor: DVec2,
        /// Natural size; the image is not painted until it is known.
        size: Option<ImageSize>,
    },
    Text {
        anchor: DVec2,
        text: String,
        align: TextAlign,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub tag: Option<ElementKey>,
    pub style: StyleAttributes,
    pub visible: bool,
    /// Lives under the root group and follows its transform.
    pub transformed: bool,
}

#[derive(Debug)]
pub struct NodeTree {
    nodes: Vec<Option<Node>>,
    /// Vacated slots, reused by [`NodeTree::add`].
    free: Vec<NodeId>,
    top: Vec<NodeId>,
    root: NodeId,
    transform: Transform,
    size: DVec2,
    background: String,
    requests: Vec<ImageRequest>,
    /// Pattern URLs referenced by fills, in first-use order.
    patterns: Vec<String>,
}

impl NodeTree {
    pub fn new(width: f64, height: f64) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            top: Vec::new(),
            root: 0,
            transform: Transform::IDENTITY,
            size: DVec2::new(width, height),
            background: String::from("#505050"),
            requests: Vec::new(),
            patterns: Vec::new(),
        };
        tree.root = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        if let Some(root) = tree.nodes[tree.root].as_mut() {
            root.transformed = true;
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn size(&self) -> DVec2 {
        self.size
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.size = DVec2::new(width, height);
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    pub fn set_background(&mut self, color: &str) {
        self.background = color.to_string();
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Top-level nodes in paint order.
    pub fn top(&self) -> &[NodeId] {
        &self.top
    }

    /// Arena size, live or vacated.
    pub fn slots(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Append a node under `parent`, or at top level when `parent` is `None`.
    pub fn add(&mut self, parent: Option<NodeId>, kind: NodeKind, tag: Option<&ElementKey>, style: &StyleAttributes) -> NodeId {
        let transformed = parent.and_then(|p| self.get(p)).is_some_and(|p| p.transformed);
        let node = Node {
            kind,
            parent,
            children: Vec::new(),
            tag: tag.cloned(),
            style: StyleAttributes::default(),
            visible: true,
            transformed,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        match parent.and_then(|p| self.nodes.get_mut(p)).and_then(Option::as_mut) {
            Some(p) => p.children.push(id),
            None => self.top.push(id),
        }
        self.set_style(id, style);
        id
    }

    /// Replace a node's merged style, registering pattern fills and image
    /// loads the new style needs.
    pub fn set_style(&mut self, id: NodeId, style: &StyleAttributes) {
        if let Some(url) = style.fill_pattern() {
            let (_, fresh) = PatternCache::global().lock().intern(url);
            if fresh {
                self.requests.push(ImageRequest { url: url.to_string(), target: ImageTarget::Pattern });
            }
            if !self.patterns.iter().any(|p| p == url) {
                self.patterns.push(url.to_string());
            }
        }

        let Some(node) = self.nodes.get_mut(id).and_then(Option::as_mut) else {
            return;
        };
        if let NodeKind::Image { size, .. } = &mut node.kind {
            let old = node.style.image.as_ref().map(|i| i.url().to_string());
            let new = style.image.as_ref().map(|i| i.url().to_string());
            if old != new {
                *size = None;
                if let Some(url) = new {
                    self.requests.push(ImageRequest { url, target: ImageTarget::Node(id) });
                }
            }
        }
        node.style = style.clone();
    }

    /// Swap a node's shape for another kind, keeping its id, parent, tag and
    /// paint position.
    pub fn replace_kind(&mut self, id: NodeId, kind: NodeKind, style: &StyleAttributes) {
        let Some(node) = self.nodes.get_mut(id).and_then(Option::as_mut) else {
            return;
        };
        node.kind = kind;
        node.style = StyleAttributes::default();
        self.requests.retain(|r| r.target != ImageTarget::Node(id));
        self.set_style(id, style);
    }

    pub fn set_position(&mut self, id: NodeId, at: DVec2) {
        if let Some(node) = self.nodes.get_mut(id).and_then(Option::as_mut) {
            match &mut node.kind {
                NodeKind::Circle { center } => *center = at,
                NodeKind::Image { anchor, .. } | NodeKind::Text { anchor, .. } => *anchor = at,
                NodeKind::Group | NodeKind::Path { .. } => {}
            }
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let Some(Node { kind: NodeKind::Text { text, .. }, .. }) = self.nodes.get_mut(id).and_then(Option::as_mut) {
            *text = value.to_string();
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(id).and_then(Option::as_mut) {
            node.visible = visible;
        }
    }

    /// Remove a node and its subtree.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id).and_then(Option::take) else {
            return;
        };
        match node.parent.and_then(|p| self.nodes.get_mut(p)).and_then(Option::as_mut) {
            Some(parent) => parent.children.retain(|&c| c != id),
            None => self.top.retain(|&c| c != id),
        }
        self.free.push(id);
        self.requests.retain(|r| r.target != ImageTarget::Node(id));
        for child in node.children {
            self.remove_detached(child);
        }
    }

    fn remove_detached(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id).and_then(Option::take) {
            self.free.push(id);
            self.requests.retain(|r| r.target != ImageTarget::Node(id));
            for child in node.children {
                self.remove_detached(child);
            }
        }
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = self.get(id).map(|n| n.children.clone()).unwrap_or_default();
        for child in children {
            self.remove(child);
        }
    }

    pub fn take_requests(&mut self) -> Vec<ImageRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn image_loaded(&mut self, id: NodeId, loaded: ImageSize) {
        if let Some(Node { kind: NodeKind::Image { size, .. }, .. }) = self.nodes.get_mut(id).and_then(Option::as_mut) {
            *size = Some(loaded);
        }
    }

    /// Whether `id` is a live image node currently showing `url`.
    pub fn shows_image(&self, id: NodeId, url: &str) -> bool {
        self.get(id).is_some_and(|n| {
            matches!(n.kind, NodeKind::Image { .. }) && n.style.image.as_ref().is_some_and(|i| i.url() == url)
        })
    }

    pub fn image_size(&self, id: NodeId) -> Option<ImageSize> {
        match self.get(id)?.kind {
            NodeKind::Image { size, .. } => size,
            _ => None,
        }
    }

    /// Top-left corner and size of a loaded image: centred on its anchor,
    /// then shifted by the style offset.
    pub fn image_box(&self, node: &Node) -> Option<(DVec2, ImageSize)> {
        let NodeKind::Image { anchor, size: Some(size) } = node.kind else {
            return None;
        };
        let offset = node.style.image.as_ref().map(|i| i.offset()).unwrap_or_default();
        Some((anchor - size.as_vec() / 2.0 + offset, size))
    }

    /// Map a point in a node's coordinates to container pixels.
    pub fn to_screen(&self, node: &Node, p: DVec2) -> DVec2 {
        if node.transformed {
            self.transform.apply(p)
        } else {
            p
        }
    }

    /// Whether the node and all its ancestors are visible.
    pub fn is_shown(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(n) = cursor.and_then(|c| self.get(c)) {
            if !n.visible {
                return false;
            }
            cursor = n.parent;
        }
        cursor.is_none()
    }

    /// Build a path node's kind from path data.
    pub fn path_kind(d: &str) -> NodeKind {
        NodeKind::Path { d: d.to_string(), rings: path::flatten(d) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ImageRef;

    fn image_style(url: &str) -> StyleAttributes {
        StyleAttributes { image: Some(ImageRef::Url(url.into())), ..Default::default() }
    }

    #[test]
    fn test_root_is_transformed_top_level_is_not() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let inner = tree.add(Some(tree.root()), NodeKind::Group, None, &StyleAttributes::default());
        let outer = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        assert!(tree.get(inner).unwrap().transformed);
        assert!(!tree.get(outer).unwrap().transformed);
        assert_eq!(tree.top(), &[tree.root(), outer]);
    }

    #[test]
    fn test_image_waits_for_size_and_reloads_on_url_change() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let kind = NodeKind::Image { anchor: DVec2::new(50.0, 50.0), size: None };
        let id = tree.add(None, kind, None, &image_style("a.png"));
        let requests = tree.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, ImageTarget::Node(id));
        assert!(tree.image_box(tree.get(id).unwrap()).is_none());

        tree.image_loaded(id, ImageSize::new(10.0, 20.0));
        let (corner, _) = tree.image_box(tree.get(id).unwrap()).unwrap();
        assert_eq!(corner, DVec2::new(45.0, 40.0));

        tree.set_style(id, &image_style("a.png"));
        assert!(tree.take_requests().is_empty());
        tree.set_style(id, &image_style("b.png"));
        assert_eq!(tree.take_requests().len(), 1);
        assert_eq!(tree.image_size(id), None);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let group = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        let child = tree.add(Some(group), NodeKind::Circle { center: DVec2::ZERO }, None, &StyleAttributes::default());
        tree.remove(group);
        assert!(tree.get(group).is_none());
        assert!(tree.get(child).is_none());
        assert_eq!(tree.top(), &[tree.root()]);
    }

    #[test]
    fn test_cleared_slots_are_reused() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let group = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        for _ in 0..1000 {
            tree.clear_children(group);
            for i in 0..10 {
                let center = DVec2::splat(i as f64);
                tree.add(Some(group), NodeKind::Circle { center }, None, &StyleAttributes::default());
            }
        }
        assert_eq!(tree.get(group).unwrap().children.len(), 10);
        assert_eq!(tree.nodes.len(), 12);
    }

    #[test]
    fn test_replace_kind_keeps_id_and_order() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let layer = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        let first = tree.add(Some(layer), NodeKind::Circle { center: DVec2::ZERO }, None, &StyleAttributes::default());
        let second = tree.add(Some(layer), NodeKind::Circle { center: DVec2::ONE }, None, &StyleAttributes::default());

        let kind = NodeKind::Image { anchor: DVec2::ZERO, size: None };
        tree.replace_kind(first, kind, &image_style("pin.png"));
        assert_eq!(tree.get(layer).unwrap().children, vec![first, second]);
        assert!(tree.shows_image(first, "pin.png"));
        assert_eq!(tree.take_requests().len(), 1);

        tree.replace_kind(first, NodeKind::Circle { center: DVec2::ZERO }, &StyleAttributes::default());
        assert!(!tree.shows_image(first, "pin.png"));
        assert_eq!(tree.get(layer).unwrap().children, vec![first, second]);
    }

    #[test]
    fn test_hidden_parent_hides_child() {
        let mut tree = NodeTree::new(100.0, 100.0);
        let group = tree.add(None, NodeKind::Group, None, &StyleAttributes::default());
        let child = tree.add(Some(group), NodeKind::Circle { center: DVec2::ZERO }, None, &StyleAttributes::default());
        assert!(tree.is_shown(child));
        tree.set_visible(group, false);
        assert!(!tree.is_shown(child));
    }

    #[test]
    fn test_pattern_fill_requested_once_per_url() {
        let style = StyleAttributes { fill: Some("tree-hatch-test.png".into()), ..Default::default() };
        let mut a = NodeTree::new(10.0, 10.0);
        let mut b = NodeTree::new(10.0, 10.0);
        a.add(None, NodeTree::path_kind("M0,0 L1,1"), None, &style);
        b.add(None, NodeTree::path_kind("M0,0 L1,1"), None, &style);
        let loads = a.take_requests().len() + b.take_requests().len();
        assert_eq!(loads, 1);
        assert_eq!(a.patterns(), ["tree-hatch-test.png"]);
        assert_eq!(b.patterns(), ["tree-hatch-test.png"]);
    }
}
