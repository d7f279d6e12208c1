//! Rendering surfaces: the drawing capability maps are built on.
//!
//! Every backend keeps the same retained [`NodeTree`] and implements
//! [`Surface`]; they differ only in how the tree is painted. Nothing outside
//! this module looks at [`Surface::backend`] to decide what to draw.

mod braille;
mod pattern;
mod svg;
mod tree;
mod vml;

pub use braille::{BrailleFrame, BrailleSurface, TextOverlay};
pub use pattern::{Pattern, PatternCache};
pub use svg::SvgSurface;
pub use tree::{Node, NodeKind, NodeTree};
pub use vml::VmlSurface;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use glam::DVec2;

use crate::style::StyleAttributes;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Svg,
    Vml,
    Braille,
}

/// Identity attached to the shape of a region or marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementKey {
    Region(String),
    Marker(String),
}

/// Uniform scale and translation of the root group. A point `p` in map
/// units lands at `scale * (p + translate)` in container pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub translate: DVec2,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { scale: 1.0, translate: DVec2::ZERO };

    pub fn new(scale: f64, translate: DVec2) -> Self {
        Self { scale, translate }
    }

    #[inline(always)]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        (p + self.translate) * self.scale
    }

    #[inline(always)]
    pub fn invert(&self, screen: DVec2) -> DVec2 {
        screen / self.scale - self.translate
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn as_vec(self) -> DVec2 {
        DVec2::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Start,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    /// An image node waiting to be anchored.
    Node(NodeId),
    /// A pattern fill in the shared [`PatternCache`].
    Pattern,
}

/// An image whose natural size must be known before it can be painted.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub url: String,
    pub target: ImageTarget,
}

/// Resolves an image URL to its natural size.
pub trait ImageLoader {
    fn natural_size(&self, url: &str) -> LocalBoxFuture<'static, anyhow::Result<ImageSize>>;
}

/// Reports every image at one fixed size, immediately.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeLoader(pub ImageSize);

impl Default for FixedSizeLoader {
    fn default() -> Self {
        Self(ImageSize::new(23.0, 23.0))
    }
}

impl ImageLoader for FixedSizeLoader {
    fn natural_size(&self, _url: &str) -> LocalBoxFuture<'static, anyhow::Result<ImageSize>> {
        future::ready(Ok(self.0)).boxed_local()
    }
}

/// Drawing capability. Groups nest; the group returned by [`Surface::root`]
/// carries the map transform, top-level groups (`parent = None`) are drawn
/// in container pixels.
pub trait Surface {
    fn backend(&self) -> Backend;

    fn tree(&self) -> &NodeTree;

    fn tree_mut(&mut self) -> &mut NodeTree;

    fn size(&self) -> DVec2 {
        self.tree().size()
    }

    fn set_size(&mut self, width: f64, height: f64) {
        self.tree_mut().set_size(width, height);
    }

    fn set_background(&mut self, color: &str) {
        self.tree_mut().set_background(color);
    }

    fn root(&self) -> NodeId {
        self.tree().root()
    }

    fn add_group(&mut self, parent: Option<NodeId>) -> NodeId {
        self.tree_mut().add(parent, NodeKind::Group, None, &StyleAttributes::default())
    }

    fn add_path(&mut self, parent: NodeId, tag: Option<&ElementKey>, d: &str, style: &StyleAttributes) -> NodeId {
        self.tree_mut().add(Some(parent), NodeTree::path_kind(d), tag, style)
    }

    /// Circle of radius `style.r` around `center`.
    fn add_circle(&mut self, parent: NodeId, tag: Option<&ElementKey>, center: DVec2, style: &StyleAttributes) -> NodeId {
        self.tree_mut().add(Some(parent), NodeKind::Circle { center }, tag, style)
    }

    /// Image named by `style.image`, centred on `anchor` once its size is known.
    fn add_image(&mut self, parent: NodeId, tag: Option<&ElementKey>, anchor: DVec2, style: &StyleAttributes) -> NodeId {
        self.tree_mut().add(Some(parent), NodeKind::Image { anchor, size: None }, tag, style)
    }

    fn add_text(
        &mut self,
        parent: NodeId,
        tag: Option<&ElementKey>,
        anchor: DVec2,
        text: &str,
        align: TextAlign,
        style: &StyleAttributes,
    ) -> NodeId {
        let kind = NodeKind::Text { anchor, text: text.to_string(), align };
        self.tree_mut().add(Some(parent), kind, tag, style)
    }

    fn set_style(&mut self, node: NodeId, style: &StyleAttributes) {
        self.tree_mut().set_style(node, style);
    }

    /// Rebuild a node as another shape in place.
    fn replace_kind(&mut self, node: NodeId, kind: NodeKind, style: &StyleAttributes) {
        self.tree_mut().replace_kind(node, kind, style);
    }

    fn set_position(&mut self, node: NodeId, at: DVec2) {
        self.tree_mut().set_position(node, at);
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        self.tree_mut().set_text(node, text);
    }

    fn set_visible(&mut self, node: NodeId, visible: bool) {
        self.tree_mut().set_visible(node, visible);
    }

    fn remove(&mut self, node: NodeId) {
        self.tree_mut().remove(node);
    }

    fn clear_group(&mut self, group: NodeId) {
        self.tree_mut().clear_children(group);
    }

    /// Set the transform of the root group, affecting all its descendants.
    fn apply_transform(&mut self, transform: Transform) {
        self.tree_mut().set_transform(transform);
    }

    fn take_image_requests(&mut self) -> Vec<ImageRequest> {
        self.tree_mut().take_requests()
    }

    fn image_loaded(&mut self, node: NodeId, size: ImageSize) {
        self.tree_mut().image_loaded(node, size);
    }

    fn image_size(&self, node: NodeId) -> Option<ImageSize> {
        self.tree().image_size(node)
    }
}
