use glam::DVec2;

use super::{ElementState, Label};
use crate::path::{self, BBox};
use crate::style::{Attr, AttrValue, Attribute, StyleSet};
use crate::surface::{ElementKey, NodeId, NodeKind, Surface, TextAlign, Transform};
use crate::topology::RegionShape;

/// A named territory: its outline on the transformed layer and an optional
/// label kept in container pixels.
#[derive(Debug, Clone)]
pub struct Region {
    code: String,
    name: String,
    node: NodeId,
    /// Outline in canvas units.
    rings: Vec<Vec<DVec2>>,
    bbox: BBox,
    shape: ElementState,
    label: Option<Label>,
}

impl Region {
    pub(crate) fn new<S: Surface + ?Sized>(
        surface: &mut S,
        layer: NodeId,
        code: &str,
        shape: &RegionShape,
        styles: StyleSet,
    ) -> Self {
        let state = ElementState::new(styles);
        let node = surface.add_path(layer, Some(&ElementKey::Region(code.to_string())), &shape.path, &state.merged());
        let rings = match surface.tree().get(node).map(|n| &n.kind) {
            Some(NodeKind::Path { rings, .. }) => rings.clone(),
            _ => Vec::new(),
        };
        let bbox = path::bbox(&rings).unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0));
        Self {
            code: code.to_string(),
            name: shape.name.clone(),
            node,
            rings,
            bbox,
            shape: state,
            label: None,
        }
    }

    /// Attach a label centred on the bounding box, shifted by `offset`
    /// canvas units.
    pub(crate) fn add_label<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        layer: NodeId,
        text: &str,
        styles: StyleSet,
        offset: DVec2,
        transform: Transform,
    ) {
        let label = Label::new(surface, layer, text, styles, offset, TextAlign::Middle);
        label.move_to(surface, transform.apply(self.bbox.center() + offset));
        self.label = Some(label);
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    pub fn is_hovered(&self) -> bool {
        self.shape.is_hovered()
    }

    pub fn is_selected(&self) -> bool {
        self.shape.is_selected()
    }

    /// Even-odd test of a canvas point against the outline.
    pub fn contains(&self, p: DVec2) -> bool {
        self.bbox.contains(p) && path::contains(&self.rings, p)
    }

    /// Returns whether the state changed.
    pub(crate) fn set_hovered<S: Surface + ?Sized>(&mut self, surface: &mut S, hovered: bool) -> bool {
        if !self.shape.set_hovered(hovered) {
            return false;
        }
        self.restyle(surface);
        true
    }

    /// Returns whether the state changed.
    pub(crate) fn set_selected<S: Surface + ?Sized>(&mut self, surface: &mut S, selected: bool) -> bool {
        if !self.shape.set_selected(selected) {
            return false;
        }
        self.restyle(surface);
        true
    }

    pub(crate) fn current(&self, attr: Attribute) -> Option<Attr<AttrValue>> {
        self.shape.current(attr)
    }

    pub(crate) fn set_current(&mut self, attr: Attribute, value: Option<Attr<AttrValue>>) {
        self.shape.set_current(attr, value);
    }

    pub(crate) fn restyle<S: Surface + ?Sized>(&mut self, surface: &mut S) {
        surface.set_style(self.node, &self.shape.merged());
        if let Some(label) = &mut self.label {
            label.set_flags(surface, self.shape.is_hovered(), self.shape.is_selected());
        }
    }

    pub(crate) fn reposition_label<S: Surface + ?Sized>(&self, surface: &mut S, transform: Transform) {
        if let Some(label) = &self.label {
            label.move_to(surface, transform.apply(self.bbox.center() + label.offset()));
        }
    }
}
