use glam::DVec2;

use super::{ElementState, Label};
use crate::map::config::MarkerAnchor;
use crate::style::{Attr, AttrValue, Attribute, StyleAttributes, StyleSet};
use crate::surface::{ElementKey, NodeId, NodeKind, Surface, TextAlign};

/// Gap between a marker's edge and its label, in pixels.
const LABEL_GAP: f64 = 5.0;

/// A point of interest drawn in container pixels: a circle of radius `r`,
/// or an image when its merged style names one.
#[derive(Debug, Clone)]
pub struct Marker {
    id: String,
    name: Option<String>,
    anchor: MarkerAnchor,
    /// Position on the topology canvas.
    canvas: DVec2,
    /// Position in container pixels under the current transform.
    screen: DVec2,
    node: NodeId,
    is_image: bool,
    shape: ElementState,
    label: Option<Label>,
}

impl Marker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new<S: Surface + ?Sized>(
        surface: &mut S,
        layer: NodeId,
        id: &str,
        name: Option<String>,
        anchor: MarkerAnchor,
        canvas: DVec2,
        screen: DVec2,
        styles: StyleSet,
    ) -> Self {
        let shape = ElementState::new(styles);
        let merged = shape.merged();
        let (node, is_image) = draw(surface, layer, id, screen, &merged);
        Self {
            id: id.to_string(),
            name,
            anchor,
            canvas,
            screen,
            node,
            is_image,
            shape,
            label: None,
        }
    }

    pub(crate) fn add_label<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        layer: NodeId,
        text: &str,
        styles: StyleSet,
        offset: DVec2,
    ) {
        self.label = Some(Label::new(surface, layer, text, styles, offset, TextAlign::Start));
        self.reposition_label(surface);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn anchor(&self) -> MarkerAnchor {
        self.anchor
    }

    pub fn canvas(&self) -> DVec2 {
        self.canvas
    }

    pub fn screen(&self) -> DVec2 {
        self.screen
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_image(&self) -> bool {
        self.is_image
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

    pub fn style(&self) -> StyleAttributes {
        self.shape.merged()
    }

    /// Whether a container pixel falls on the circle or the loaded image.
    pub fn contains<S: Surface + ?Sized>(&self, surface: &S, p: DVec2) -> bool {
        if self.is_image {
            let Some(size) = surface.image_size(self.node) else {
                return false;
            };
            let offset = self.shape.merged().image.map(|i| i.offset()).unwrap_or_default();
            let corner = self.screen - size.as_vec() / 2.0 + offset;
            let rel = p - corner;
            rel.x >= 0.0 && rel.y >= 0.0 && rel.x <= size.width && rel.y <= size.height
        } else {
            let r = self.shape.merged().r.unwrap_or(0.0);
            p.distance(self.screen) <= r
        }
    }

    pub(crate) fn set_hovered<S: Surface + ?Sized>(&mut self, surface: &mut S, hovered: bool) -> bool {
        if !self.shape.set_hovered(hovered) {
            return false;
        }
        self.restyle(surface);
        true
    }

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

    /// Push the merged style to the surface, swapping between circle and
    /// image in place when the image attribute appeared or went away.
    pub(crate) fn restyle<S: Surface + ?Sized>(&mut self, surface: &mut S) {
        let merged = self.shape.merged();
        if merged.image.is_some() != self.is_image {
            self.is_image = merged.image.is_some();
            let kind = if self.is_image {
                NodeKind::Image { anchor: self.screen, size: None }
            } else {
                NodeKind::Circle { center: self.screen }
            };
            surface.replace_kind(self.node, kind, &merged);
        } else {
            surface.set_style(self.node, &merged);
        }
        if let Some(label) = &mut self.label {
            label.set_flags(surface, self.shape.is_hovered(), self.shape.is_selected());
        }
        self.reposition_label(surface);
    }

    pub(crate) fn move_to<S: Surface + ?Sized>(&mut self, surface: &mut S, screen: DVec2) {
        self.screen = screen;
        surface.set_position(self.node, screen);
        self.reposition_label(surface);
    }

    /// Labels sit right of the marker's edge.
    pub(crate) fn reposition_label<S: Surface + ?Sized>(&self, surface: &mut S) {
        let Some(label) = &self.label else {
            return;
        };
        let extent = if self.is_image {
            surface.image_size(self.node).map_or(0.0, |s| s.width / 2.0)
        } else {
            self.shape.merged().r.unwrap_or(0.0)
        };
        let at = self.screen + label.offset() + DVec2::new(LABEL_GAP + extent, 0.0);
        label.move_to(surface, at);
    }

    pub(crate) fn remove<S: Surface + ?Sized>(&self, surface: &mut S) {
        surface.remove(self.node);
        if let Some(label) = &self.label {
            surface.remove(label.node());
        }
    }
}

fn draw<S: Surface + ?Sized>(
    surface: &mut S,
    layer: NodeId,
    id: &str,
    at: DVec2,
    style: &StyleAttributes,
) -> (NodeId, bool) {
    let key = ElementKey::Marker(id.to_string());
    if style.image.is_some() {
        (surface.add_image(layer, Some(&key), at, style), true)
    } else {
        (surface.add_circle(layer, Some(&key), at, style), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ImageRef;
    use crate::surface::{ImageSize, NodeKind, SvgSurface};

    fn marker(surface: &mut SvgSurface, layer: NodeId) -> Marker {
        Marker::new(
            surface,
            layer,
            "0",
            Some("Null Island".into()),
            MarkerAnchor::Plane(DVec2::ZERO),
            DVec2::ZERO,
            DVec2::new(50.0, 50.0),
            StyleSet::marker_defaults(),
        )
    }

    #[test]
    fn test_circle_hit_uses_radius() {
        let mut surface = SvgSurface::new(100.0, 100.0);
        let layer = surface.add_group(None);
        let m = marker(&mut surface, layer);
        assert!(m.contains(&surface, DVec2::new(54.0, 50.0)));
        assert!(!m.contains(&surface, DVec2::new(56.0, 50.0)));
    }

    #[test]
    fn test_image_switch_rebuilds_node() {
        let mut surface = SvgSurface::new(100.0, 100.0);
        let layer = surface.add_group(None);
        let labels = surface.add_group(None);
        let mut m = marker(&mut surface, layer);
        let after = surface.add_circle(layer, None, DVec2::ONE, &StyleAttributes::default());
        m.add_label(&mut surface, labels, "Null Island", StyleSet::label_defaults(), DVec2::ZERO);
        let circle = m.node();

        m.set_current(Attribute::Image, Some(Attr::Set(AttrValue::Image(ImageRef::Url("pin.png".into())))));
        m.restyle(&mut surface);
        assert!(m.is_image());
        assert_eq!(m.node(), circle);
        assert!(matches!(surface.tree().get(m.node()).unwrap().kind, NodeKind::Image { .. }));
        assert_eq!(surface.tree().get(layer).unwrap().children, vec![circle, after]);

        surface.image_loaded(m.node(), ImageSize::new(20.0, 10.0));
        m.reposition_label(&mut surface);
        let label = surface.tree().get(m.label().unwrap().node()).unwrap();
        assert!(matches!(label.kind, NodeKind::Text { anchor, .. } if anchor == DVec2::new(65.0, 50.0)));
        assert!(m.contains(&surface, DVec2::new(59.0, 54.0)));

        m.set_current(Attribute::Image, None);
        m.restyle(&mut surface);
        assert!(!m.is_image());
        assert!(matches!(surface.tree().get(circle).unwrap().kind, NodeKind::Circle { center } if center == DVec2::new(50.0, 50.0)));
        assert_eq!(surface.tree().get(layer).unwrap().children, vec![circle, after]);
    }
}
