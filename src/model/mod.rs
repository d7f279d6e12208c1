//! Regions and markers: a shape on the surface, an optional label and the
//! hover/selection state their styles are merged from.

mod marker;
mod region;

pub use marker::Marker;
pub use region::Region;

use glam::DVec2;

use crate::style::{merge_style, Attr, AttrValue, Attribute, Style, StyleAttributes, StyleSet};
use crate::surface::{NodeId, Surface, TextAlign};

/// Styles of one drawable plus the flags selecting among them. The merged
/// style is derived on demand and only stored on the surface node.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    styles: StyleSet,
    current: Style,
    hovered: bool,
    selected: bool,
}

impl ElementState {
    pub fn new(styles: StyleSet) -> Self {
        Self { styles, current: Style::default(), hovered: false, selected: false }
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn merged(&self) -> StyleAttributes {
        merge_style(&self.styles, &self.current, self.hovered, self.selected)
    }

    /// Returns whether the flag changed.
    pub fn set_hovered(&mut self, hovered: bool) -> bool {
        std::mem::replace(&mut self.hovered, hovered) != hovered
    }

    /// Returns whether the flag changed.
    pub fn set_selected(&mut self, selected: bool) -> bool {
        std::mem::replace(&mut self.selected, selected) != selected
    }

    pub fn current(&self, attr: Attribute) -> Option<Attr<AttrValue>> {
        self.current.get(attr)
    }

    pub fn set_current(&mut self, attr: Attribute, value: Option<Attr<AttrValue>>) {
        self.current.set(attr, value);
    }
}

/// Text drawn in container pixels next to its element.
#[derive(Debug, Clone)]
pub struct Label {
    node: NodeId,
    state: ElementState,
    offset: DVec2,
}

impl Label {
    pub(crate) fn new<S: Surface + ?Sized>(
        surface: &mut S,
        layer: NodeId,
        text: &str,
        styles: StyleSet,
        offset: DVec2,
        align: TextAlign,
    ) -> Self {
        let state = ElementState::new(styles);
        let node = surface.add_text(layer, None, DVec2::ZERO, text, align, &state.merged());
        Self { node, state, offset }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn offset(&self) -> DVec2 {
        self.offset
    }

    pub(crate) fn set_flags<S: Surface + ?Sized>(&mut self, surface: &mut S, hovered: bool, selected: bool) {
        let changed = self.state.set_hovered(hovered) | self.state.set_selected(selected);
        if changed {
            surface.set_style(self.node, &self.state.merged());
        }
    }

    pub(crate) fn move_to<S: Surface + ?Sized>(&self, surface: &mut S, at: DVec2) {
        surface.set_position(self.node, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_idempotent() {
        let mut state = ElementState::new(StyleSet::region_defaults());
        assert!(state.set_selected(true));
        assert!(!state.set_selected(true));
        assert!(state.set_hovered(true));
        assert_eq!(state.merged().fill.as_deref(), Some("yellow"));
        assert!(state.set_selected(false));
        assert_eq!(state.merged().fill_opacity, Some(0.8));
    }

    #[test]
    fn test_current_sits_below_hover() {
        let mut state = ElementState::new(StyleSet::region_defaults());
        state.set_current(Attribute::FillOpacity, Some(Attr::Set(0.5.into())));
        assert_eq!(state.merged().fill_opacity, Some(0.5));
        state.set_hovered(true);
        assert_eq!(state.merged().fill_opacity, Some(0.8));
    }
}
