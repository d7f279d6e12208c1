use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use super::pattern::PatternCache;
use super::{Backend, ElementKey, Node, NodeId, NodeKind, NodeTree, Surface, TextAlign};
use crate::error::{MapError, Result};
use crate::path;
use crate::style::StyleAttributes;

/// Legacy backend, serialised to VML markup.
///
/// Path data is rewritten with [`path::to_vml`]; shapes use a 100x
/// coordinate space so that rounding keeps two decimals of precision.
#[derive(Debug)]
pub struct VmlSurface {
    tree: NodeTree,
}

impl VmlSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { tree: NodeTree::new(width, height) }
    }

    pub fn to_markup(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let size = self.tree.size();

        let mut container = BytesStart::new("div");
        container.push_attribute(("xmlns:v", "urn:schemas-microsoft-com:vml"));
        let css = format!(
            "position:relative;overflow:hidden;width:{}px;height:{}px;background-color:{}",
            size.x,
            size.y,
            self.tree.background()
        );
        container.push_attribute(("style", css.as_str()));
        emit(&mut writer, Event::Start(container))?;
        for &id in self.tree.top() {
            self.write_node(&mut writer, id)?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("div")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| MapError::Markup(e.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let Some(node) = self.tree.get(id) else {
            return Ok(());
        };
        if !node.visible {
            return Ok(());
        }

        match &node.kind {
            NodeKind::Group => {
                let size = self.tree.size();
                let mut group = BytesStart::new("v:group");
                let css = format!("position:absolute;left:0;top:0;width:{}px;height:{}px", size.x, size.y);
                group.push_attribute(("style", css.as_str()));
                // Coordinate origin and extent express the root transform.
                let (origin, extent) = if id == self.tree.root() {
                    let t = self.tree.transform();
                    (-t.translate, size / t.scale)
                } else {
                    (glam::DVec2::ZERO, size)
                };
                group.push_attribute(("coordorigin", format!("{},{}", origin.x, origin.y).as_str()));
                group.push_attribute(("coordsize", format!("{},{}", extent.x, extent.y).as_str()));
                emit(writer, Event::Start(group))?;
                for &child in &node.children {
                    self.write_node(writer, child)?;
                }
                emit(writer, Event::End(BytesEnd::new("v:group")))
            }
            NodeKind::Path { d, .. } => {
                let mut shape = BytesStart::new("v:shape");
                shape.push_attribute(("coordsize", "100,100"));
                shape.push_attribute(("path", path::to_vml(d).as_str()));
                let css = String::from("position:absolute;left:0;top:0;width:1px;height:1px");
                self.write_shape(writer, shape, css, node, "v:shape")
            }
            NodeKind::Circle { center } => {
                let r = node.style.r.unwrap_or(0.0);
                let oval = BytesStart::new("v:oval");
                let css = format!(
                    "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px",
                    center.x - r,
                    center.y - r,
                    r * 2.0,
                    r * 2.0
                );
                self.write_shape(writer, oval, css, node, "v:oval")
            }
            NodeKind::Image { .. } => {
                let (Some((corner, size)), Some(source)) = (self.tree.image_box(node), node.style.image.as_ref()) else {
                    return Ok(());
                };
                let mut image = BytesStart::new("v:image");
                image.push_attribute(("src", source.url()));
                let css = format!(
                    "position:absolute;left:{}px;top:{}px;width:{}px;height:{}px",
                    corner.x, corner.y, size.width, size.height
                );
                image.push_attribute(("style", css.as_str()));
                push_tag(&mut image, node.tag.as_ref());
                emit(writer, Event::Empty(image))
            }
            NodeKind::Text { anchor, text, align } => {
                let mut shape = BytesStart::new("v:shape");
                let css = format!("position:absolute;left:{}px;top:{}px;width:1px;height:1px", anchor.x, anchor.y);
                shape.push_attribute(("style", css.as_str()));
                shape.push_attribute(("coordsize", "100,100"));
                shape.push_attribute(("stroked", "false"));
                push_tag(&mut shape, node.tag.as_ref());
                if let Some(fill) = &node.style.fill {
                    shape.push_attribute(("fillcolor", fill.as_str()));
                }
                emit(writer, Event::Start(shape))?;

                let mut baseline = BytesStart::new("v:path");
                baseline.push_attribute(("textpathok", "true"));
                baseline.push_attribute(("v", "m0,0 l100,0 e"));
                emit(writer, Event::Empty(baseline))?;

                let mut textpath = BytesStart::new("v:textpath");
                textpath.push_attribute(("on", "true"));
                textpath.push_attribute(("string", text.as_str()));
                let align = match align {
                    TextAlign::Start => "left",
                    TextAlign::Middle => "center",
                };
                let mut css = format!("v-text-align:{align}");
                if let Some(family) = &node.style.font_family {
                    css.push_str(&format!(";font-family:{family}"));
                }
                if let Some(size) = node.style.font_size {
                    css.push_str(&format!(";font-size:{size}px"));
                }
                if let Some(weight) = &node.style.font_weight {
                    css.push_str(&format!(";font-weight:{weight}"));
                }
                textpath.push_attribute(("style", css.as_str()));
                emit(writer, Event::Empty(textpath))?;

                emit(writer, Event::End(BytesEnd::new("v:shape")))
            }
        }
    }

    /// Write a filled/stroked shape with its `v:fill` and `v:stroke` children.
    fn write_shape(
        &self,
        writer: &mut Writer<Vec<u8>>,
        mut shape: BytesStart<'_>,
        mut css: String,
        node: &Node,
        name: &str,
    ) -> Result<()> {
        let style = &node.style;
        push_tag(&mut shape, node.tag.as_ref());
        if let Some(cursor) = &style.cursor {
            css.push_str(&format!(";cursor:{cursor}"));
        }
        shape.push_attribute(("style", css.as_str()));

        let pattern = style.fill_pattern().map(str::to_string);
        match style.fill.as_deref() {
            None | Some("none") => shape.push_attribute(("filled", "false")),
            Some(_) if pattern.is_some() => shape.push_attribute(("filled", "true")),
            Some(color) => {
                shape.push_attribute(("filled", "true"));
                shape.push_attribute(("fillcolor", color));
            }
        }
        match style.stroke.as_deref() {
            None | Some("none") => shape.push_attribute(("stroked", "false")),
            Some(color) => {
                shape.push_attribute(("stroked", "true"));
                shape.push_attribute(("strokecolor", color));
            }
        }
        if let Some(width) = style.stroke_width {
            shape.push_attribute(("strokeweight", format!("{width}px").as_str()));
        }
        emit(writer, Event::Start(shape))?;

        let opacity = style.opacity.unwrap_or(1.0);
        let mut fill = BytesStart::new("v:fill");
        fill.push_attribute(("opacity", (style.fill_opacity.unwrap_or(1.0) * opacity).to_string().as_str()));
        if let Some(url) = &pattern {
            // Only tile once the image has loaded.
            if PatternCache::global().lock().get(url).is_some_and(|p| p.size.is_some()) {
                fill.push_attribute(("type", "tile"));
                fill.push_attribute(("src", url.as_str()));
            }
        }
        emit(writer, Event::Empty(fill))?;

        let mut stroke = BytesStart::new("v:stroke");
        stroke.push_attribute(("opacity", (style.stroke_opacity.unwrap_or(1.0) * opacity).to_string().as_str()));
        emit(writer, Event::Empty(stroke))?;

        emit(writer, Event::End(BytesEnd::new(name)))
    }
}

impl Surface for VmlSurface {
    fn backend(&self) -> Backend {
        Backend::Vml
    }

    fn tree(&self) -> &NodeTree {
        &self.tree
    }

    fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| MapError::Markup(e.to_string()))
}

fn push_tag(element: &mut BytesStart<'_>, tag: Option<&ElementKey>) {
    match tag {
        Some(ElementKey::Region(code)) => element.push_attribute(("data-code", code.as_str())),
        Some(ElementKey::Marker(index)) => element.push_attribute(("data-index", index.as_str())),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{ImageSize, Transform};
    use glam::DVec2;

    #[test]
    fn test_paths_are_converted() {
        let mut surface = VmlSurface::new(200.0, 100.0);
        let root = surface.root();
        let style = StyleAttributes { fill: Some("#ffffff".into()), ..Default::default() };
        surface.add_path(root, Some(&ElementKey::Region("US".into())), "M1,2 L3,4 Z", &style);
        let markup = surface.to_markup().unwrap();
        assert!(markup.contains(r#"path="m100,200l300,400xe""#), "{markup}");
        assert!(markup.contains(r##"fillcolor="#ffffff""##));
        assert!(markup.contains(r#"stroked="false""#));
    }

    #[test]
    fn test_root_transform_becomes_coordinate_space() {
        let mut surface = VmlSurface::new(200.0, 100.0);
        surface.apply_transform(Transform::new(2.0, DVec2::new(-10.0, 5.0)));
        let markup = surface.to_markup().unwrap();
        assert!(markup.contains(r#"coordorigin="10,-5""#), "{markup}");
        assert!(markup.contains(r#"coordsize="100,50""#));
    }

    #[test]
    fn test_pattern_fill_tiles_once_loaded() {
        let mut surface = VmlSurface::new(100.0, 100.0);
        let root = surface.root();
        let style = StyleAttributes { fill: Some("vml-test-tile.gif".into()), ..Default::default() };
        surface.add_path(root, None, "M0,0 L1,0 L1,1 Z", &style);
        assert!(!surface.to_markup().unwrap().contains(r#"type="tile""#));
        PatternCache::global().lock().resolve("vml-test-tile.gif", ImageSize::new(4.0, 4.0));
        let markup = surface.to_markup().unwrap();
        assert!(markup.contains(r#"type="tile""#));
        assert!(!markup.contains("fillcolor"));
    }
}
