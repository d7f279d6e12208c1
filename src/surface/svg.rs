use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::pattern::PatternCache;
use super::{Backend, ElementKey, NodeId, NodeKind, NodeTree, Surface, TextAlign};
use crate::error::{MapError, Result};
use crate::style::StyleAttributes;

/// Primary vector backend, serialised to SVG markup.
#[derive(Debug)]
pub struct SvgSurface {
    tree: NodeTree,
}

impl SvgSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { tree: NodeTree::new(width, height) }
    }

    pub fn to_markup(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let size = self.tree.size();

        let mut svg = BytesStart::new("svg");
        svg.push_attribute(("xmlns", "http://www.w3.org/2000/svg"));
        svg.push_attribute(("width", size.x.to_string().as_str()));
        svg.push_attribute(("height", size.y.to_string().as_str()));
        emit(&mut writer, Event::Start(svg))?;

        let mut background = BytesStart::new("rect");
        background.push_attribute(("width", "100%"));
        background.push_attribute(("height", "100%"));
        background.push_attribute(("fill", self.tree.background()));
        emit(&mut writer, Event::Empty(background))?;

        self.write_defs(&mut writer)?;
        for &id in self.tree.top() {
            self.write_node(&mut writer, id)?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("svg")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| MapError::Markup(e.to_string()))
    }

    fn write_defs(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let cache = PatternCache::global().lock();
        let resolved: Vec<_> = self
            .tree
            .patterns()
            .iter()
            .filter_map(|url| cache.get(url).and_then(|p| Some((url, p.id.clone(), p.size?))))
            .collect();
        drop(cache);
        if resolved.is_empty() {
            return Ok(());
        }

        emit(writer, Event::Start(BytesStart::new("defs")))?;
        for (url, id, size) in resolved {
            let (w, h) = (size.width.to_string(), size.height.to_string());
            let mut pattern = BytesStart::new("pattern");
            pattern.push_attribute(("id", id.as_str()));
            pattern.push_attribute(("patternUnits", "userSpaceOnUse"));
            pattern.push_attribute(("width", w.as_str()));
            pattern.push_attribute(("height", h.as_str()));
            emit(writer, Event::Start(pattern))?;

            let mut image = BytesStart::new("image");
            image.push_attribute(("href", url.as_str()));
            image.push_attribute(("width", w.as_str()));
            image.push_attribute(("height", h.as_str()));
            emit(writer, Event::Empty(image))?;

            emit(writer, Event::End(BytesEnd::new("pattern")))?;
        }
        emit(writer, Event::End(BytesEnd::new("defs")))
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
                let mut group = BytesStart::new("g");
                if id == self.tree.root() {
                    let t = self.tree.transform();
                    let transform = format!("scale({}) translate({}, {})", t.scale, t.translate.x, t.translate.y);
                    group.push_attribute(("transform", transform.as_str()));
                }
                emit(writer, Event::Start(group))?;
                for &child in &node.children {
                    self.write_node(writer, child)?;
                }
                emit(writer, Event::End(BytesEnd::new("g")))
            }
            NodeKind::Path { d, .. } => {
                let mut path = BytesStart::new("path");
                path.push_attribute(("d", d.as_str()));
                push_tag(&mut path, node.tag.as_ref());
                push_style(&mut path, &node.style);
                emit(writer, Event::Empty(path))
            }
            NodeKind::Circle { center } => {
                let mut circle = BytesStart::new("circle");
                circle.push_attribute(("cx", center.x.to_string().as_str()));
                circle.push_attribute(("cy", center.y.to_string().as_str()));
                circle.push_attribute(("r", node.style.r.unwrap_or(0.0).to_string().as_str()));
                push_tag(&mut circle, node.tag.as_ref());
                push_style(&mut circle, &node.style);
                emit(writer, Event::Empty(circle))
            }
            NodeKind::Image { .. } => {
                let (Some((corner, size)), Some(source)) = (self.tree.image_box(node), node.style.image.as_ref()) else {
                    return Ok(());
                };
                let mut image = BytesStart::new("image");
                image.push_attribute(("href", source.url()));
                image.push_attribute(("x", corner.x.to_string().as_str()));
                image.push_attribute(("y", corner.y.to_string().as_str()));
                image.push_attribute(("width", size.width.to_string().as_str()));
                image.push_attribute(("height", size.height.to_string().as_str()));
                push_tag(&mut image, node.tag.as_ref());
                push_style(&mut image, &node.style);
                emit(writer, Event::Empty(image))
            }
            NodeKind::Text { anchor, text, align } => {
                let mut label = BytesStart::new("text");
                label.push_attribute(("x", anchor.x.to_string().as_str()));
                label.push_attribute(("y", anchor.y.to_string().as_str()));
                let text_anchor = match align {
                    TextAlign::Start => "start",
                    TextAlign::Middle => "middle",
                };
                label.push_attribute(("text-anchor", text_anchor));
                label.push_attribute(("dominant-baseline", "central"));
                push_tag(&mut label, node.tag.as_ref());
                push_style(&mut label, &node.style);
                emit(writer, Event::Start(label))?;
                emit(writer, Event::Text(BytesText::new(text)))?;
                emit(writer, Event::End(BytesEnd::new("text")))
            }
        }
    }
}

impl Surface for SvgSurface {
    fn backend(&self) -> Backend {
        Backend::Svg
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

fn push_style(element: &mut BytesStart<'_>, style: &StyleAttributes) {
    if let Some(fill) = &style.fill {
        match style.fill_pattern().and_then(|url| PatternCache::global().lock().get(url).cloned()) {
            Some(pattern) => element.push_attribute(("fill", format!("url(#{})", pattern.id).as_str())),
            None => element.push_attribute(("fill", fill.as_str())),
        }
    }
    let numbers = [
        ("fill-opacity", style.fill_opacity),
        ("stroke-width", style.stroke_width),
        ("stroke-opacity", style.stroke_opacity),
        ("opacity", style.opacity),
        ("font-size", style.font_size),
    ];
    for (name, value) in numbers {
        if let Some(v) = value {
            element.push_attribute((name, v.to_string().as_str()));
        }
    }
    let texts = [
        ("stroke", &style.stroke),
        ("cursor", &style.cursor),
        ("font-family", &style.font_family),
        ("font-weight", &style.font_weight),
    ];
    for (name, value) in texts {
        if let Some(v) = value {
            element.push_attribute((name, v.as_str()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{ImageSize, Transform};
    use glam::DVec2;

    fn region_style() -> StyleAttributes {
        StyleAttributes {
            fill: Some("#c8eeff".into()),
            stroke_width: Some(0.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_markup_has_transformed_root_and_tagged_regions() {
        let mut surface = SvgSurface::new(800.0, 600.0);
        let root = surface.root();
        let regions = surface.add_group(Some(root));
        let key = ElementKey::Region("FR".into());
        surface.add_path(regions, Some(&key), "M0,0 L10,0 L10,10 Z", &region_style());
        surface.apply_transform(Transform::new(2.0, DVec2::new(-5.0, 3.0)));

        let markup = surface.to_markup().unwrap();
        assert!(markup.contains(r#"transform="scale(2) translate(-5, 3)""#), "{markup}");
        assert!(markup.contains(r#"data-code="FR""#));
        assert!(markup.contains(r##"fill="#c8eeff""##));
        assert!(markup.contains(r#"stroke-width="0.5""#));
    }

    #[test]
    fn test_hidden_nodes_and_pending_images_are_not_written() {
        let mut surface = SvgSurface::new(100.0, 100.0);
        let markers = surface.add_group(None);
        let style = StyleAttributes {
            image: Some(crate::style::ImageRef::Url("pin.png".into())),
            ..Default::default()
        };
        let image = surface.add_image(markers, None, DVec2::new(50.0, 50.0), &style);
        assert!(!surface.to_markup().unwrap().contains("<image"));

        surface.image_loaded(image, ImageSize::new(10.0, 10.0));
        assert!(surface.to_markup().unwrap().contains(r#"x="45""#));

        surface.set_visible(markers, false);
        assert!(!surface.to_markup().unwrap().contains("<image"));
    }

    #[test]
    fn test_pattern_fill_writes_defs_once_resolved() {
        let mut surface = SvgSurface::new(100.0, 100.0);
        let root = surface.root();
        let style = StyleAttributes { fill: Some("svg-test-hatch.png".into()), ..Default::default() };
        surface.add_path(root, None, "M0,0 L1,0 L1,1 Z", &style);
        surface.add_path(root, None, "M2,2 L3,2 L3,3 Z", &style);
        assert_eq!(surface.take_image_requests().len(), 1);
        assert!(!surface.to_markup().unwrap().contains("<pattern"));

        PatternCache::global().lock().resolve("svg-test-hatch.png", ImageSize::new(6.0, 6.0));
        let markup = surface.to_markup().unwrap();
        assert_eq!(markup.matches("<pattern").count(), 1);
        assert!(markup.contains(r#"fill="url(#image"#));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut surface = SvgSurface::new(100.0, 100.0);
        let labels = surface.add_group(None);
        surface.add_text(labels, None, DVec2::ZERO, "A & B", TextAlign::Middle, &StyleAttributes::default());
        assert!(surface.to_markup().unwrap().contains("A &amp; B"));
    }
}
