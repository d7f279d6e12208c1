use glam::DVec2;

use super::pattern::PatternCache;
use super::{Backend, Node, NodeId, NodeKind, NodeTree, Surface, TextAlign};
use crate::braille::geometry::{clear_line, draw_circle, draw_line, draw_rect, fill_polygon};
use crate::braille::BrailleCanvas;
use crate::color::Rgb;

const FALLBACK: Rgb = Rgb::new(255, 255, 255);
const HATCH: Rgb = Rgb::new(160, 160, 160);

/// A label to be drawn over the braille canvas, in character cells.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub col: u16,
    pub row: u16,
    pub text: String,
    pub color: Option<Rgb>,
}

/// One painted frame.
#[derive(Debug, Clone)]
pub struct BrailleFrame {
    pub canvas: BrailleCanvas,
    pub labels: Vec<TextOverlay>,
}

/// Terminal backend: the tree is rasterised onto a braille canvas where one
/// container pixel is one braille dot.
#[derive(Debug)]
pub struct BrailleSurface {
    tree: NodeTree,
}

impl BrailleSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { tree: NodeTree::new(width, height) }
    }

    /// Surface covering `cols` x `rows` character cells.
    pub fn with_cells(cols: u16, rows: u16) -> Self {
        Self::new(cols as f64 * 2.0, rows as f64 * 4.0)
    }

    pub fn render(&self) -> BrailleFrame {
        let size = self.tree.size();
        let mut frame = BrailleFrame {
            canvas: BrailleCanvas::new((size.x / 2.0).ceil() as usize, (size.y / 4.0).ceil() as usize),
            labels: Vec::new(),
        };
        for &id in self.tree.top() {
            self.paint(&mut frame, id);
        }
        frame
    }

    fn paint(&self, frame: &mut BrailleFrame, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };
        if !node.visible {
            return;
        }

        match &node.kind {
            NodeKind::Group => {
                for &child in &node.children {
                    self.paint(frame, child);
                }
            }
            NodeKind::Path { rings, .. } => self.paint_path(frame, node, rings),
            NodeKind::Circle { center } => {
                let scale = if node.transformed { self.tree.transform().scale } else { 1.0 };
                let c = self.tree.to_screen(node, *center);
                let r = (node.style.r.unwrap_or(0.0) * scale).round() as i32;
                draw_circle(&mut frame.canvas, c.x.round() as i32, c.y.round() as i32, r.max(0), fill_color(node));
            }
            NodeKind::Image { .. } => {
                let Some((corner, size)) = self.tree.image_box(node) else {
                    return;
                };
                let a = self.tree.to_screen(node, corner);
                let b = self.tree.to_screen(node, corner + size.as_vec());
                let color = node.style.stroke.as_deref().and_then(Rgb::parse).unwrap_or(FALLBACK);
                draw_rect(&mut frame.canvas, a.x as i32, a.y as i32, b.x as i32, b.y as i32, color);
            }
            NodeKind::Text { anchor, text, align } => {
                let at = self.tree.to_screen(node, *anchor);
                let width = text.chars().count() as f64;
                let col = match align {
                    TextAlign::Start => at.x / 2.0,
                    TextAlign::Middle => at.x / 2.0 - width / 2.0,
                };
                let row = at.y / 4.0;
                if col < 0.0 || row < 0.0 {
                    return;
                }
                frame.labels.push(TextOverlay {
                    col: col as u16,
                    row: row as u16,
                    text: text.clone(),
                    color: node.style.fill.as_deref().and_then(Rgb::parse),
                });
            }
        }
    }

    fn paint_path(&self, frame: &mut BrailleFrame, node: &Node, rings: &[Vec<DVec2>]) {
        let screen: Vec<Vec<DVec2>> = rings
            .iter()
            .map(|ring| ring.iter().map(|&p| self.tree.to_screen(node, p)).collect())
            .collect();

        let style = &node.style;
        let filled = match (style.fill.as_deref(), style.fill_pattern()) {
            (_, Some(url)) => {
                let loaded = PatternCache::global().lock().get(url).is_some_and(|p| p.size.is_some());
                if loaded {
                    fill_polygon(&mut frame.canvas, &screen, HATCH, true);
                }
                loaded
            }
            (None | Some("none"), None) => false,
            (Some(color), None) => {
                fill_polygon(&mut frame.canvas, &screen, Rgb::parse(color).unwrap_or(FALLBACK), false);
                true
            }
        };

        let stroke = style
            .stroke
            .as_deref()
            .filter(|s| *s != "none" && style.stroke_width.unwrap_or(1.0) > 0.0)
            .map(|s| Rgb::parse(s).unwrap_or(FALLBACK));
        for ring in &screen {
            for edge in ring.windows(2) {
                let (a, b) = (edge[0], edge[1]);
                let (x0, y0, x1, y1) = (a.x as i32, a.y as i32, b.x as i32, b.y as i32);
                match stroke {
                    Some(color) => draw_line(&mut frame.canvas, x0, y0, x1, y1, color),
                    None if filled => clear_line(&mut frame.canvas, x0, y0, x1, y1),
                    None => draw_line(&mut frame.canvas, x0, y0, x1, y1, FALLBACK),
                }
            }
        }
    }
}

fn fill_color(node: &Node) -> Rgb {
    node.style.fill.as_deref().and_then(Rgb::parse).unwrap_or(FALLBACK)
}

impl Surface for BrailleSurface {
    fn backend(&self) -> Backend {
        Backend::Braille
    }

    fn tree(&self) -> &NodeTree {
        &self.tree
    }

    fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StyleAttributes;
    use crate::surface::{ElementKey, Transform};

    #[test]
    fn test_region_fill_follows_root_transform() {
        let mut surface = BrailleSurface::with_cells(4, 2);
        let root = surface.root();
        let style = StyleAttributes { fill: Some("#ff0000".into()), ..Default::default() };
        surface.add_path(root, Some(&ElementKey::Region("A".into())), "M0,0 L1,0 L1,1 L0,1 Z", &style);
        surface.apply_transform(Transform::new(4.0, DVec2::ZERO));

        let frame = surface.render();
        assert!(frame.canvas.is_set(1, 1));
        assert!(!frame.canvas.is_set(6, 6));
        assert_eq!(frame.canvas.cell_color(0, 0), Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_labels_become_overlays() {
        let mut surface = BrailleSurface::with_cells(20, 5);
        let labels = surface.add_group(None);
        let style = StyleAttributes { fill: Some("black".into()), ..Default::default() };
        surface.add_text(labels, None, DVec2::new(20.0, 8.0), "Peru", TextAlign::Middle, &style);
        let frame = surface.render();
        assert_eq!(
            frame.labels,
            vec![TextOverlay { col: 8, row: 2, text: "Peru".into(), color: Some(Rgb::new(0, 0, 0)) }]
        );
    }

    #[test]
    fn test_marker_circle_in_screen_space() {
        let mut surface = BrailleSurface::with_cells(10, 5);
        let markers = surface.add_group(None);
        surface.apply_transform(Transform::new(3.0, DVec2::new(5.0, 5.0)));
        let style = StyleAttributes { fill: Some("blue".into()), r: Some(2.0), ..Default::default() };
        surface.add_circle(markers, None, DVec2::new(10.0, 10.0), &style);
        let frame = surface.render();
        assert!(frame.canvas.is_set(10, 10));
        assert!(frame.canvas.is_set(12, 10));
        assert!(!frame.canvas.is_set(13, 10));
    }
}
