use crate::app::App;
use choropleth::color::Rgb;
use choropleth::surface::BrailleFrame;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Split into map area and status bar
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let map = app.maps.current();
    let title = map.name().to_string();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let tip = map.tip();
    let map_widget = MapWidget {
        frame: app.render_map(),
        tip: tip.visible.then(|| {
            // Braille pixels to character cells, just right of the pointer
            let col = (tip.position.x / 2.0) as u16 + 2;
            let row = (tip.position.y / 4.0) as u16;
            (col, row, tip.text.clone())
        }),
        back: app.maps.back_visible(),
        busy: app.maps.is_loading().then(|| app.spinner()),
    };
    frame.render_widget(map_widget, inner);
}

/// Braille map with text labels, the hover tip and drill-down indicators
/// overlaid
struct MapWidget {
    frame: BrailleFrame,
    tip: Option<(u16, u16, String)>,
    back: bool,
    busy: Option<char>,
}

impl MapWidget {
    fn render_canvas(&self, area: Rect, buf: &mut Buffer) {
        for (row_idx, row_str) in self.frame.canvas.rows().enumerate() {
            if row_idx >= area.height as usize {
                break;
            }
            let y = area.y + row_idx as u16;

            for (col_idx, ch) in row_str.chars().enumerate() {
                if col_idx >= area.width as usize {
                    break;
                }
                // Skip empty braille characters (U+2800)
                if ch == '\u{2800}' {
                    continue;
                }
                let x = area.x + col_idx as u16;
                let color = self.frame.canvas.cell_color(col_idx, row_idx).map_or(Color::Cyan, to_color);
                buf[(x, y)].set_char(ch).set_fg(color);
            }
        }
    }

    fn put_text(area: Rect, buf: &mut Buffer, col: u16, row: u16, text: &str, style: Style) {
        if row >= area.height || col >= area.width {
            return;
        }
        let max_len = area.width.saturating_sub(col) as usize;
        for (i, ch) in text.chars().take(max_len).enumerate() {
            buf[(area.x + col + i as u16, area.y + row)].set_char(ch).set_style(style);
        }
    }
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.render_canvas(area, buf);

        for label in &self.frame.labels {
            let color = label.color.map_or(Color::White, to_color);
            Self::put_text(area, buf, label.col, label.row, &label.text, Style::default().fg(color));
        }

        if let Some((col, row, text)) = &self.tip {
            let style = Style::default().fg(Color::Black).bg(Color::White);
            Self::put_text(area, buf, *col, *row, &format!(" {text} "), style);
        }

        if self.back {
            let style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
            Self::put_text(area, buf, 0, 0, "< back", style);
        }

        if let Some(spinner) = self.busy {
            let col = area.width.saturating_sub(12);
            Self::put_text(area, buf, col, 0, &format!("{spinner} loading"), Style::default().fg(Color::Magenta));
        }
    }
}

fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

fn key_help(app: &App) -> String {
    let mut help = String::from(" | hjkl:pan");
    if app.maps.current().config().zoom_buttons {
        help.push_str(" +/-:zoom");
    }
    help.push_str(" r:reset");
    if app.maps.back_visible() {
        help.push_str(" bksp:back");
    }
    help.push_str(" q:quit");
    help
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let selection = if app.last_selection.is_empty() {
        String::from("-")
    } else {
        app.last_selection.join(",")
    };
    let tip = app.maps.current().tip();

    let status = Line::from(vec![
        Span::styled(" Zoom: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" Level: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.maps.level().to_string(), Style::default().fg(Color::Magenta)),
        Span::styled(" Selected: ", Style::default().fg(Color::DarkGray)),
        Span::styled(selection, Style::default().fg(Color::Green)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            if tip.visible { tip.text.clone() } else { String::new() },
            Style::default().fg(Color::White),
        ),
        Span::styled(" ", Style::default()),
        Span::styled(app.pointer_coords().unwrap_or_default(), Style::default().fg(Color::Cyan)),
        Span::styled(key_help(app), Style::default().fg(Color::DarkGray)),
    ]);

    let paragraph = Paragraph::new(status);
    frame.render_widget(paragraph, area);
}
