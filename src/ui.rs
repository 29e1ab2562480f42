use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use readalong::{
    session::{NoticeLevel, PlaybackState},
    sync::{word_state, WordState},
};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
// title, status and notice lines
const CHROME_ROWS: u16 = 3;

/// Width and height left for the document text in a terminal of this size.
pub fn text_area(width: u16, height: u16) -> (usize, usize) {
    let width = width.saturating_sub(HORIZONTAL_MARGIN * 2);
    let height = height.saturating_sub(VERTICAL_MARGIN * 2 + CHROME_ROWS);
    (width.max(1) as usize, height as usize)
}

fn mmss(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let current_style = Style::default()
            .patch(bold_style)
            .add_modifier(Modifier::REVERSED);
        let italic_style = Style::default().add_modifier(Modifier::ITALIC);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Span::styled(self.title.as_str(), bold_style))
            .alignment(Alignment::Center)
            .render(chunks[0], buf);

        let narrator = &self.narrator;
        let session = narrator.session();
        let current = narrator.current_word();

        if session.document().is_none() {
            Paragraph::new(Span::styled("Nothing loaded", italic_style))
                .alignment(Alignment::Center)
                .render(chunks[1], buf);
        } else {
            let lines: Vec<Line> = self
                .layout
                .rows()
                .iter()
                .skip(self.viewport.offset())
                .take(chunks[1].height as usize)
                .map(|row| {
                    let mut spans = Vec::with_capacity(row.len() * 2);
                    for (n, &index) in row.iter().enumerate() {
                        if n > 0 {
                            spans.push(Span::raw(" "));
                        }
                        let style = match word_state(index, current) {
                            WordState::Past => dim_style,
                            WordState::Current => current_style,
                            WordState::Upcoming => Style::default(),
                        };
                        spans.push(Span::styled(self.layout.word(index).unwrap_or_default(), style));
                    }
                    Line::from(spans)
                })
                .collect();
            Paragraph::new(lines).render(chunks[1], buf);
        }

        let speed = session.speed();
        let mut status = format!(
            "{}  word {}/{}  {} / {}  {:.2}x  vol {:.0}%",
            session.state(),
            current.map_or(0, |i| i + 1),
            session.table().len(),
            mmss(session.position_ms()),
            mmss((session.duration_ms() as f64 / speed as f64) as u64),
            speed,
            session.volume() * 100.0,
        );
        if self.silent {
            status.push_str("  silent");
        }
        if narrator.is_stalled() {
            status.push_str("  stalled");
        }
        let status_style = match session.state() {
            PlaybackState::Playing => Style::default().fg(Color::Green),
            PlaybackState::Preparing => Style::default().fg(Color::Yellow),
            _ => dim_style,
        };
        Paragraph::new(Span::styled(status, status_style))
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        let notice = match narrator.notice() {
            Some(notice) => {
                let color = match notice.level {
                    NoticeLevel::Warning => Color::Yellow,
                    NoticeLevel::Error => Color::Red,
                };
                Span::styled(
                    format!("{}: {}  (x)", notice.level, notice.message),
                    Style::default().fg(color),
                )
            }
            None => Span::styled(
                "(space) play/pause  (+/-) speed  ([/]) volume  (r)etry  (c)lear  (q)uit",
                Style::default().patch(dim_style).patch(italic_style),
            ),
        };
        Paragraph::new(notice)
            .alignment(Alignment::Center)
            .render(chunks[3], buf);
    }
}
