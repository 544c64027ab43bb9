//! Terminal preview of the tour overlay.
//!
//! Projects a rendered step (highlights, callout bubble, arrow) and an optional hint pointer from
//! screen points onto a character grid. Rendering goes through an in-memory `TestBackend`, so the
//! preview works in CI and never touches the real terminal.

use anyhow::Result;
use log::info;
use ratatui::backend::TestBackend;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::time::Duration;

use crate::geometry::{self, Viewport};
use crate::models::step::ArrowDirection;
use crate::tour::builder::{BUBBLE_ESTIMATED_HEIGHT, BUBBLE_IMAGE_HEIGHT};
use crate::tour::hint::HintView;
use crate::tour::session::RenderedStep;

pub const PREVIEW_COLS: u16 = 48;
pub const PREVIEW_ROWS: u16 = 42;

/// Point-to-cell scaling for one frame.
struct Projection {
    area: Rect,
    cols_per_pt: f64,
    rows_per_pt: f64,
}

impl Projection {
    fn new(viewport: Viewport, area: Rect) -> Self {
        Self {
            area,
            cols_per_pt: area.width as f64 / viewport.width.max(1.0),
            rows_per_pt: area.height as f64 / viewport.height.max(1.0),
        }
    }

    fn col(&self, x: f64) -> u16 {
        let c = (x * self.cols_per_pt).round().max(0.0) as u16;
        self.area.x + c.min(self.area.width.saturating_sub(1))
    }

    fn row(&self, y: f64) -> u16 {
        let r = (y * self.rows_per_pt).round().max(0.0) as u16;
        self.area.y + r.min(self.area.height.saturating_sub(1))
    }

    fn rect(&self, top: f64, left: f64, width: f64, height: f64) -> Rect {
        let x = self.col(left);
        let y = self.row(top);
        let w = ((width * self.cols_per_pt).round() as u16).max(1);
        let h = ((height * self.rows_per_pt).round() as u16).max(1);
        Rect::new(x, y, w, h).intersection(self.area)
    }

    fn highlight(&self, r: &geometry::Rect) -> Rect {
        self.rect(r.top, r.left, r.width, r.height)
    }
}

fn draw_highlight(f: &mut Frame<'_>, area: Rect, rounded: bool) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(if rounded {
            BorderType::Rounded
        } else {
            BorderType::Plain
        })
        .border_style(Style::default().fg(Color::Yellow));
    f.render_widget(block, area);
}

fn draw_glyph(f: &mut Frame<'_>, x: u16, y: u16, direction: ArrowDirection) {
    let glyph = match direction {
        ArrowDirection::Up => "▲",
        ArrowDirection::Down => "▼",
    };
    let cell = Rect::new(x, y, 1, 1).intersection(f.size());
    if cell.area() > 0 {
        f.render_widget(
            Paragraph::new(Span::styled(glyph, Style::default().fg(Color::Cyan))),
            cell,
        );
    }
}

/// Draw the overlay for `shown` (and `hint`, if any) into `area`.
pub fn draw_overlay(
    f: &mut Frame<'_>,
    area: Rect,
    viewport: Viewport,
    shown: Option<&RenderedStep>,
    hint: Option<&HintView>,
    elapsed: Duration,
) {
    let title = match shown {
        Some(r) => format!(" {} ({}/{}) ", r.screen, r.index + 1, r.total),
        None => " tour idle ".to_string(),
    };
    let frame = Block::default().borders(Borders::ALL).title(title);
    let inner = frame.inner(area);
    f.render_widget(frame, area);
    let proj = Projection::new(viewport, inner);

    if let Some(rendered) = shown {
        let step = &rendered.step;
        for r in step.target_area.iter().chain(step.extra_highlights.iter()) {
            draw_highlight(f, proj.highlight(r), r.corner_radius > 0.0);
        }

        let bubble_height = BUBBLE_ESTIMATED_HEIGHT
            + if step.images.is_some() {
                BUBBLE_IMAGE_HEIGHT
            } else {
                0.0
            };
        let bubble = proj.rect(
            step.bubble.top,
            step.bubble.left,
            step.bubble.max_width,
            bubble_height,
        );

        let mut lines = vec![
            Line::from(Span::styled(
                step.title.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(step.body.clone()),
        ];
        if let Some(frame) = step.images.as_ref().and_then(|i| i.frame_at(elapsed)) {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!("[{}]", frame),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::from(Span::styled(
            "[ Skip ]  [ Next ]",
            Style::default().add_modifier(Modifier::REVERSED),
        )));

        f.render_widget(Clear, bubble);
        f.render_widget(
            Paragraph::new(Text::from(lines))
                .block(Block::default().borders(Borders::ALL))
                .wrap(Wrap { trim: true }),
            bubble,
        );

        if let Some(arrow) = step.arrow {
            let x = proj.col(step.bubble.left + arrow.offset);
            let y = match arrow.direction {
                ArrowDirection::Up => bubble.y,
                ArrowDirection::Down => bubble.bottom().saturating_sub(1),
            };
            draw_glyph(f, x, y, arrow.direction);
        }
    }

    if let Some(hint) = hint {
        draw_highlight(f, proj.highlight(&hint.control), true);
        draw_glyph(f, proj.col(hint.tip_x), proj.row(hint.tip_y), hint.direction);
    }
}

/// Render one frame off-screen and return it as text, one line per row.
pub fn render_frame(
    viewport: Viewport,
    shown: Option<&RenderedStep>,
    hint: Option<&HintView>,
    elapsed: Duration,
) -> Result<String> {
    let backend = TestBackend::new(PREVIEW_COLS, PREVIEW_ROWS);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw_overlay(f, f.size(), viewport, shown, hint, elapsed))?;

    let buffer = terminal.backend().buffer();
    let mut out = String::new();
    for y in 0..buffer.area.height {
        let row: String = (0..buffer.area.width)
            .map(|x| buffer.get(x, y).symbol())
            .collect();
        out.push_str(row.trim_end());
        out.push('\n');
    }
    info!(
        "[PHASE: tui] [STEP: preview] Rendered overlay frame (step={})",
        shown.map(|r| r.step.key).unwrap_or("none")
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ScreenHost;
    use crate::measure::TargetMeasurer;
    use crate::models::screen::Screen;
    use crate::sim::{english_translations, SimulatedScreen};
    use crate::tour::builder::StepBuilder;
    use crate::tour::hint::HintArrow;
    use crate::tour::screens::steps_for;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn first_home_step() -> RenderedStep {
        let home = SimulatedScreen::home();
        let builder = StepBuilder::new(
            TargetMeasurer::new(Duration::from_millis(300), 0.0, 3),
            Arc::new(english_translations()),
            Duration::from_millis(500),
        );
        let steps = builder
            .build(&home, &steps_for(Screen::Home), &CancellationToken::new())
            .await
            .expect("not cancelled");
        RenderedStep {
            screen: Screen::Home,
            index: 0,
            total: steps.len(),
            step: steps[0].clone(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn preview_shows_bubble_text_and_arrow() {
        let shown = first_home_step().await;

        let text = render_frame(
            SimulatedScreen::home().viewport(),
            Some(&shown),
            None,
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(text.lines().count(), PREVIEW_ROWS as usize);
        assert!(text.contains("home (1/5)"));
        assert!(text.contains("Your day at a glance"));
        assert!(text.contains('▲'));
        assert!(!text.contains('▼'));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_frame_can_carry_a_hint() {
        let home = SimulatedScreen::home();
        let mut hint = HintArrow::new(TargetMeasurer::new(Duration::from_millis(300), 0.0, 3));
        assert!(
            hint.activate(&home, Screen::Scanner, &CancellationToken::new())
                .await
        );
        let view = hint.view(Duration::ZERO).expect("visible");

        let text = render_frame(home.viewport(), None, Some(&view), Duration::ZERO).unwrap();

        assert!(text.contains("tour idle"));
        assert!(text.contains('▼'));
    }

    #[test]
    fn projection_clamps_to_the_frame() {
        let proj = Projection::new(Viewport::new(390.0, 844.0), Rect::new(1, 1, 46, 40));
        let r = proj.rect(800.0, 300.0, 200.0, 200.0);
        assert!(r.right() <= 47 && r.bottom() <= 41);
        assert_eq!(proj.col(-10.0), 1);
    }
}
