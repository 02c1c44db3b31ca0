//! Dashboard tab: stat cards and the access chart.

use lab_access_client::dashboard::{DashboardPhase, LiveStatus};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph};

use crate::app::App;

/// Render the dashboard tab content.
pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.dashboard;
    if state.phase != DashboardPhase::Live {
        let loading = Paragraph::new("  Memuat data dashboard...")
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().title(" Dashboard ").borders(Borders::ALL));
        frame.render_widget(loading, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(8)])
        .split(area);

    draw_stats(frame, app, chunks[0]);
    draw_chart(frame, app, chunks[1]);
}

fn draw_stats(frame: &mut Frame, app: &App, area: Rect) {
    let stats = &app.dashboard.stats;
    let cards = [
        ("Total Lab", stats.total_rooms, Color::Cyan),
        ("Aktif Sekarang", stats.active_now, Color::Green),
        ("Total Kelas", stats.total_classes, Color::Magenta),
        ("Total Akses", stats.total_access_events, Color::Yellow),
    ];

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    for ((title, value, color), column) in cards.into_iter().zip(columns.iter()) {
        let card = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(
                format!(" {value}"),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )),
        ])
        .block(Block::default().title(format!(" {title} ")).borders(Borders::ALL));
        frame.render_widget(card, *column);
    }
}

fn draw_chart(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.dashboard;
    let live = match state.live {
        LiveStatus::Live => Span::styled(" ● live ", Style::default().fg(Color::Green)),
        _ => Span::styled(" ○ offline ", Style::default().fg(Color::DarkGray)),
    };
    let block = Block::default()
        .title(Line::from(vec![
            Span::styled(
                format!(" Grafik Akses ({}) ", state.mode.label()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            live,
        ]))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if state.chart.is_empty() {
        let msg = Paragraph::new("  Belum ada data akses.").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, inner);
        return;
    }

    let bars: Vec<Bar<'_>> = state
        .chart
        .iter()
        .map(|point| {
            Bar::default()
                .value(u64::try_from(point.value).unwrap_or(0))
                .label(Line::from(point.name.as_str()))
                .style(Style::default().fg(Color::Cyan))
                .value_style(Style::default().fg(Color::Black).bg(Color::Cyan))
        })
        .collect();

    let chart = BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width(inner.width, bars.len()))
        .bar_gap(1);
    frame.render_widget(chart, inner);
}

/// Widest bar that still fits every point, between 1 and 9 columns.
fn bar_width(width: u16, points: usize) -> u16 {
    let points = u16::try_from(points.max(1)).unwrap_or(u16::MAX);
    (width / points).saturating_sub(1).clamp(1, 9)
}
