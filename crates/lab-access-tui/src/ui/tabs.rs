//! Tab bar: one title per protected view, each with a small state badge
//! (live feed on Dashboard, active filters on Aktivitas, list sizes on
//! Kartu and Lab, unread errors on Log).

use lab_access_client::dashboard::LiveStatus;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Tabs};

use crate::app::{App, Tab};
use crate::event::LogLevel;

/// The view state the badges are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TabBadges {
    live: LiveStatus,
    filtering: bool,
    cards: Option<usize>,
    rooms: Option<usize>,
    errors: usize,
}

impl TabBadges {
    fn from_app(app: &App) -> Self {
        Self {
            live: app.dashboard.live,
            filtering: !app.activity.filter.criteria().is_empty(),
            cards: (!app.cards.loading).then_some(app.cards.items.len()),
            rooms: (!app.rooms.loading).then_some(app.rooms.items.len()),
            errors: app
                .log_entries
                .iter()
                .filter(|e| e.level == LogLevel::Error)
                .count(),
        }
    }

    fn badge(&self, tab: Tab) -> Option<(String, Color)> {
        match tab {
            Tab::Dashboard => Some(match self.live {
                LiveStatus::Live => ("●".into(), Color::Green),
                LiveStatus::Connecting | LiveStatus::Reconnecting { .. } => {
                    ("●".into(), Color::Yellow)
                }
                LiveStatus::Offline => ("○".into(), Color::DarkGray),
            }),
            Tab::Activity => self.filtering.then(|| ("filter".into(), Color::Magenta)),
            Tab::Cards => self.cards.map(|n| (n.to_string(), Color::DarkGray)),
            Tab::Rooms => self.rooms.map(|n| (n.to_string(), Color::DarkGray)),
            Tab::Log => (self.errors > 0).then(|| (format!("{}!", self.errors), Color::Red)),
            Tab::Profile => None,
        }
    }
}

/// Render the tab bar.
pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let badges = TabBadges::from_app(app);

    let titles: Vec<Line<'_>> = Tab::all()
        .iter()
        .enumerate()
        .map(|(i, &tab)| {
            let mut spans = vec![
                Span::styled(
                    format!("{} ", i + 1),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(tab.label()),
            ];
            if let Some((text, color)) = badges.badge(tab) {
                spans.push(Span::raw(" "));
                spans.push(Span::styled(text, Style::default().fg(color)));
            }
            Line::from(spans)
        })
        .collect();

    let selected = Tab::all()
        .iter()
        .position(|&t| t == app.active_tab)
        .unwrap_or(0);

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::BOTTOM))
        .select(selected)
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )
        .divider(Span::styled(" ┊ ", Style::default().fg(Color::DarkGray)));

    frame.render_widget(tabs, area);
}
