//! Status bar widget: always-visible top line with the signed-in user,
//! the live feed indicator and the latest notice.

use lab_access_client::dashboard::LiveStatus;
use lab_access_client::notice::NoticeLevel;
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::{App, Tab};

/// Render the status bar.
pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();

    // App title
    spans.push(Span::styled(
        " SISTEM AKSES LAB ",
        Style::default()
            .fg(Color::White)
            .bg(Color::Blue)
            .add_modifier(Modifier::BOLD),
    ));

    spans.push(Span::raw(" "));

    if app.session.is_loading {
        spans.push(Span::styled(
            "Memverifikasi akses...",
            Style::default().fg(Color::Yellow),
        ));
    } else if let Some(user) = &app.session.user {
        spans.push(Span::styled(
            user.username.as_str(),
            Style::default().fg(Color::Cyan),
        ));
        spans.push(Span::styled(
            format!(" ({})", user.role),
            Style::default().fg(Color::DarkGray),
        ));

        if app.active_tab == Tab::Dashboard {
            spans.push(Span::raw(" │ "));
            let (dot, label, color) = live_indicator(app.dashboard.live);
            spans.push(Span::styled(format!("{dot} {label}"), Style::default().fg(color)));
        }

        // Uptime
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format_duration(app.uptime()),
            Style::default().fg(Color::DarkGray),
        ));
    } else {
        spans.push(Span::styled("Belum login", Style::default().fg(Color::DarkGray)));
    }

    if let Some((notice, _)) = &app.toast {
        let color = match notice.level {
            NoticeLevel::Success => Color::Green,
            NoticeLevel::Error => Color::Red,
            NoticeLevel::Loading | NoticeLevel::Dismiss => Color::Yellow,
        };
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(notice.message.as_str(), Style::default().fg(color)));
    }

    let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(bar, area);
}

fn live_indicator(status: LiveStatus) -> (&'static str, String, Color) {
    match status {
        LiveStatus::Live => ("●", "Live".to_string(), Color::Green),
        LiveStatus::Connecting => ("○", "Connecting".to_string(), Color::Yellow),
        LiveStatus::Reconnecting { attempt } => {
            ("○", format!("Reconnecting #{attempt}"), Color::Yellow)
        }
        LiveStatus::Offline => ("○", "Offline".to_string(), Color::DarkGray),
    }
}

/// Format a duration into `HH:MM:SS` or `MM:SS`.
fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
