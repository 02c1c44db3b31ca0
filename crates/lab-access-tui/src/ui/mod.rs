//! Top-level TUI layout and rendering entry point.
//!
//! Composes the status bar, tab bar, active tab content, and key-help
//! footer into the full-screen layout drawn each frame. The login route
//! replaces the tab bar and content with the login form.

pub mod activity;
pub mod cards;
pub mod dashboard;
pub mod help;
pub mod log;
pub mod login;
pub mod profile;
pub mod rooms;
pub mod status_bar;
pub mod tabs;

use lab_access_client::Route;
use lab_access_client::guard::GuardView;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, Tab};

/// Render the entire TUI frame.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Top-level vertical split:
    //   [1] Status bar (1 line)
    //   [2] Tab bar    (3 lines)
    //   [3] Content    (fill)
    //   [4] Key help   (1 line)
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Length(3), // tab bar
            Constraint::Min(10),   // content area
            Constraint::Length(1), // key help
        ])
        .split(area);

    status_bar::draw(frame, app, chunks[0]);

    if app.route == Route::Login {
        let body = Rect {
            height: chunks[1].height + chunks[2].height,
            ..chunks[1]
        };
        login::draw(frame, app, body);
    } else {
        tabs::draw(frame, app, chunks[1]);
        match app.guard_view() {
            GuardView::Verifying => draw_verifying(frame, chunks[2]),
            GuardView::Hidden => {}
            GuardView::Protected => match app.active_tab {
                Tab::Dashboard => dashboard::draw(frame, app, chunks[2]),
                Tab::Activity => activity::draw(frame, app, chunks[2]),
                Tab::Cards => cards::draw(frame, app, chunks[2]),
                Tab::Rooms => rooms::draw(frame, app, chunks[2]),
                Tab::Profile => profile::draw(frame, app, chunks[2]),
                Tab::Log => log::draw(frame, app, chunks[2]),
            },
        }
    }

    // Key help footer
    draw_key_help(frame, app, chunks[3]);

    // Help overlay (if toggled)
    if app.show_help {
        help::draw(frame, app);
    }
}

/// Blocking placeholder while the session is being verified.
pub fn draw_verifying(frame: &mut Frame, area: Rect) {
    let msg = Paragraph::new("  Memverifikasi akses...")
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(msg, area);
}

fn key(label: &str) -> Span<'_> {
    Span::styled(label, Style::default().fg(Color::Yellow))
}

/// Render the bottom key-help bar.
fn draw_key_help(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();

    if app.route == Route::Login {
        spans.extend([
            key(" Tab"),
            Span::raw(" Field  "),
            key("Enter"),
            Span::raw(" Login  "),
            key("Esc"),
            Span::raw(" Quit"),
        ]);
    } else if app.is_text_entry() {
        spans.extend([
            key(" Tab"),
            Span::raw(" Field  "),
            key("Enter"),
            Span::raw(" Save  "),
            key("Esc"),
            Span::raw(" Cancel"),
        ]);
    } else {
        spans.extend([
            key(" q"),
            Span::raw(" Quit  "),
            key("Tab"),
            Span::raw(" Switch  "),
            key("1-6"),
            Span::raw(" Jump  "),
        ]);

        match app.active_tab {
            Tab::Dashboard => {
                spans.extend([key("m"), Span::raw(" Chart  "), key("r"), Span::raw(" Refresh  ")]);
            }
            Tab::Activity => {
                spans.extend([
                    key("↑↓"),
                    Span::raw(" Field  "),
                    key("←→"),
                    Span::raw(" Value  "),
                    key("x"),
                    Span::raw(" Reset  "),
                ]);
            }
            Tab::Cards | Tab::Rooms => {
                spans.extend([
                    key("n"),
                    Span::raw(" New  "),
                    key("e"),
                    Span::raw(" Edit  "),
                    key("d"),
                    Span::raw(" Delete  "),
                ]);
            }
            Tab::Profile => {
                spans.extend([key("p"), Span::raw(" Password  "), key("o"), Span::raw(" Logout  ")]);
            }
            Tab::Log => {
                spans.extend([key("↑↓"), Span::raw(" Scroll  ")]);
            }
        }

        spans.extend([key("?"), Span::raw(" Help")]);
    }

    let help = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, area);
}
