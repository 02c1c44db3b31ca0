//! Profile tab: signed-in user and the change-password form.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::App;
use crate::ui::login::{field_lines, mask};

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    draw_user(frame, app, chunks[0]);
    draw_password(frame, app, chunks[1]);
}

fn draw_user(frame: &mut Frame, app: &App, area: Rect) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let lines = vec![
        Line::from(vec![
            Span::styled(" Username: ", bold),
            Span::styled(
                app.session.username().unwrap_or("-"),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Line::from(vec![
            Span::styled("     Role: ", bold),
            Span::raw(app.session.role().unwrap_or("-")),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            " o untuk logout",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let block = Block::default().title(" Profil ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_password(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.profile;
    let block = Block::default()
        .title(" Ganti Password ")
        .borders(Borders::ALL);

    if !view.editing {
        let msg = Paragraph::new("  Tekan p untuk mengganti password.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let fields = [
        ("Lama", &view.form.old_password),
        ("Baru", &view.form.new_password),
        ("Konfirmasi", &view.form.confirm_password),
    ];
    let mut lines = Vec::new();
    for (i, (label, value)) in fields.into_iter().enumerate() {
        lines.extend(field_lines(label, mask(value), view.field == i, None));
    }
    if view.submitting {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            " Menyimpan...",
            Style::default().fg(Color::Yellow),
        )));
    }
    frame.render_widget(Paragraph::new(lines).block(block), area);
}
