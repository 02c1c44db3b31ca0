//! Login view: username and password fields with inline validation.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, LoginField};
use crate::ui::help::centered_rect;

/// One labelled input line, with its validation message below.
pub fn field_lines<'a>(
    label: &'a str,
    value: String,
    focused: bool,
    error: Option<&'a str>,
) -> Vec<Line<'a>> {
    let label_style = if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    let cursor = if focused { "▏" } else { "" };
    let mut lines = vec![Line::from(vec![
        Span::styled(format!(" {label:<12}"), label_style),
        Span::raw(value),
        Span::styled(cursor, Style::default().fg(Color::Cyan)),
    ])];
    if let Some(message) = error {
        lines.push(Line::from(Span::styled(
            format!("   {message}"),
            Style::default().fg(Color::Red),
        )));
    }
    lines
}

pub fn mask(value: &str) -> String {
    "•".repeat(value.chars().count())
}

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(50, 60, area);
    let block = Block::default()
        .title(" Login Admin ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    if app.session.is_loading {
        crate::ui::draw_verifying(frame, inner);
        return;
    }

    let view = &app.login;
    let focus = view.focused();
    let mut lines = vec![
        Line::from(Span::styled(
            " Masuk untuk mengelola akses lab.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];
    lines.extend(field_lines(
        "Username",
        view.form.username.clone(),
        focus == LoginField::Username,
        view.errors.get("username"),
    ));
    lines.push(Line::from(""));
    lines.extend(field_lines(
        "Password",
        mask(&view.form.password),
        focus == LoginField::Password,
        view.errors.get("password"),
    ));
    lines.push(Line::from(""));
    if view.submitting {
        lines.push(Line::from(Span::styled(
            " Memproses...",
            Style::default().fg(Color::Yellow),
        )));
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);
    frame.render_widget(Paragraph::new(lines), rows[1]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_every_char() {
        assert_eq!(mask("abc"), "•••");
        assert_eq!(mask(""), "");
    }

    #[test]
    fn test_field_lines_include_error() {
        assert_eq!(field_lines("Username", String::new(), true, None).len(), 1);
        assert_eq!(
            field_lines("Username", String::new(), false, Some("Username harus diisi.")).len(),
            2
        );
    }
}
