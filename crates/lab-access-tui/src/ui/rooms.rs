//! Rooms tab: lab list with the name form.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table};

use crate::app::{App, RoomEditor};
use crate::ui::help::centered_rect;
use crate::ui::login::field_lines;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.rooms;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(1)])
        .split(area);

    let block = Block::default()
        .title(format!(" Lab ({}) ", view.items.len()))
        .borders(Borders::ALL);

    if view.loading && view.items.is_empty() {
        let msg = Paragraph::new("  Memuat lab...")
            .style(Style::default().fg(Color::Yellow))
            .block(block);
        frame.render_widget(msg, chunks[0]);
    } else {
        let header =
            Row::new(["ID", "Nama"]).style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row<'_>> = view
            .items
            .iter()
            .enumerate()
            .map(|(i, room)| {
                let style = if i == view.selected {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else {
                    Style::default()
                };
                Row::new(vec![room.id.to_string(), room.nama.clone()]).style(style)
            })
            .collect();
        let table = Table::new(rows, [Constraint::Length(6), Constraint::Min(20)])
            .header(header)
            .block(block);
        frame.render_widget(table, chunks[0]);
    }

    if view.confirm_delete.is_some() {
        let confirm = Paragraph::new(Line::from(vec![
            Span::styled(" Hapus lab ini? ", Style::default().fg(Color::Red)),
            Span::styled("y", Style::default().fg(Color::Yellow)),
            Span::raw(" ya, tombol lain batal"),
        ]));
        frame.render_widget(confirm, chunks[1]);
    }

    if let Some(editor) = &view.editor {
        draw_editor(frame, editor, area);
    }
}

fn draw_editor(frame: &mut Frame, editor: &RoomEditor, area: Rect) {
    let popup = centered_rect(50, 30, area);
    frame.render_widget(Clear, popup);
    let title = if editor.form.is_edit() {
        " Edit Lab "
    } else {
        " Tambah Lab "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let mut lines = field_lines(
        "Nama",
        editor.form.nama.clone(),
        true,
        editor.errors.get("nama"),
    );
    if editor.submitting {
        lines.push(Line::from(Span::styled(
            " Menyimpan...",
            Style::default().fg(Color::Yellow),
        )));
    }
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}
