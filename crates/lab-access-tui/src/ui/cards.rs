//! Cards tab: card table with the create / edit form.

use lab_access_client::forms::OwnerKind;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table};

use crate::app::{App, CardEditor, CardField};
use crate::ui::help::centered_rect;
use crate::ui::login::field_lines;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.cards;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(1)])
        .split(area);

    let block = Block::default()
        .title(format!(" Kartu Akses ({}) ", view.items.len()))
        .borders(Borders::ALL);

    if view.loading && view.items.is_empty() {
        let msg = Paragraph::new("  Memuat kartu...")
            .style(Style::default().fg(Color::Yellow))
            .block(block);
        frame.render_widget(msg, chunks[0]);
    } else {
        let header = Row::new(["UID", "Status", "Pemilik", "Keterangan"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row<'_>> = view
            .items
            .iter()
            .enumerate()
            .map(|(i, card)| {
                let style = if i == view.selected {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    card.uid.clone(),
                    card.status.clone(),
                    card.owner_label().to_string(),
                    card.keterangan.clone().unwrap_or_default(),
                ])
                .style(style)
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Length(14),
                Constraint::Length(10),
                Constraint::Min(14),
                Constraint::Min(14),
            ],
        )
        .header(header)
        .block(block);
        frame.render_widget(table, chunks[0]);
    }

    if view.confirm_delete.is_some() {
        let confirm = Paragraph::new(Line::from(vec![
            Span::styled(" Hapus kartu ini? ", Style::default().fg(Color::Red)),
            Span::styled("y", Style::default().fg(Color::Yellow)),
            Span::raw(" ya, tombol lain batal"),
        ]));
        frame.render_widget(confirm, chunks[1]);
    }

    if let Some(editor) = &view.editor {
        draw_editor(frame, app, editor, area);
    }
}

/// Name of the selected owner, looked up in the loaded option lists.
fn owner_name(app: &App, editor: &CardEditor) -> Option<String> {
    let id = editor.owner_id().parse::<i64>().ok()?;
    let options = app.activity.filter.options();
    match editor.owner {
        OwnerKind::User => options
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone()),
        OwnerKind::Class => options
            .kelas
            .iter()
            .find(|k| k.id == id)
            .map(|k| k.nama.clone()),
    }
}

fn draw_editor(frame: &mut Frame, app: &App, editor: &CardEditor, area: Rect) {
    let popup = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup);
    let title = if editor.form.is_edit() {
        " Edit Kartu "
    } else {
        " Tambah Kartu "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let mut lines = Vec::new();
    for field in CardField::ALL {
        let value = match field {
            CardField::Uid => editor.form.uid.clone(),
            CardField::Status => format!("◀ {} ▶", editor.form.status),
            CardField::Keterangan => editor.form.keterangan.clone(),
            CardField::Owner => match editor.owner {
                OwnerKind::User => "◀ User ▶".to_string(),
                OwnerKind::Class => "◀ Kelas ▶".to_string(),
            },
            CardField::OwnerId => match owner_name(app, editor) {
                Some(name) => format!("{} ({name})", editor.owner_id()),
                None => editor.owner_id().to_string(),
            },
        };
        lines.extend(field_lines(
            field.label(),
            value,
            editor.field == field,
            editor.error_for(field),
        ));
    }
    if editor.submitting {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            " Menyimpan...",
            Style::default().fg(Color::Yellow),
        )));
    }

    frame.render_widget(Paragraph::new(lines).block(block), popup);
}
