//! Activity tab: filter panel beside the access log table.

use lab_access_client::activity::{self, FilterField, FilterOptions, NOT_CHECKED_OUT};
use lab_access_client::api::logs::ActivityLogRow;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(40)])
        .split(area);

    draw_filters(frame, app, chunks[0]);
    draw_table(frame, app, chunks[1]);
}

fn field_label(field: FilterField) -> &'static str {
    match field {
        FilterField::Lab => "Lab",
        FilterField::Kelas => "Kelas",
        FilterField::User => "User",
        FilterField::Status => "Status",
        FilterField::StartDate => "Dari",
        FilterField::EndDate => "Sampai",
    }
}

/// Human-readable value of a criterion: ids resolve to names.
fn display_value(field: FilterField, value: &str, options: &FilterOptions) -> String {
    if value.is_empty() {
        return "Semua".to_string();
    }
    let id = value.parse::<i64>().ok();
    let name = match field {
        FilterField::Lab => options
            .labs
            .iter()
            .find(|r| Some(r.id) == id)
            .map(|r| r.nama.clone()),
        FilterField::Kelas => options
            .kelas
            .iter()
            .find(|k| Some(k.id) == id)
            .map(|k| k.nama.clone()),
        FilterField::User => options
            .users
            .iter()
            .find(|u| Some(u.id) == id)
            .map(|u| u.username.clone()),
        FilterField::Status | FilterField::StartDate | FilterField::EndDate => None,
    };
    name.unwrap_or_else(|| value.to_string())
}

fn draw_filters(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.activity;
    let criteria = view.filter.criteria();
    let options = view.filter.options();

    let mut lines = Vec::new();
    for (i, field) in FilterField::ALL.iter().enumerate() {
        let selected = i == view.field % FilterField::ALL.len();
        let marker = if selected { "▶" } else { " " };
        let value = if selected && view.editing.is_some() {
            format!("{}▏", view.editing.as_deref().unwrap_or(""))
        } else {
            display_value(*field, criteria.get(*field), options)
        };
        let style = if selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{marker} {:<7}", field_label(*field)), style),
            Span::raw(value),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " Tanggal: YYYY-MM-DD",
        Style::default().fg(Color::DarkGray),
    )));

    let block = Block::default().title(" Filter ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Render an ISO timestamp as `YYYY-MM-DD HH:MM`; the unset sentinel shows
/// as `-`.
pub fn format_timestamp(value: Option<&str>) -> String {
    match value {
        None | Some("") => "-".to_string(),
        Some(v) if v.starts_with(NOT_CHECKED_OUT) => "-".to_string(),
        Some(v) => v.replacen('T', " ", 1).chars().take(16).collect(),
    }
}

fn status_span(row: &ActivityLogRow) -> Span<'static> {
    if activity::is_checked_out(row) {
        Span::styled("Keluar", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled("Di dalam", Style::default().fg(Color::Green))
    }
}

fn draw_table(frame: &mut Frame, app: &App, area: Rect) {
    let view = &app.activity;
    let rows = view.filter.filtered();
    let title = format!(
        " Aktivitas ({} dari {}) ",
        rows.len(),
        view.filter.rows().len()
    );
    let block = Block::default().title(title).borders(Borders::ALL);

    if view.loading && view.filter.rows().is_empty() {
        let msg = Paragraph::new("  Memuat log akses...")
            .style(Style::default().fg(Color::Yellow))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }
    if rows.is_empty() {
        let msg = Paragraph::new("  Tidak ada aktivitas yang cocok.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let header = Row::new(["Lab", "Kelas", "User", "UID", "Masuk", "Keluar", "Status"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let body: Vec<Row<'_>> = rows
        .iter()
        .skip(view.scroll)
        .map(|row| {
            Row::new(vec![
                Span::raw(row.ruangan_nama.clone().unwrap_or_else(|| "-".into())),
                Span::raw(row.kelas_nama.clone().unwrap_or_else(|| "-".into())),
                Span::raw(row.user_username.clone().unwrap_or_else(|| "-".into())),
                Span::raw(row.uid.clone().unwrap_or_else(|| "-".into())),
                Span::raw(format_timestamp(row.timestamp_masuk.as_deref())),
                Span::raw(format_timestamp(row.timestamp_keluar.as_deref())),
                status_span(row),
            ])
        })
        .collect();

    let table = Table::new(
        body,
        [
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Min(10),
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(block);
    frame.render_widget(table, area);
}
