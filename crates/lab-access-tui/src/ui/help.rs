//! Help overlay, displayed when the user presses '?'.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::app::App;

/// Render a centered help overlay.
pub fn draw(frame: &mut Frame, _app: &App) {
    let area = centered_rect(60, 80, frame.area());

    // Clear the area behind the overlay
    frame.render_widget(Clear, area);

    let lines = vec![
        section("Umum"),
        key_line("q / Ctrl+C", "Keluar"),
        key_line("Tab / Shift+Tab", "Pindah tab"),
        key_line("1-6", "Lompat ke tab"),
        key_line("?", "Tampilkan / tutup bantuan"),
        Line::from(""),
        section("Dashboard"),
        key_line("m", "Grafik bulanan / 30 hari"),
        key_line("r", "Muat ulang"),
        Line::from(""),
        section("Aktivitas"),
        key_line("↑ / ↓", "Pilih filter"),
        key_line("← / →", "Ganti nilai"),
        key_line("Enter", "Isi tanggal (YYYY-MM-DD)"),
        key_line("Backspace", "Kosongkan filter"),
        key_line("x", "Reset semua filter"),
        key_line("PgUp / PgDn", "Gulir tabel"),
        Line::from(""),
        section("Kartu / Lab"),
        key_line("n", "Tambah"),
        key_line("e / Enter", "Edit"),
        key_line("d lalu y", "Hapus"),
        key_line("← / →", "Ganti status / pemilik (form kartu)"),
        Line::from(""),
        section("Profil"),
        key_line("p", "Ganti password"),
        key_line("o", "Logout"),
        Line::from(""),
        Line::from(Span::styled(
            "Tekan ? untuk menutup",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let block = Block::default()
        .title(" Bantuan ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}

fn section(title: &str) -> Line<'_> {
    Line::from(Span::styled(
        title,
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))
}

/// Format a key binding help line.
fn key_line<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(
            format!("{key:<16}"),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(desc),
    ])
}

/// Create a centered rect using percentage of the parent area.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
