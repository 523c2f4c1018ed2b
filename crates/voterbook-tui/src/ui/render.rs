use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use voterbook_core::models::LocationLevel;

use crate::app::{form_rows, App, AppState, FilterRow, FormRow, LoginFocus, Tab, FILTER_ROWS};

use super::styles;
use super::tabs::{dashboard, users, voters};

const LOGO: [&str; 3] = [
    "  ╦  ╦╔═╗╔╦╗╔═╗╦═╗╔╗ ╔═╗╔═╗╦╔═",
    "  ╚╗╔╝║ ║ ║ ║╣ ╠╦╝╠╩╗║ ║║ ║╠╩╗",
    "   ╚╝ ╚═╝ ╩ ╚═╝╩╚═╚═╝╚═╝╚═╝╩ ╩",
];

fn logo_lines(indent: &str) -> Vec<Line<'static>> {
    LOGO.iter()
        .map(|l| Line::from(Span::styled(format!("{}{}", indent, l), styles::title_style())))
        .collect()
}

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(3), // Tabs
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_tabs(frame, app, chunks[1]);
    render_main_content(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::LoggingIn => render_login_overlay(frame, app),
        AppState::Filtering => render_filter_overlay(frame, app),
        AppState::EditingVoter => render_form_overlay(frame, app),
        AppState::ConfirmingDelete => render_delete_overlay(frame, app),
        AppState::ConfirmingQuit => render_quit_overlay(frame),
        _ => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  Voterbook";
    let who = match app.principal {
        Some(ref p) => {
            let scope = app
                .hierarchy
                .as_ref()
                .map(|h| h.display_path(&p.user().access_scope))
                .filter(|s| !s.is_empty());
            match scope {
                Some(scope) => format!("{} · {} · {}", p.user().display_name(), p.role().display_name(), scope),
                None => format!("{} · {}", p.user().display_name(), p.role().display_name()),
            }
        }
        None => String::new(),
    };
    let mode = if app.offline_mode { "[offline] " } else { "" };
    let help_hint = "[?] Help";
    let used = title.chars().count() + who.chars().count() + mode.len() + help_hint.len() + 6;

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw("   "),
        Span::styled(who, styles::list_item_style()),
        Span::raw(" ".repeat((area.width as usize).saturating_sub(used))),
        Span::styled(mode, styles::error_style()),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(title_line).block(block);
    frame.render_widget(paragraph, area);
}

fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let tabs = [Tab::Voters, Tab::Dashboard, Tab::Users];

    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in tabs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", styles::muted_style()));
        }
        let label = format!("[{}] {}", i + 1, tab.title());
        if app.current_tab == *tab {
            spans.push(Span::styled(label, styles::tab_style(true)));
        } else {
            spans.push(Span::styled(label, styles::muted_style()));
        }
    }

    // Active filter on the right
    if !app.filter.is_empty() {
        let summary = format!("Filter: {}", app.filter_summary());
        let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
        let padding = (area.width as usize).saturating_sub(used + summary.chars().count() + 2);
        spans.push(Span::raw(" ".repeat(padding)));
        spans.push(Span::styled(summary, styles::search_style()));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(Line::from(spans)).block(block);
    frame.render_widget(paragraph, area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    match app.current_tab {
        Tab::Voters => voters::render(frame, app, area),
        Tab::Dashboard => dashboard::render(frame, app, area),
        Tab::Users => users::render(frame, app, area),
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = match app.current_tab {
        Tab::Voters => "[+]new [f]ilter [E]xport [u]pdate [q]uit",
        Tab::Dashboard => "[f]ilter [u]pdate [q]uit",
        Tab::Users => "[a]pprove [x]delete [u]pdate [q]uit",
    };

    let (left_text, left_style) = if matches!(app.state, AppState::Searching) {
        (format!(" /{}▌", app.search_query), styles::search_style())
    } else if let Some(ref msg) = app.status_message {
        let style = if msg.starts_with("Error") {
            styles::error_style()
        } else {
            styles::muted_style()
        };
        (format!(" {} ", msg), style)
    } else {
        (format!(" Updated {} ", app.cache_ages.last_updated()), styles::muted_style())
    };

    let right_text = format!(" {} ", shortcuts);
    let padding_len = (area.width as usize)
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());

    let status_line = Line::from(vec![
        Span::styled(left_text, left_style),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    let paragraph = Paragraph::new(status_line).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(54, 31, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let mut help_text = logo_lines("    ");
    help_text.extend([
        Line::from(Span::styled(
            format!("                 version {}", version),
            styles::muted_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Navigation", styles::highlight_style())),
        help_line("1-3", "Switch tabs"),
        help_line("←/→", "Prev/next tab"),
        help_line("Tab", "Switch focus (list ↔ detail)"),
        help_line("↑/↓ j/k", "Navigate list"),
        help_line("Esc", "Go back"),
        Line::from(""),
        Line::from(Span::styled(" Actions", styles::highlight_style())),
        help_line("/", "Search loaded voters"),
        help_line("f / c", "Edit filter / clear filter"),
        help_line("u", "Update data from the server"),
        help_line("o", "Toggle offline mode"),
        help_line("q", "Quit"),
        Line::from(""),
        Line::from(Span::styled(" Voters Tab", styles::highlight_style())),
        help_line("n/a/i/p/l", "Sort by name/age/intent/priority/loc"),
        help_line("+", "Add a voter (Ctrl+S saves)"),
        help_line("I / P", "Cycle voting intent / priority"),
        help_line("x", "Delete voter"),
        help_line("E", "Export list to CSV"),
        Line::from(""),
        Line::from(Span::styled(" Users Tab", styles::highlight_style())),
        help_line("a / x", "Approve / delete user"),
        Line::from(""),
        Line::from(vec![
            Span::styled("        Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let height = if app.login_error.is_some() { 14 } else { 12 };
    let area = centered_rect_fixed(50, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = logo_lines("     ");
    lines.push(Line::from(""));

    let field_style = |focused: bool| {
        if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        }
    };

    let email_focused = app.login_focus == LoginFocus::Email;
    let tail: String = {
        let count = app.login_email.chars().count();
        app.login_email.chars().skip(count.saturating_sub(24)).collect()
    };
    lines.push(Line::from(vec![
        Span::raw("   "),
        Span::styled("Email:    [", styles::muted_style()),
        Span::styled(
            format!("{:<24}{}", tail, if email_focused { "▌" } else { "" }),
            field_style(email_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let masked = "*".repeat(app.login_password.chars().count().min(24));
    lines.push(Line::from(vec![
        Span::raw("   "),
        Span::styled("Password: [", styles::muted_style()),
        Span::styled(
            format!("{:<24}{}", masked, if password_focused { "▌" } else { "" }),
            field_style(password_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let button_focused = app.login_focus == LoginFocus::Button;
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("               ["),
        Span::styled(
            if button_focused { " ▶ Login ◀ " } else { "   Login   " },
            field_style(button_focused),
        ),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!(" {}", error), styles::error_style())));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn location_value(app: &App, level: LocationLevel, id: Option<&str>) -> String {
    match (id, app.hierarchy.as_ref()) {
        (Some(id), Some(h)) => h.name_of(level, id).unwrap_or(id).to_string(),
        (Some(id), None) => id.to_string(),
        (None, _) => "Any".to_string(),
    }
}

fn render_filter_overlay(frame: &mut Frame, app: &App) {
    let Some(ref draft) = app.filter_draft else { return };
    let area = centered_rect_fixed(52, 16, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![Line::from(Span::styled(" Filter voters", styles::title_style())), Line::from("")];

    for (i, row) in FILTER_ROWS.iter().enumerate() {
        let (label, value, locked) = match row {
            FilterRow::Level(level) => (
                level.label(),
                location_value(app, *level, draft.selection.get(*level)),
                draft.selection.is_locked(*level),
            ),
            FilterRow::Intent => ("Intent", draft.voting_intent.clone().unwrap_or_else(|| "Any".into()), false),
            FilterRow::Priority => ("Priority", draft.priority_level.clone().unwrap_or_else(|| "Any".into()), false),
            FilterRow::Gender => ("Gender", draft.gender.clone().unwrap_or_else(|| "Any".into()), false),
        };
        let style = if i == draft.row {
            styles::selected_style()
        } else if locked {
            styles::muted_style()
        } else {
            styles::list_item_style()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<10}", label), styles::muted_style()),
            Span::styled(format!("‹ {} ›", value), style),
            Span::styled(if locked { "  (your scope)" } else { "" }, styles::muted_style()),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  ←/→ change  Backspace clear  Enter apply  Esc cancel",
        styles::muted_style(),
    )));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_form_overlay(frame: &mut Frame, app: &App) {
    let Some(ref draft) = app.form_draft else { return };
    let frame_area = frame.area();
    let area = centered_rect_fixed(70, frame_area.height.saturating_sub(4).min(34), frame_area);
    frame.render_widget(Clear, area);

    let rows = form_rows();
    // Keep the focused row visible
    let visible = area.height.saturating_sub(6) as usize;
    let start = draft.row.saturating_sub(visible.saturating_sub(1));

    let mut lines = vec![Line::from(Span::styled(" New voter", styles::title_style()))];
    for (i, row) in rows.iter().enumerate().skip(start).take(visible) {
        let focused = i == draft.row;
        let (label, value, issues) = match row {
            FormRow::Field(field) => (
                field.header(),
                draft.form.get(*field).to_string(),
                draft.error.as_ref().map(|e| e.issues_for(*field)).unwrap_or_default(),
            ),
            FormRow::Location(level) => {
                let locked = draft.form.selection().is_locked(*level);
                let name = location_value(app, *level, draft.form.selection().get(*level));
                let value = if locked { format!("{} (locked)", name) } else { format!("‹ {} ›", name) };
                (level.label(), value, Vec::new())
            }
        };
        let style = if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        let mut spans = vec![
            Span::styled(format!("  {:<22}", label), styles::muted_style()),
            Span::styled(format!("{}{}", value, if focused { "▌" } else { "" }), style),
        ];
        if let Some(issue) = issues.first() {
            spans.push(Span::styled(format!("  {}", issue), styles::error_style()));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    if let Some(ref err) = draft.error {
        lines.push(Line::from(Span::styled(format!("  {}", err.user_message()), styles::error_style())));
    }
    lines.push(Line::from(Span::styled(
        "  ↑/↓ move  ←/→ pick location  Ctrl+S save  Esc cancel",
        styles::muted_style(),
    )));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_delete_overlay(frame: &mut Frame, app: &App) {
    let Some(ref target) = app.pending_delete else { return };
    let area = centered_rect_fixed(50, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Delete ", styles::highlight_style()),
            Span::styled(target.label().to_string(), styles::error_style()),
            Span::styled("?", styles::highlight_style()),
        ]),
        Line::from(Span::styled("  This cannot be undone.", styles::muted_style())),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to delete, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::error_style());
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 10, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = logo_lines("   ");
    lines.extend([
        Line::from(""),
        Line::from(Span::styled("   Are you sure you want to quit?", styles::highlight_style())),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Press ", styles::muted_style()),
            Span::styled("[Y]", styles::help_key_style()),
            Span::styled(" to quit, ", styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" to cancel", styles::muted_style()),
        ]),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
