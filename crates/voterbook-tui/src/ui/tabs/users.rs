use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use voterbook_core::models::AppUser;

use crate::app::{App, Focus};
use crate::ui::styles;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_user_table(frame, app, chunks[0]);
    render_user_detail(frame, app, chunks[1]);
}

fn scope_text(app: &App, user: &AppUser) -> String {
    if user.access_scope.is_empty() {
        return "Everywhere".to_string();
    }
    match app.hierarchy {
        Some(ref h) => h.display_path(&user.access_scope),
        None => user
            .access_scope
            .constraints()
            .into_iter()
            .map(|(_, id)| id)
            .collect::<Vec<_>>()
            .join("/"),
    }
}

fn render_user_table(frame: &mut Frame, app: &App, area: Rect) {
    let focused = matches!(app.focus, Focus::List);
    let pending = app.users.iter().filter(|u| !u.approved).count();

    let header = Row::new(["Name", "Role", "Status", "Area"].map(Cell::from))
        .style(styles::title_style())
        .height(1);

    let rows: Vec<Row> = app
        .users
        .iter()
        .map(|user| {
            let status = if user.approved {
                Span::styled("Approved", styles::success_style())
            } else {
                Span::styled("Pending", styles::highlight_style())
            };
            Row::new(vec![
                Cell::from(user.display_name().to_string()),
                Cell::from(user.role.display_name()),
                Cell::from(status),
                Cell::from(scope_text(app, user)),
            ])
            .style(styles::list_item_style())
        })
        .collect();

    let widths = [
        Constraint::Percentage(30),
        Constraint::Length(16),
        Constraint::Length(9),
        Constraint::Fill(1),
    ];

    let title = format!(" Users ({}, {} pending) ", app.users.len(), pending);
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(focused)),
        )
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if !app.users.is_empty() {
        state.select(Some(app.user_selection));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_user_detail(frame: &mut Frame, app: &App, area: Rect) {
    let focused = matches!(app.focus, Focus::Detail);

    let lines = match app.selected_user() {
        Some(user) => {
            let mut lines = vec![
                Line::from(Span::styled(user.display_name().to_string(), styles::title_style())),
                Line::from(""),
                Line::from(vec![
                    Span::styled("Email:   ", styles::muted_style()),
                    Span::raw(user.email.clone()),
                ]),
                Line::from(vec![
                    Span::styled("Role:    ", styles::muted_style()),
                    Span::raw(user.role.display_name()),
                ]),
                Line::from(vec![
                    Span::styled("Area:    ", styles::muted_style()),
                    Span::raw(scope_text(app, user)),
                ]),
                Line::from(vec![
                    Span::styled("Joined:  ", styles::muted_style()),
                    Span::raw(
                        user.created_at
                            .map(|d| d.format("%b %d, %Y").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ]),
            ];
            lines.push(Line::from(""));
            if user.approved {
                lines.push(Line::from(Span::styled("Approved", styles::success_style())));
            } else {
                lines.push(Line::from(Span::styled(
                    "Waiting for approval. Press [a] to approve.",
                    styles::highlight_style(),
                )));
            }
            if app.principal.as_ref().is_some_and(|p| p.uid() == user.uid) {
                lines.push(Line::from(Span::styled("This is you", styles::muted_style())));
            }
            lines
        }
        None => vec![Line::from(Span::styled(
            "No users you can manage",
            styles::muted_style(),
        ))],
    };

    let block = Block::default()
        .title(" Account ")
        .title_style(styles::muted_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(focused));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}
