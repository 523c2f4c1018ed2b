use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use voterbook_core::models::{VoterData, VoterSortColumn};
use voterbook_core::utils::{format_optional, format_phone, truncate};

use crate::app::{App, Focus};
use crate::ui::styles;

const PLACEHOLDER: &str = "-";

/// Render the Voters tab - table with sortable columns and a detail panel
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_voter_table(frame, app, chunks[0]);
    render_voter_detail(frame, app, chunks[1]);
}

fn location_cell(app: &App, voter: &VoterData) -> String {
    let path = voter.location();
    match (app.hierarchy.as_ref(), path.deepest()) {
        (Some(h), Some(level)) => path
            .get(level)
            .and_then(|id| h.name_of(level, id))
            .unwrap_or(PLACEHOLDER)
            .to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

fn render_voter_table(frame: &mut Frame, app: &App, area: Rect) {
    let voters = app.visible_voters();
    let focused = matches!(app.focus, Focus::List);

    let sort_indicator = |col: VoterSortColumn| {
        if app.voter_sort_column == col {
            if app.voter_sort_ascending { " ▲" } else { " ▼" }
        } else {
            ""
        }
    };

    let header = Row::new([
        VoterSortColumn::Name,
        VoterSortColumn::Age,
        VoterSortColumn::Intent,
        VoterSortColumn::Priority,
        VoterSortColumn::Location,
    ]
    .map(|col| Cell::from(format!("{}{}", col.label(), sort_indicator(col)))))
    .style(styles::title_style())
    .height(1);

    let rows: Vec<Row> = voters
        .iter()
        .map(|voter| {
            let intent = voter.voting_intent.as_deref();
            let priority = voter.priority_level.as_deref();
            Row::new(vec![
                Cell::from(voter.voter_name.clone()),
                Cell::from(format!("{:>3}", voter.age_str())),
                Cell::from(Span::styled(intent.unwrap_or(PLACEHOLDER).to_string(), styles::intent_style(intent))),
                Cell::from(Span::styled(priority.unwrap_or(PLACEHOLDER).to_string(), styles::priority_style(priority))),
                Cell::from(location_cell(app, voter)),
            ])
            .style(styles::list_item_style())
        })
        .collect();

    let widths = [
        Constraint::Percentage(34),
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(9),
        Constraint::Fill(1),
    ];

    let title = if app.search_query.is_empty() {
        format!(" Voters ({}) - [n]ame [a]ge [i]ntent [p]riority [l]ocation ", voters.len())
    } else {
        format!(" Voters ({} of {}) matching \"{}\" ", voters.len(), app.voters.len(), app.search_query)
    };

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
    if !voters.is_empty() {
        state.select(Some(app.voter_selection));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn field_line(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<14}", label), styles::muted_style()),
        Span::raw(value),
    ])
}

fn yes_no(value: Option<bool>) -> String {
    match value {
        Some(true) => "Yes".to_string(),
        Some(false) => "No".to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

fn render_voter_detail(frame: &mut Frame, app: &App, area: Rect) {
    let focused = matches!(app.focus, Focus::Detail);

    let content = match app.selected_voter() {
        Some(voter) => {
            let opt = |v: &Option<String>| format_optional(v, PLACEHOLDER);
            let phone = |v: &Option<String>| v.as_deref().map(format_phone).unwrap_or_else(|| PLACEHOLDER.to_string());
            let address = match app.hierarchy {
                Some(ref h) => h.display_path(voter.location()),
                None => PLACEHOLDER.to_string(),
            };

            let mut lines = vec![
                Line::from(Span::styled(voter.voter_name.clone(), styles::title_style())),
                Line::from(Span::styled(truncate(&address, 60), styles::muted_style())),
                Line::from(""),
                Line::from(Span::styled("Personal", styles::highlight_style())),
                field_line("Father/Husb.:", opt(&voter.father_or_husband_name)),
                field_line("Mother:", opt(&voter.mother_name)),
                field_line("Age:", voter.age_str()),
                field_line("Gender:", opt(&voter.gender)),
                field_line("Marital:", opt(&voter.marital_status)),
                field_line("Occupation:", opt(&voter.occupation)),
                field_line("Education:", opt(&voter.education)),
                field_line("Religion:", opt(&voter.religion)),
                Line::from(""),
                Line::from(Span::styled("Voter Record", styles::highlight_style())),
                field_line("NID:", opt(&voter.nid)),
                field_line("Serial:", opt(&voter.voter_serial)),
                field_line("Centre:", opt(&voter.voting_center)),
                Line::from(""),
                Line::from(Span::styled("Contact", styles::highlight_style())),
                field_line("Phone:", phone(&voter.phone)),
                field_line("WhatsApp:", phone(&voter.whatsapp)),
                field_line("Email:", opt(&voter.email).chars().take(32).collect()),
                field_line("House:", opt(&voter.house_address)),
                field_line(
                    "Family:",
                    voter.family_members.map(|n| n.to_string()).unwrap_or_else(|| PLACEHOLDER.to_string()),
                ),
                Line::from(""),
                Line::from(Span::styled("Campaign", styles::highlight_style())),
                field_line("Affiliation:", opt(&voter.political_affiliation)),
                Line::from(vec![
                    Span::styled(format!("{:<14}", "Intent:"), styles::muted_style()),
                    Span::styled(opt(&voter.voting_intent), styles::intent_style(voter.voting_intent.as_deref())),
                ]),
                Line::from(vec![
                    Span::styled(format!("{:<14}", "Priority:"), styles::muted_style()),
                    Span::styled(opt(&voter.priority_level), styles::priority_style(voter.priority_level.as_deref())),
                ]),
                field_line("Transport:", yes_no(voter.needs_transport)),
                field_line("Abroad:", yes_no(voter.has_family_abroad)),
            ];

            if let Some(ref remarks) = voter.remarks {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled("Remarks", styles::highlight_style())));
                lines.push(Line::from(remarks.clone()));
            }

            if let Some(updated) = voter.updated_at.or(voter.created_at) {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Last changed {}", updated.format("%b %d, %Y")),
                    styles::muted_style(),
                )));
            }
            lines
        }
        None => {
            let hint = if app.voters.is_empty() {
                "No voters loaded. Press [u] to update or [+] to add one."
            } else {
                "No voters match the current filter."
            };
            vec![Line::from(Span::styled(hint, styles::muted_style()))]
        }
    };

    let paragraph = Paragraph::new(content)
        .block(
            Block::default()
                .title(" Details - [I]ntent [P]riority [x] delete ")
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(focused)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}
