use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use voterbook_core::import::{PRIORITY_LEVELS, VOTING_INTENTS};
use voterbook_core::models::LocationLevel;
use voterbook_core::stats::{VoterStats, NOT_SET};

use crate::app::App;
use crate::ui::styles;

/// Width of the horizontal bars in characters.
const BAR_WIDTH: usize = 20;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let stats = app.stats();

    // 1. Totals (full width)
    // 2. Intent | Priority
    // 3. Age | Locations
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Percentage(40),
            Constraint::Min(8),
        ])
        .split(area);

    render_totals(frame, app, &stats, rows[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let mut intents: Vec<&str> = VOTING_INTENTS.to_vec();
    intents.push(NOT_SET);
    render_breakdown(frame, " Voting Intent ", &stats, &intents, &stats.by_intent, middle[0], |v| {
        styles::intent_style((v != NOT_SET).then_some(v))
    });
    let mut priorities: Vec<&str> = PRIORITY_LEVELS.to_vec();
    priorities.push(NOT_SET);
    render_breakdown(frame, " Priority ", &stats, &priorities, &stats.by_priority, middle[1], |v| {
        styles::priority_style((v != NOT_SET).then_some(v))
    });

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    render_ages(frame, &stats, bottom[0]);
    render_locations(frame, app, bottom[1]);
}

fn bar(stats: &VoterStats, count: usize) -> String {
    let filled = if stats.total == 0 { 0 } else { count * BAR_WIDTH / stats.total };
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn bar_line(stats: &VoterStats, label: &str, count: usize, style: Style) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<11}", label), style),
        Span::styled(bar(stats, count), style),
        Span::styled(format!(" {:>5} ({:>3}%)", count, stats.percent(count)), styles::muted_style()),
    ])
}

fn render_totals(frame: &mut Frame, app: &App, stats: &VoterStats, area: Rect) {
    let scope = if app.filter.is_empty() {
        "All voters in your area".to_string()
    } else {
        app.filter_summary()
    };
    let genders = stats
        .by_gender
        .iter()
        .map(|(g, n)| format!("{} {}", g, n))
        .collect::<Vec<_>>()
        .join("  ");

    let lines = vec![
        Line::from(vec![
            Span::styled("Voters:    ", styles::muted_style()),
            Span::styled(stats.total.to_string(), styles::title_style()),
            Span::styled(format!("   {}", scope), styles::muted_style()),
        ]),
        Line::from(vec![
            Span::styled("Gender:    ", styles::muted_style()),
            Span::raw(genders),
        ]),
        Line::from(vec![
            Span::styled("Transport: ", styles::muted_style()),
            Span::raw(stats.needs_transport.to_string()),
            Span::styled("   Family abroad: ", styles::muted_style()),
            Span::raw(stats.family_abroad.to_string()),
        ]),
    ];

    let block = Block::default()
        .title(" Summary ")
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_breakdown(
    frame: &mut Frame,
    title: &str,
    stats: &VoterStats,
    order: &[&str],
    counts: &std::collections::BTreeMap<String, usize>,
    area: Rect,
    style: impl Fn(&str) -> Style,
) {
    let lines: Vec<Line> = order
        .iter()
        .map(|&value| bar_line(stats, value, counts.get(value).copied().unwrap_or(0), style(value)))
        .collect();

    let block = Block::default()
        .title(title.to_string())
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_ages(frame: &mut Frame, stats: &VoterStats, area: Rect) {
    let lines: Vec<Line> = stats
        .age_rows()
        .into_iter()
        .map(|(bracket, count)| bar_line(stats, bracket, count, styles::list_item_style()))
        .collect();

    let block = Block::default()
        .title(" Age ")
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_locations(frame: &mut Frame, app: &App, area: Rect) {
    let child_level = match app.filter.location.deepest() {
        Some(level) => level.child(),
        None => Some(LocationLevel::Division),
    };
    let title = match child_level {
        Some(level) => format!(" By {} ", level.label()),
        None => " By Location ".to_string(),
    };

    let breakdown = app.location_breakdown();
    let max_rows = area.height.saturating_sub(2) as usize;
    let total: usize = breakdown.iter().map(|r| r.count).sum();
    let mut lines: Vec<Line> = breakdown
        .iter()
        .take(max_rows)
        .map(|row| {
            let style = if row.count == 0 {
                styles::muted_style()
            } else {
                styles::list_item_style()
            };
            Line::from(vec![
                Span::styled(format!("{:<24}", voterbook_core::utils::truncate(&row.name, 24)), style),
                Span::styled(format!("{:>6}", row.count), style),
            ])
        })
        .collect();

    if lines.is_empty() {
        let msg = if app.hierarchy.is_none() {
            "Location data not loaded"
        } else {
            "No smaller areas below this filter"
        };
        lines.push(Line::from(Span::styled(msg, styles::muted_style())));
    } else if breakdown.len() > max_rows {
        if let Some(last) = lines.last_mut() {
            *last = Line::from(Span::styled(
                format!("... {} more, {} voters listed", breakdown.len() - max_rows + 1, total),
                styles::muted_style(),
            ));
        }
    }

    let block = Block::default()
        .title(title)
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}
