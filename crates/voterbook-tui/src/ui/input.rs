//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use voterbook_core::models::{VoterField, VoterSortColumn};

use crate::app::{
    can_add_email_char, can_add_password_char, App, AppState, Focus, LoginFocus, Tab, FILTER_ROWS,
    PAGE_SCROLL_SIZE,
};

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.state {
        AppState::LoggingIn => return handle_login_input(app, key).await,
        AppState::Searching => return handle_search_input(app, key),
        AppState::Filtering => return handle_filter_input(app, key).await,
        AppState::EditingVoter => return handle_form_input(app, key).await,
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.state = AppState::Normal;
            }
            return Ok(false);
        }
        AppState::ConfirmingDelete => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    app.state = AppState::Normal;
                    app.delete_pending().await;
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.pending_delete = None;
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            return Ok(false);
        }
        AppState::ConfirmingQuit => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    app.state = AppState::Quitting;
                    return Ok(true);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            return Ok(false);
        }
        AppState::Normal | AppState::Quitting => {}
    }

    // Global keys
    match key.code {
        KeyCode::Char('q') => {
            app.state = AppState::ConfirmingQuit;
        }
        KeyCode::Char('?') => {
            app.state = AppState::ShowingHelp;
        }
        KeyCode::Char('1') => {
            app.current_tab = Tab::Voters;
            app.focus = Focus::List;
        }
        KeyCode::Char('2') => {
            app.current_tab = Tab::Dashboard;
            app.focus = Focus::List;
        }
        KeyCode::Char('3') => {
            app.current_tab = Tab::Users;
            app.focus = Focus::List;
        }
        KeyCode::Left => {
            app.current_tab = app.current_tab.prev();
            app.focus = Focus::List;
        }
        KeyCode::Right => {
            app.current_tab = app.current_tab.next();
            app.focus = Focus::List;
        }
        KeyCode::Char('u') => {
            app.refresh_all_background().await;
        }
        KeyCode::Char('o') => {
            app.toggle_offline().await;
        }
        KeyCode::Char('f') => {
            app.open_filter();
        }
        KeyCode::Char('c') => {
            if !app.filter.is_empty() {
                app.clear_filter().await;
            }
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::List => Focus::Detail,
                Focus::Detail => Focus::List,
            };
        }
        KeyCode::Esc => {
            app.search_query.clear();
            app.status_message = None;
            app.focus = Focus::List;
        }
        _ => match app.current_tab {
            Tab::Voters => handle_voters_input(app, key).await,
            Tab::Users => handle_users_input(app, key).await,
            Tab::Dashboard => {}
        },
    }

    Ok(false)
}

/// Shared up/down/page navigation over a list of `len` items.
fn navigate(selection: &mut usize, len: usize, key: KeyEvent) -> bool {
    let max_index = len.saturating_sub(1);
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => *selection = selection.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => *selection = (*selection + 1).min(max_index),
        KeyCode::PageUp => *selection = selection.saturating_sub(PAGE_SCROLL_SIZE),
        KeyCode::PageDown => *selection = (*selection + PAGE_SCROLL_SIZE).min(max_index),
        KeyCode::Home => *selection = 0,
        KeyCode::End => *selection = max_index,
        _ => return false,
    }
    true
}

async fn handle_voters_input(app: &mut App, key: KeyEvent) {
    let len = app.visible_voters().len();
    if navigate(&mut app.voter_selection, len, key) {
        return;
    }

    match key.code {
        KeyCode::Char('/') => {
            app.state = AppState::Searching;
            app.search_query.clear();
            app.voter_selection = 0;
        }
        KeyCode::Char('n') => app.toggle_voter_sort(VoterSortColumn::Name),
        KeyCode::Char('a') => app.toggle_voter_sort(VoterSortColumn::Age),
        KeyCode::Char('i') => app.toggle_voter_sort(VoterSortColumn::Intent),
        KeyCode::Char('p') => app.toggle_voter_sort(VoterSortColumn::Priority),
        KeyCode::Char('l') => app.toggle_voter_sort(VoterSortColumn::Location),
        KeyCode::Char('I') => app.cycle_selected(VoterField::VotingIntent).await,
        KeyCode::Char('P') => app.cycle_selected(VoterField::PriorityLevel).await,
        KeyCode::Char('+') => app.open_form(),
        KeyCode::Char('x') | KeyCode::Delete => app.confirm_delete_voter(),
        KeyCode::Char('E') => app.export_visible(),
        _ => {}
    }
}

async fn handle_users_input(app: &mut App, key: KeyEvent) {
    let len = app.users.len();
    if navigate(&mut app.user_selection, len, key) {
        return;
    }

    match key.code {
        KeyCode::Char('a') => app.approve_selected_user().await,
        KeyCode::Char('x') | KeyCode::Delete => app.confirm_delete_user(),
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::Normal;
            app.search_query.clear();
        }
        KeyCode::Enter => {
            app.state = AppState::Normal;
            // Keep search query active
        }
        KeyCode::Backspace => {
            app.search_query.pop();
        }
        KeyCode::Char(c) => {
            app.search_query.push(c);
            // Reset selection when search changes
            app.voter_selection = 0;
        }
        _ => {}
    }
    Ok(false)
}

async fn handle_filter_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            app.filter_draft = None;
            app.state = AppState::Normal;
        }
        KeyCode::Enter => app.apply_filter().await,
        KeyCode::Up | KeyCode::BackTab => {
            if let Some(ref mut draft) = app.filter_draft {
                draft.row = draft.row.saturating_sub(1);
            }
        }
        KeyCode::Down | KeyCode::Tab => {
            if let Some(ref mut draft) = app.filter_draft {
                draft.row = (draft.row + 1).min(FILTER_ROWS.len() - 1);
            }
        }
        KeyCode::Left => app.cycle_filter_row(false),
        KeyCode::Right | KeyCode::Char(' ') => app.cycle_filter_row(true),
        KeyCode::Backspace | KeyCode::Delete => app.clear_filter_row(),
        _ => {}
    }
    Ok(false)
}

async fn handle_form_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('s') {
        app.submit_form().await;
        return Ok(false);
    }

    match key.code {
        KeyCode::Esc => {
            app.form_draft = None;
            app.state = AppState::Normal;
        }
        KeyCode::Up | KeyCode::BackTab => app.move_form_row(-1),
        KeyCode::Down | KeyCode::Tab | KeyCode::Enter => app.move_form_row(1),
        KeyCode::Left => app.form_cycle_location(false),
        KeyCode::Right => app.form_cycle_location(true),
        KeyCode::Backspace => app.form_backspace(),
        KeyCode::Char(c) => app.form_input(c),
        _ => {}
    }
    Ok(false)
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            // Quit if on login screen
            app.state = AppState::Quitting;
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Email => LoginFocus::Password,
                LoginFocus::Password => LoginFocus::Button,
                LoginFocus::Button => LoginFocus::Email,
            };
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = match app.login_focus {
                LoginFocus::Email => LoginFocus::Button,
                LoginFocus::Password => LoginFocus::Email,
                LoginFocus::Button => LoginFocus::Password,
            };
        }
        KeyCode::Enter => match app.login_focus {
            LoginFocus::Email => app.login_focus = LoginFocus::Password,
            LoginFocus::Password | LoginFocus::Button => {
                // On failure login_error is set and the overlay stays up
                let _ = app.attempt_login().await;
                if app.state == AppState::Normal {
                    // The cache key exists now, so sealed data can be read
                    app.load_from_cache();
                    app.refresh_all_background().await;
                }
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginFocus::Email => {
                app.login_email.pop();
            }
            LoginFocus::Password => {
                app.login_password.pop();
            }
            LoginFocus::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginFocus::Email => {
                if can_add_email_char(app.login_email.chars().count(), c) {
                    app.login_email.push(c);
                }
            }
            LoginFocus::Password => {
                if can_add_password_char(app.login_password.chars().count(), c) {
                    app.login_password.push(c);
                }
            }
            LoginFocus::Button => {}
        },
        _ => {}
    }
    Ok(false)
}
