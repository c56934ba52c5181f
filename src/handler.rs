use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::app::{App, AppMode};

/// Handle a key event.
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }
    match app.mode {
        AppMode::Editing(_) => handle_input_key(app, key),
        AppMode::Normal => handle_normal_key(app, key),
    }
}

fn handle_normal_key(app: &mut App, key: KeyEvent) {
    if let KeyCode::Char(c) = key.code {
        if app.menu_key(c) {
            return;
        }
    }
    match key.code {
        KeyCode::Char('q') => app.quit(),
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
        KeyCode::Char('g') | KeyCode::Home => app.select_first(),
        KeyCode::Char('G') | KeyCode::End => app.select_last(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => app.activate_selected(),
        KeyCode::Char('h') | KeyCode::Left => app.collapse_selected(),
        KeyCode::Char('m') => app.open_menu(),
        KeyCode::Esc => {
            app.close_menu();
        }
        _ => {}
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.commit_input(),
        KeyCode::Esc => app.cancel_input(),
        KeyCode::Backspace => app.edit_input(|i| i.delete_char()),
        KeyCode::Delete => app.edit_input(|i| i.delete_forward()),
        KeyCode::Left => app.edit_input(|i| i.move_left()),
        KeyCode::Right => app.edit_input(|i| i.move_right()),
        KeyCode::Home => app.edit_input(|i| i.home()),
        KeyCode::End => app.edit_input(|i| i.end()),
        KeyCode::Char(c) => app.edit_input(|i| i.insert_char(c)),
        _ => {}
    }
}

/// Handle a mouse event: left click selects (and activates on a second
/// click), right click opens the context menu.
pub fn handle_mouse_event(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::Down(button) => {
            let Some(index) = app.row_at(mouse.column, mouse.row) else {
                return;
            };
            if matches!(app.mode, AppMode::Editing(_)) {
                return;
            }
            match button {
                MouseButton::Left if index == app.selected_index => app.activate_selected(),
                MouseButton::Left => app.select(index),
                MouseButton::Right => {
                    app.select(index);
                    app.open_menu();
                }
                MouseButton::Middle => {}
            }
        }
        MouseEventKind::ScrollDown => app.select_next(),
        MouseEventKind::ScrollUp => app.select_previous(),
        _ => {}
    }
}
