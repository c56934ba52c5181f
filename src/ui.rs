use ratatui::{
    layout::{Constraint, Direction, Layout, Position},
    style::Style,
    widgets::{Block, Borders},
    Frame,
};

use crate::app::{App, AppMode};
use crate::components::status_bar::StatusBarWidget;
use crate::components::tree::{inline_text_offset, TreeWidget};
use crate::theme::ThemeColors;
use crate::tree::{Node, RowKind};

/// Render the application UI.
pub fn render(app: &mut App, theme: &ThemeColors, frame: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(frame.area());
    let (tree_area, status_area) = (chunks[0], chunks[1]);

    let block = Block::default()
        .title(" remote:/ ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_fg))
        .style(Style::default().bg(theme.tree_bg).fg(theme.tree_fg));
    let inner = block.inner(tree_area);
    app.tree_area = inner;
    app.update_scroll(inner.height as usize);

    let tree_widget = TreeWidget::new(&app.tree, &app.rows, theme, app.use_icons)
        .selected(app.selected_index, app.scroll_offset)
        .block(block);
    frame.render_widget(tree_widget, tree_area);

    if let AppMode::Editing(node) = app.mode {
        place_input_cursor(app, node, frame);
    }

    let path = app.selected_row().map(|r| r.path.as_str()).unwrap_or("/");
    let mut status = StatusBarWidget::new(path, theme);
    if let Some(opened) = app.last_opened.as_deref() {
        status = status.opened(opened);
    }
    if let Some(msg) = &app.status_message {
        status = status.status_message(&msg.text, msg.is_error);
    }
    frame.render_widget(status, status_area);
}

/// Put the terminal cursor inside the inline input being edited.
fn place_input_cursor(app: &App, node: u64, frame: &mut Frame) {
    let Some(index) = app
        .rows
        .iter()
        .position(|r| r.node == node && r.kind == RowKind::Input)
    else {
        return;
    };
    let area = app.tree_area;
    if index < app.scroll_offset || index >= app.scroll_offset + area.height as usize {
        return;
    }
    let Some(input) = app.tree.node(node).and_then(Node::input) else {
        return;
    };
    let typed = input.text.input[..input.text.cursor_position].chars().count() as u16;
    let x = area.x + inline_text_offset(app.rows[index].depth) + typed;
    let y = area.y + (index - app.scroll_offset) as u16;
    if x < area.x + area.width {
        frame.set_cursor_position(Position::new(x, y));
    }
}
