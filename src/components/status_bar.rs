use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};

use crate::theme::ThemeColors;

const KEY_HINTS: &str = " ⏎:open  m:menu  h:up  q:quit ";

/// Bottom line: selected path, last opened file and key hints, or a
/// transient status message that replaces them.
pub struct StatusBarWidget<'a> {
    path_str: &'a str,
    theme: &'a ThemeColors,
    opened: Option<&'a str>,
    status_message: Option<&'a str>,
    is_error: bool,
}

impl<'a> StatusBarWidget<'a> {
    pub fn new(path_str: &'a str, theme: &'a ThemeColors) -> Self {
        Self {
            path_str,
            theme,
            opened: None,
            status_message: None,
            is_error: false,
        }
    }

    pub fn status_message(mut self, msg: &'a str, is_error: bool) -> Self {
        self.status_message = Some(msg);
        self.is_error = is_error;
        self
    }

    pub fn opened(mut self, path: &'a str) -> Self {
        self.opened = Some(path);
        self
    }
}

/// Keep the last `budget` characters, marking the cut with `...`.
fn truncate_left(text: &str, budget: usize) -> String {
    let len = text.chars().count();
    if len <= budget {
        return text.to_string();
    }
    if budget <= 3 {
        return text.chars().take(budget).collect();
    }
    let tail: String = text.chars().skip(len - (budget - 3)).collect();
    format!("...{tail}")
}

impl<'a> Widget for StatusBarWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let width = area.width as usize;

        if let Some(msg) = self.status_message {
            let style = if self.is_error {
                Style::default()
                    .bg(self.theme.error_fg)
                    .fg(self.theme.status_fg)
            } else {
                Style::default().fg(self.theme.success_fg)
            };
            let display: String = msg.chars().take(width).collect();
            let pad = width.saturating_sub(display.chars().count());
            let line = Line::from(Span::styled(format!("{display}{}", " ".repeat(pad)), style));
            buf.set_line(area.x, area.y, &line, area.width);
            return;
        }

        let hints_len = KEY_HINTS.chars().count();
        let remaining = width.saturating_sub(hints_len);

        let opened = self
            .opened
            .map(|p| format!("opened {p}"))
            .unwrap_or_default();
        let opened_len = opened.chars().count();
        let path_budget = remaining.saturating_sub(opened_len).saturating_sub(1);
        let path_display = truncate_left(self.path_str, path_budget);
        let opened_display = truncate_left(
            &opened,
            remaining.saturating_sub(path_display.chars().count()),
        );
        let gap = remaining
            .saturating_sub(path_display.chars().count())
            .saturating_sub(opened_display.chars().count());

        let spans = vec![
            Span::styled(path_display, Style::default().fg(self.theme.status_fg)),
            Span::raw(" ".repeat(gap)),
            Span::styled(opened_display, Style::default().fg(self.theme.accent_fg)),
            Span::styled(
                KEY_HINTS,
                Style::default()
                    .fg(self.theme.dim_fg)
                    .add_modifier(Modifier::DIM),
            ),
        ];
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);
    }
}
