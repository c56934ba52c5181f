use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Widget},
};

use crate::tree::{FileMode, Node, Row, RowKind, Tree};
use crate::theme::ThemeColors;

/// Columns taken by the guides and marker in front of an inline row's text.
pub fn inline_text_offset(depth: usize) -> u16 {
    (depth.saturating_sub(1) * 3 + 4) as u16
}

/// Glyph shown for a file, chosen by extension. Total: unknown extensions
/// get the generic file glyph.
pub fn file_icon(name: &str, use_icons: bool) -> &'static str {
    if !use_icons {
        return "[F] ";
    }
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    };
    match ext.as_str() {
        "php" | "module" | "inc" => "\u{e73d} ",
        "js" | "mjs" => "\u{e74e} ",
        "txt" => "\u{f15c} ",
        "html" => "\u{e736} ",
        "json" => "\u{e60b} ",
        "md" => "\u{e73e} ",
        "sh" => "\u{f489} ",
        "css" => "\u{e749} ",
        "xml" => "\u{e619} ",
        "yml" | "yaml" => "\u{f481} ",
        "zip" => "\u{f410} ",
        _ => "\u{f15b} ",
    }
}

fn folder_icon(expanded: bool, use_icons: bool) -> &'static str {
    match (use_icons, expanded) {
        (true, true) => "\u{f07c} ",
        (true, false) => "\u{f07b} ",
        (false, true) => "[-] ",
        (false, false) => "[+] ",
    }
}

/// Tree widget that renders the flattened rows with box-drawing guides,
/// plus the context-menu and inline-input rows of their owners.
pub struct TreeWidget<'a> {
    tree: &'a Tree,
    rows: &'a [Row],
    selected: usize,
    scroll: usize,
    theme: &'a ThemeColors,
    use_icons: bool,
    block: Option<Block<'a>>,
}

impl<'a> TreeWidget<'a> {
    pub fn new(tree: &'a Tree, rows: &'a [Row], theme: &'a ThemeColors, use_icons: bool) -> Self {
        Self {
            tree,
            rows,
            selected: 0,
            scroll: 0,
            theme,
            use_icons,
            block: None,
        }
    }

    pub fn selected(mut self, selected: usize, scroll: usize) -> Self {
        self.selected = selected;
        self.scroll = scroll;
        self
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = block.into();
        self
    }

    /// Continuation guides for every ancestor level of `row`.
    ///
    /// Walks backwards to the node row at each depth; inline rows are
    /// skipped since they never own siblings.
    fn guides(rows: &[Row], index: usize, levels: usize) -> String {
        let mut prefix = String::new();
        for d in 1..=levels {
            let mut ancestor_is_last = false;
            for row in rows[..index].iter().rev() {
                if !is_node_row(row) {
                    continue;
                }
                if row.depth == d {
                    ancestor_is_last = row.is_last_sibling;
                    break;
                }
                if row.depth < d {
                    break;
                }
            }
            prefix.push_str(if ancestor_is_last { "   " } else { "│  " });
        }
        prefix
    }

    fn prefix(rows: &[Row], index: usize) -> String {
        let row = &rows[index];
        if is_node_row(row) {
            if row.depth == 0 {
                return String::new();
            }
            let mut prefix = Self::guides(rows, index, row.depth - 1);
            prefix.push_str(if row.is_last_sibling { "└──" } else { "├──" });
            prefix
        } else {
            let mut prefix = Self::guides(rows, index, row.depth.saturating_sub(1));
            prefix.push_str("  ");
            prefix
        }
    }

    fn row_spans(&self, row: &Row, is_selected: bool) -> Vec<Span<'static>> {
        let theme = self.theme;
        let base = if is_selected {
            Style::default()
                .bg(theme.tree_selected_bg)
                .fg(theme.tree_selected_fg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        match &row.kind {
            RowKind::Folder { expanded } => {
                let folder = self.tree.folder(row.node);
                let mut spans = vec![Span::styled(
                    format!("{}{}", folder_icon(*expanded, self.use_icons), row.name),
                    base.fg(if is_selected {
                        theme.tree_selected_fg
                    } else {
                        theme.tree_dir_fg
                    })
                    .add_modifier(Modifier::BOLD),
                )];
                if folder.is_some_and(|f| f.is_loading()) {
                    spans.push(Span::styled(" …", Style::default().fg(theme.dim_fg)));
                }
                if let Some(err) = folder.and_then(|f| f.last_error.as_ref()) {
                    spans.push(Span::styled(
                        format!("  ⚠ {}", err.kind),
                        Style::default().fg(theme.error_fg),
                    ));
                }
                spans
            }
            RowKind::File => {
                let renaming = self
                    .tree
                    .file(row.node)
                    .is_some_and(|f| f.mode() == FileMode::RenameOpen);
                let style = match (is_selected, renaming) {
                    (true, _) => base,
                    (false, true) => base.fg(theme.dim_fg),
                    (false, false) => base.fg(theme.tree_file_fg),
                };
                let mut spans = vec![Span::styled(
                    format!("{}{}", file_icon(&row.name, self.use_icons), row.name),
                    style,
                )];
                if self.tree.file(row.node).is_some_and(|f| f.is_deleting()) {
                    spans.push(Span::styled(" …", Style::default().fg(theme.dim_fg)));
                }
                spans
            }
            RowKind::Menu(action) => {
                let style = if is_selected {
                    base
                } else {
                    Style::default().fg(theme.menu_fg)
                };
                vec![
                    Span::styled(format!("▸ {}", action.label()), style),
                    Span::styled(
                        format!("  [{}]", action.key()),
                        Style::default().fg(theme.dim_fg),
                    ),
                ]
            }
            RowKind::Input => {
                let input = self.tree.node(row.node).and_then(Node::input);
                let text = input.map(|i| i.text.input.clone()).unwrap_or_default();
                let mut spans = vec![
                    Span::styled("› ", Style::default().fg(theme.accent_fg)),
                    Span::styled(
                        text,
                        Style::default()
                            .fg(theme.input_fg)
                            .add_modifier(Modifier::UNDERLINED),
                    ),
                ];
                match input {
                    Some(i) if i.is_pending() => {
                        spans.push(Span::styled(" …", Style::default().fg(theme.dim_fg)));
                    }
                    Some(i) => {
                        if let Some(err) = &i.error {
                            spans.push(Span::styled(
                                format!("  ✗ {err}"),
                                Style::default().fg(theme.error_fg),
                            ));
                        }
                    }
                    None => {}
                }
                spans
            }
        }
    }
}

fn is_node_row(row: &Row) -> bool {
    matches!(row.kind, RowKind::Folder { .. } | RowKind::File)
}

impl<'a> Widget for TreeWidget<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner_area = if let Some(block) = &self.block {
            let inner = block.inner(area);
            block.clone().render(area, buf);
            inner
        } else {
            area
        };

        let visible_height = inner_area.height as usize;
        if self.rows.is_empty() || visible_height == 0 {
            return;
        }

        let guide_style = Style::default().fg(self.theme.tree_guide_fg);
        let visible = self
            .rows
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(visible_height);

        for (i, (idx, row)) in visible.enumerate() {
            let y = inner_area.y + i as u16;
            let mut spans = vec![Span::styled(Self::prefix(self.rows, idx), guide_style)];
            spans.extend(self.row_spans(row, idx == self.selected));
            buf.set_line(inner_area.x, y, &Line::from(spans), inner_area.width);
        }
    }
}
