/// Single-line text input with a byte-indexed cursor on char boundaries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InputState {
    pub input: String,
    pub cursor_position: usize,
}

impl InputState {
    /// Input prefilled with `text`, cursor at the end.
    pub fn with_text(text: &str) -> Self {
        Self {
            input: text.to_string(),
            cursor_position: text.len(),
        }
    }

    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    /// Delete the character before the cursor (backspace).
    pub fn delete_char(&mut self) {
        if let Some(prev_char) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev_char.len_utf8();
            self.input.remove(self.cursor_position);
        }
    }

    /// Delete the character under the cursor.
    pub fn delete_forward(&mut self) {
        if self.cursor_position < self.input.len() {
            self.input.remove(self.cursor_position);
        }
    }

    pub fn move_left(&mut self) {
        if let Some(prev_char) = self.input[..self.cursor_position].chars().next_back() {
            self.cursor_position -= prev_char.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Some(next_char) = self.input[self.cursor_position..].chars().next() {
            self.cursor_position += next_char.len_utf8();
        }
    }

    pub fn home(&mut self) {
        self.cursor_position = 0;
    }

    pub fn end(&mut self) {
        self.cursor_position = self.input.len();
    }

    /// The entered text with surrounding whitespace removed.
    pub fn value(&self) -> &str {
        self.input.trim()
    }
}
