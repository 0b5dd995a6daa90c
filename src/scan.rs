//! Cursor over a text block with scanf-like line matching.
//!
//! Sysfs status attributes are written by the kernel with fixed `printf`
//! formats, so they are read back with the mirror image of those formats.
//! A format may contain:
//!
//! * `%s` - a run of non-whitespace characters (leading whitespace skipped)
//! * `%u` - unsigned decimal digits (leading whitespace skipped)
//! * `%x` - hexadecimal digits (leading whitespace skipped)
//! * whitespace - any run of whitespace in the input, including none
//! * anything else - matched literally
//!
//! A scan either matches the whole format and advances the cursor, or
//! matches nothing and leaves the cursor where it was.

/// Saved cursor position, see [`Scanner::mark`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mark(usize);

#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn mark(&self) -> Mark {
        Mark(self.pos)
    }

    pub fn reset(&mut self, mark: Mark) {
        self.pos = mark.0;
    }

    /// Remaining unread text.
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Moves the cursor past the end of the current line.
    pub fn skip_line(&mut self) {
        self.pos = match self.text[self.pos..].find('\n') {
            Some(at) => self.pos + at + 1,
            None => self.text.len(),
        };
    }

    /// Matches `format` at the cursor and returns the converted fields.
    pub fn scan(&mut self, format: &str) -> Option<Vec<&'a str>> {
        let input = self.text.as_bytes();
        let fmt = format.as_bytes();
        let mut pos = self.pos;
        let mut fields = Vec::new();
        let mut i = 0;

        while i < fmt.len() {
            let c = fmt[i];
            if c.is_ascii_whitespace() {
                pos = skip_whitespace(input, pos);
                i += 1;
            } else if c == b'%' && i + 1 < fmt.len() && fmt[i + 1] != b'%' {
                pos = skip_whitespace(input, pos);
                let start = pos;
                let accept: fn(u8) -> bool = match fmt[i + 1] {
                    b's' => |b| !b.is_ascii_whitespace(),
                    b'u' => |b| b.is_ascii_digit(),
                    b'x' => |b| b.is_ascii_hexdigit(),
                    _ => return None,
                };
                while pos < input.len() && accept(input[pos]) {
                    pos += 1;
                }
                if pos == start {
                    return None;
                }
                fields.push(&self.text[start..pos]);
                i += 2;
            } else {
                let literal = if c == b'%' { i += 1; b'%' } else { c };
                if input.get(pos) != Some(&literal) {
                    return None;
                }
                pos += 1;
                i += 1;
            }
        }

        self.pos = pos;
        Some(fields)
    }

    /// Like [`scan`](Self::scan), restoring the cursor on mismatch. The cursor
    /// never moves on a mismatch anyway; this spells out that the field is
    /// optional at the call site.
    pub fn scan_optional(&mut self, format: &str) -> Option<Vec<&'a str>> {
        let mark = self.mark();
        let fields = self.scan(format);
        if fields.is_none() {
            self.reset(mark);
        }
        fields
    }
}

fn skip_whitespace(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && input[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Finds `label` in `text` where it starts a field: at the start of the text
/// or after whitespace or a comma. Returns the text that follows the label.
pub fn after_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(found) = text[from..].find(label) {
        let at = from + found;
        let boundary = text[..at]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == ',');
        if boundary {
            return Some(&text[at + label.len()..]);
        }
        from = at + label.len();
    }
    None
}

/// First whitespace-delimited token after `label`, without a trailing comma.
pub fn token_after<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let rest = after_label(text, label)?;
    let token = rest.split_whitespace().next()?;
    Some(token.trim_end_matches(','))
}

/// Parses an unsigned decimal field, yielding zero for anything malformed.
pub fn parse_u32(field: &str) -> u32 {
    field.parse().unwrap_or_default()
}

pub fn parse_u64(field: &str) -> u64 {
    field.parse().unwrap_or_default()
}

/// Parses a hexadecimal field with or without a `0x` prefix.
pub fn parse_hex(field: &str) -> u32 {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(digits, 16).unwrap_or_default()
}
