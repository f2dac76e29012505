//! Field splitting for a single SIE line

use serde::{Deserialize, Serialize};

/// One field of a SIE record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    /// Bare or quoted text
    Text(String),
    /// Brace-delimited object list, e.g. `{1 "100" 6 "P1"}`
    List(Vec<String>),
}

impl Field {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            Field::List(_) => None,
        }
    }
}

/// Split a line into fields.
///
/// Fields are separated by spaces or tabs. `"..."` quotes a field and `\"`
/// escapes a quote inside it. `{...}` groups an object list.
pub fn tokenize(line: &str) -> Result<Vec<Field>, String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c == '{' {
            chars.next();
            let mut inner = String::new();
            let mut in_quote = false;
            let mut closed = false;
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' if in_quote => {
                        inner.push(ch);
                        if let Some(next) = chars.next() {
                            inner.push(next);
                        }
                    }
                    '"' => {
                        in_quote = !in_quote;
                        inner.push(ch);
                    }
                    '}' if !in_quote => {
                        closed = true;
                        break;
                    }
                    _ => inner.push(ch),
                }
            }
            if !closed {
                return Err("objektlista saknar avslutande '}'".to_string());
            }
            let items = tokenize(&inner)?
                .into_iter()
                .filter_map(|f| match f {
                    Field::Text(s) => Some(s),
                    Field::List(_) => None,
                })
                .collect();
            fields.push(Field::List(items));
        } else if c == '"' {
            chars.next();
            fields.push(Field::Text(read_quoted(&mut chars)?));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            fields.push(Field::Text(word));
        }
    }

    Ok(fields)
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<String, String> {
    let mut text = String::new();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next) => text.push(next),
                None => break,
            },
            '"' => return Ok(text),
            _ => text.push(ch),
        }
    }
    Err("citattecken saknar avslutning".to_string())
}

/// Quote a field for output when needed
pub fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '{' | '}' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
