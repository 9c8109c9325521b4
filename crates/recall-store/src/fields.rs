// crates/recall-store/src/fields.rs
// Field paths: which parts of an item value get embedded
//
// Syntax:
//   $            whole value (canonical JSON)
//   a.b          nested keys
//   a[0] a[-1]   list index (negative counts from the end)
//   a[*] a[]     every list element
//   a.*          every object value (or list element)
//   {a,b.c}      several sub-paths of the current object (must be last)

use crate::error::{RecallError, Result};
use serde_json::Value;

/// Path that selects the whole value
pub const ROOT_PATH: &str = "$";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Key(String),
    Index(i64),
    EachItem,
    EachValue,
    Select(Vec<FieldPath>),
}

/// A parsed field path. Parsing is strict so bad configuration fails early.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPath {
    raw: String,
    tokens: Vec<Token>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == ROOT_PATH {
            return Ok(Self::root());
        }
        Ok(Self {
            raw: trimmed.to_string(),
            tokens: tokenize(trimmed)?,
        })
    }

    pub fn root() -> Self {
        Self {
            raw: ROOT_PATH.to_string(),
            tokens: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All text spans this path selects from `value`, in document order.
    pub fn extract_texts(&self, value: &Value) -> Vec<String> {
        if self.is_root() {
            return vec![value.to_string()];
        }
        let mut out = Vec::new();
        extract(value, &self.tokens, &mut out);
        out
    }

    /// `(entry_path, text)` pairs for indexing. A path that yields several
    /// texts gets a positional suffix per text (`tags[*].0`, `tags[*].1`).
    pub fn entries(&self, value: &Value) -> Vec<(String, String)> {
        let mut texts = self.extract_texts(value);
        if texts.len() == 1 {
            return texts
                .pop()
                .map(|text| vec![(self.raw.clone(), text)])
                .unwrap_or_default();
        }
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| (format!("{}.{}", self.raw, i), text))
            .collect()
    }
}

/// Parse every path in a field list.
pub fn parse_all<S: AsRef<str>>(fields: &[S]) -> Result<Vec<FieldPath>> {
    fields.iter().map(|f| FieldPath::parse(f.as_ref())).collect()
}

fn invalid(path: &str, reason: &str) -> RecallError {
    RecallError::InvalidInput(format!("invalid field path {path:?}: {reason}"))
}

fn tokenize(path: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '[' | '{' => {
                flush_key(&mut current, &mut tokens);
                let close = if ch == '[' { ']' } else { '}' };
                let mut depth = 1;
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ch {
                        depth += 1;
                    } else if c == close {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    inner.push(c);
                }
                if depth != 0 {
                    return Err(invalid(path, "unbalanced brackets"));
                }
                let token = if ch == '[' {
                    parse_index(path, &inner)?
                } else {
                    parse_select(path, &inner)?
                };
                tokens.push(token);
            }
            ']' | '}' => return Err(invalid(path, "unbalanced brackets")),
            '.' => flush_key(&mut current, &mut tokens),
            _ => current.push(ch),
        }
    }
    flush_key(&mut current, &mut tokens);

    if tokens.is_empty() {
        return Err(invalid(path, "empty path"));
    }
    if let Some(pos) = tokens.iter().position(|t| matches!(t, Token::Select(_)))
        && pos + 1 != tokens.len()
    {
        return Err(invalid(path, "field selection must be the last segment"));
    }
    Ok(tokens)
}

fn flush_key(current: &mut String, tokens: &mut Vec<Token>) {
    if current.is_empty() {
        return;
    }
    let key = std::mem::take(current);
    tokens.push(if key == "*" {
        Token::EachValue
    } else {
        Token::Key(key)
    });
}

fn parse_index(path: &str, inner: &str) -> Result<Token> {
    match inner.trim() {
        "" | "*" => Ok(Token::EachItem),
        n => n
            .parse::<i64>()
            .map(Token::Index)
            .map_err(|_| invalid(path, "list index must be an integer or *")),
    }
}

fn parse_select(path: &str, inner: &str) -> Result<Token> {
    let paths = inner
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(FieldPath::parse)
        .collect::<Result<Vec<_>>>()?;
    if paths.is_empty() {
        return Err(invalid(path, "empty field selection"));
    }
    Ok(Token::Select(paths))
}

fn extract(value: &Value, tokens: &[Token], out: &mut Vec<String>) {
    let Some((token, rest)) = tokens.split_first() else {
        push_terminal(value, out);
        return;
    };

    match token {
        Token::Key(key) => {
            if let Some(child) = value.as_object().and_then(|map| map.get(key)) {
                extract(child, rest, out);
            }
        }
        Token::Index(index) => {
            if let Some(items) = value.as_array() {
                let resolved = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                if let Ok(i) = usize::try_from(resolved)
                    && let Some(child) = items.get(i)
                {
                    extract(child, rest, out);
                }
            }
        }
        Token::EachItem => {
            if let Some(items) = value.as_array() {
                for item in items {
                    extract(item, rest, out);
                }
            }
        }
        Token::EachValue => match value {
            Value::Object(map) => {
                for child in map.values() {
                    extract(child, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    extract(item, rest, out);
                }
            }
            _ => {}
        },
        Token::Select(paths) => {
            if value.is_object() {
                for path in paths {
                    out.extend(path.extract_texts(value));
                }
            }
        }
    }
}

fn push_terminal(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        other => out.push(other.to_string()),
    }
}
