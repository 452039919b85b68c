//! Test-case input normalization
//!
//! Test inputs are written loosely, e.g. `nums = [2,7,11,15], target = 9`.
//! Runtimes that call a function want that as an argument list
//! (`[[2,7,11,15], 9]`); runtimes that feed a program's stdin want a line
//! stream (`4\n2 7 11 15\n9`). Both forms share the same tokenizer.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static ASSIGNMENT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[A-Za-z_$][A-Za-z0-9_$]*\s*=").expect("assignment prefix pattern is valid")
});

/// Convert an input into call arguments
///
/// The whole input is first parsed as a JSON array. If that fails (bare
/// words, single quotes), each top-level token is parsed on its own and
/// kept as a raw string when it isn't JSON either.
pub fn to_arguments(input: &str) -> Vec<Value> {
    let tokens = tokens(input);
    if tokens.is_empty() {
        return Vec::new();
    }

    let wrapped = format!("[{}]", tokens.join(","));
    if let Ok(args) = serde_json::from_str::<Vec<Value>>(&wrapped) {
        return args;
    }

    tokens
        .into_iter()
        .map(|token| serde_json::from_str(token).unwrap_or_else(|_| Value::String(token.to_string())))
        .collect()
}

/// Convert an input into a stdin stream for count-then-values programs
///
/// A list token becomes two lines, its length and then its space-joined
/// elements (the second line is omitted for an empty list). Every other
/// token becomes its own line. JSON strings lose their quotes.
pub fn to_stream(input: &str) -> String {
    let mut lines = Vec::new();

    for token in tokens(input) {
        match serde_json::from_str::<Value>(token) {
            Ok(Value::Array(items)) => {
                push_list(&mut lines, items.iter().map(render_element).collect());
            }
            Ok(Value::String(s)) => lines.push(s),
            Ok(_) => lines.push(token.to_string()),
            Err(_) if token.starts_with('[') && token.ends_with(']') => {
                let interior = &token[1..token.len() - 1];
                let items = split_top_level(interior)
                    .into_iter()
                    .map(|item| unquote(item).to_string())
                    .collect();
                push_list(&mut lines, items);
            }
            Err(_) => lines.push(token.to_string()),
        }
    }

    lines.join("\n")
}

fn push_list(lines: &mut Vec<String>, items: Vec<String>) {
    lines.push(items.len().to_string());
    if !items.is_empty() {
        lines.push(items.join(" "));
    }
}

fn render_element(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// Top-level tokens with any `name =` prefix removed
fn tokens(input: &str) -> Vec<&str> {
    split_top_level(input)
        .into_iter()
        .map(strip_assignment)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Remove a leading `identifier =` (but not `identifier ==`)
pub fn strip_assignment(token: &str) -> &str {
    if let Some(m) = ASSIGNMENT_PREFIX.find(token)
        && !token[m.end()..].starts_with('=')
    {
        return token[m.end()..].trim();
    }
    token.trim()
}

/// Split on commas and newlines that sit outside brackets and quotes
///
/// Tokens are trimmed; empty tokens are dropped.
pub fn split_top_level(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            ',' | '\n' if depth == 0 => {
                tokens.push(&input[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    tokens.push(&input[start..]);

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}
