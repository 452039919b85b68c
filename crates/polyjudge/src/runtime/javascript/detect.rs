//! Entry-point detection
//!
//! Resolvers are tried in a fixed order and the first match wins:
//!
//! 1. the caller's hint
//! 2. a class named `Solution` (its first own method)
//! 3. the last top-level function defined in the source
//! 4. a list of conventional names

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

/// Name of the class conventionally holding the solution
pub const SOLUTION_CLASS: &str = "Solution";

/// Names tried when nothing else resolves, in order
pub const CONVENTIONAL_NAMES: &[&str] = &[
    "solve",
    "solution",
    "main",
    "run",
    "calculate",
    "compute",
    "twoSum",
    "addTwoNumbers",
    "lengthOfLongestSubstring",
    "isValid",
    "maxProfit",
    "maxSubArray",
    "climbStairs",
    "reverseList",
    "isPalindrome",
    "reverseString",
    "fizzBuzz",
    "fibonacci",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

static FUNCTION_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^|[;}])\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\(",
    )
    .expect("function declaration pattern is valid")
});

static FUNCTION_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(?:async\s+)?(?:function\b|\(|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)",
    )
    .expect("function binding pattern is valid")
});

/// What the evaluated program can answer about its own bindings
pub trait Scope {
    /// Whether `name` is bound to something callable
    fn is_function(&self, name: &str) -> bool;

    /// First own non-constructor method on `class`'s prototype
    fn first_method(&self, class: &str) -> Option<String>;

    /// Whether `class`'s prototype has a method called `method`
    fn has_method(&self, class: &str, method: &str) -> bool;
}

/// The callable a run invokes for every test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    Function(String),
    /// A method on a fresh instance of `class`, created per case
    Method { class: String, method: String },
}

impl EntryPoint {
    /// Target descriptor handed to the invocation script
    pub fn target(&self) -> Value {
        match self {
            EntryPoint::Function(name) => json!({ "name": name }),
            EntryPoint::Method { class, method } => json!({ "class": class, "method": method }),
        }
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryPoint::Function(name) => write!(f, "{name}"),
            EntryPoint::Method { class, method } => write!(f, "{class}.prototype.{method}"),
        }
    }
}

/// One strategy for picking the entry point
pub trait CallableResolver {
    fn resolve(&self, source: &str, scope: &dyn Scope) -> Option<EntryPoint>;
}

/// The name the caller asked for, as a function or a `Solution` method
pub struct HintResolver<'a>(pub Option<&'a str>);

impl CallableResolver for HintResolver<'_> {
    fn resolve(&self, _source: &str, scope: &dyn Scope) -> Option<EntryPoint> {
        let hint = self.0.map(str::trim).filter(|hint| is_identifier(hint))?;
        if scope.is_function(hint) {
            return Some(EntryPoint::Function(hint.to_string()));
        }
        if scope.is_function(SOLUTION_CLASS) && scope.has_method(SOLUTION_CLASS, hint) {
            return Some(EntryPoint::Method {
                class: SOLUTION_CLASS.to_string(),
                method: hint.to_string(),
            });
        }
        None
    }
}

pub struct SolutionClassResolver;

impl CallableResolver for SolutionClassResolver {
    fn resolve(&self, _source: &str, scope: &dyn Scope) -> Option<EntryPoint> {
        if !scope.is_function(SOLUTION_CLASS) {
            return None;
        }
        scope
            .first_method(SOLUTION_CLASS)
            .map(|method| EntryPoint::Method {
                class: SOLUTION_CLASS.to_string(),
                method,
            })
    }
}

/// The last top-level function the source defines
pub struct LastDefinedResolver;

impl CallableResolver for LastDefinedResolver {
    fn resolve(&self, source: &str, scope: &dyn Scope) -> Option<EntryPoint> {
        top_level_functions(source)
            .into_iter()
            .rev()
            .find(|name| scope.is_function(name))
            .map(EntryPoint::Function)
    }
}

pub struct ConventionalNameResolver;

impl CallableResolver for ConventionalNameResolver {
    fn resolve(&self, _source: &str, scope: &dyn Scope) -> Option<EntryPoint> {
        CONVENTIONAL_NAMES
            .iter()
            .find(|name| scope.is_function(name))
            .map(|name| EntryPoint::Function((*name).to_string()))
    }
}

/// Run every resolver in priority order
pub fn detect(source: &str, hint: Option<&str>, scope: &dyn Scope) -> Option<EntryPoint> {
    let resolvers: [&dyn CallableResolver; 4] = [
        &HintResolver(hint),
        &SolutionClassResolver,
        &LastDefinedResolver,
        &ConventionalNameResolver,
    ];
    resolvers
        .iter()
        .find_map(|resolver| resolver.resolve(source, scope))
}

fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Names of top-level function declarations and function-valued bindings,
/// in source order
pub fn top_level_functions(source: &str) -> Vec<String> {
    let masked = mask_nested(source);
    let mut found: Vec<(usize, String)> = FUNCTION_DECLARATION
        .captures_iter(&masked)
        .chain(FUNCTION_BINDING.captures_iter(&masked))
        .filter_map(|caps| {
            let name = caps.get(1)?;
            Some((name.start(), name.as_str().to_string()))
        })
        .collect();
    found.sort_by_key(|(offset, _)| *offset);
    found.into_iter().map(|(_, name)| name).collect()
}

/// Keywords after which a `/` starts a regex literal
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Blank out everything that isn't top-level code
///
/// Strings, regex literals, comments and the bodies of braces are replaced
/// by spaces so only depth-0 declarations remain visible. Newlines are kept.
fn mask_nested(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quote(char),
        Regex { in_class: bool },
        LineComment,
        BlockComment,
    }

    let mut masked = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut depth: usize = 0;
    let mut escaped = false;
    // Last significant code character and the identifier it ends, if any
    let mut last: Option<char> = None;
    let mut word = String::new();
    let mut chars = source.chars().peekable();

    let blank = |ch: char| if ch == '\n' { '\n' } else { ' ' };

    while let Some(ch) = chars.next() {
        match state {
            State::Code => {
                match ch {
                    '/' if chars.peek() == Some(&'/') => {
                        state = State::LineComment;
                        masked.push(' ');
                        continue;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = State::BlockComment;
                        masked.push_str("  ");
                        continue;
                    }
                    '/' if regex_allowed(last, &word) => {
                        state = State::Regex { in_class: false };
                        masked.push(' ');
                        continue;
                    }
                    '"' | '\'' | '`' => {
                        state = State::Quote(ch);
                        masked.push(' ');
                        continue;
                    }
                    '{' => {
                        masked.push(if depth == 0 { '{' } else { ' ' });
                        depth += 1;
                    }
                    '}' => {
                        depth = depth.saturating_sub(1);
                        masked.push(if depth == 0 { '}' } else { ' ' });
                    }
                    _ if depth == 0 => masked.push(ch),
                    _ => masked.push(blank(ch)),
                }

                if ch.is_whitespace() {
                    continue;
                }
                if is_identifier_char(ch) {
                    if !last.is_some_and(is_identifier_char) {
                        word.clear();
                    }
                    word.push(ch);
                } else {
                    word.clear();
                }
                last = Some(ch);
            }
            State::Quote(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    state = State::Code;
                    last = Some(q);
                    word.clear();
                }
                masked.push(blank(ch));
            }
            State::Regex { in_class } => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '\n' {
                    state = State::Code;
                } else if in_class {
                    if ch == ']' {
                        state = State::Regex { in_class: false };
                    }
                } else if ch == '[' {
                    state = State::Regex { in_class: true };
                } else if ch == '/' {
                    state = State::Code;
                    last = Some(')');
                    word.clear();
                }
                masked.push(blank(ch));
            }
            State::LineComment => {
                if ch == '\n' {
                    state = State::Code;
                }
                masked.push(blank(ch));
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    masked.push_str("  ");
                } else {
                    masked.push(blank(ch));
                }
            }
        }
    }

    masked
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Whether a `/` following `last` begins a regex rather than a division
fn regex_allowed(last: Option<char>, word: &str) -> bool {
    match last {
        None => true,
        Some(ch) if is_identifier_char(ch) => REGEX_PREFIX_KEYWORDS.contains(&word),
        Some(ch) => matches!(
            ch,
            '=' | '(' | ',' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | '}' | ';' | '+' | '-'
                | '*' | '%' | '<' | '>' | '~' | '^'
        ),
    }
}
