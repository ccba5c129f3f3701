//! Text cleanup applied to raw oracle output before parsing
//!
//! Oracles wrap code in prose, markdown fences and the begin/end markers the
//! prompt asks for. Everything here is purely textual; nothing is parsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker the oracle is asked to place before the function
pub const BEGIN_MARKER: &str = "### BEGIN FUNCTION ###";

/// Marker the oracle is asked to place after the function
pub const END_MARKER: &str = "### END FUNCTION ###";

static FUNC_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"def\s+(\w+)").expect("function header pattern"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("non-word pattern"));

/// Full cleanup: delimiters, then `self`, then dedent
#[must_use]
pub fn clean(raw: &str) -> String {
    let stripped = strip_delimiters(raw);
    let without_self = remove_self_param(&stripped);
    let mut out = dedent(&without_self);
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Drop leading prose, fences, the begin marker and everything from the end
/// marker onward
///
/// The function header is the first line starting with `def` or `async def`;
/// decorator lines directly above it are kept so the shape check can see them.
#[must_use]
pub fn strip_delimiters(raw: &str) -> String {
    let body = raw.find(END_MARKER).map_or(raw, |idx| &raw[..idx]);

    let lines: Vec<&str> = body
        .lines()
        .filter(|line| {
            let t = line.trim();
            !t.starts_with("```") && t != BEGIN_MARKER
        })
        .collect();

    let Some(header) = lines.iter().position(|line| is_header(line)) else {
        return lines.join("\n");
    };
    let mut start = header;
    while start > 0 && lines[start - 1].trim_start().starts_with('@') {
        start -= 1;
    }
    lines[start..].join("\n")
}

fn is_header(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("def ") || t.starts_with("async def ")
}

/// Remove a leading `self` parameter from the first function header
#[must_use]
pub fn remove_self_param(source: &str) -> String {
    let Some(def_at) = source.find("def ") else {
        return source.to_string();
    };
    let Some(open) = source[def_at..].find('(').map(|i| def_at + i + 1) else {
        return source.to_string();
    };

    let rest = &source[open..];
    let after_ws = rest.trim_start();
    let Some(after_self) = after_ws.strip_prefix("self") else {
        return source.to_string();
    };
    if after_self
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        return source.to_string();
    }
    let after_self = after_self.trim_start();
    let tail = after_self.strip_prefix(',').unwrap_or(after_self).trim_start();

    let mut out = String::with_capacity(source.len());
    out.push_str(&source[..open]);
    out.push_str(tail);
    out
}

/// Remove the space/tab prefix shared by every non-blank line
///
/// Only ASCII spaces and tabs count as indentation, so the cut always lands
/// on a char boundary.
#[must_use]
pub fn dedent(source: &str) -> String {
    let indent = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(indent_width)
        .min()
        .unwrap_or(0);

    source
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[indent.min(line.len())..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_width(line: &str) -> usize {
    line.bytes().take_while(|b| matches!(b, b' ' | b'\t')).count()
}

/// Name of the first function defined in `source`
#[must_use]
pub fn extract_func_name(source: &str) -> Option<String> {
    FUNC_NAME
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Normalize free text into a valid function name
///
/// `"Hello World"` becomes `hello_world`, `"123abc"` becomes `_123abc`.
#[must_use]
pub fn to_func_name(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let spaced = NON_WORD.replace_all(&lowered, " ");
    let mut name = spaced.trim().replace(' ', "_");
    if name.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
