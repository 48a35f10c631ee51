//! Placeholder expansion for rule templates.
//!
//! `{0}` is the whole target name, `{1}`..`{n}` positional groups, `{name}`
//! named groups and `{deps}` the expanded dependency list. `{{` and `}}` are
//! literal braces.

use crate::error::{BuildError, BuildResult};
use crate::rule::RuleMatch;

pub fn expand(template: &str, matched: &RuleMatch, deps: Option<&[String]>) -> BuildResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(invalid(template, "unclosed `{`"));
                }
                out.push_str(&lookup(template, &key, matched, deps)?);
            }
            '}' => return Err(invalid(template, "unmatched `}`")),
            c => out.push(c),
        }
    }

    Ok(out)
}

fn lookup(
    template: &str,
    key: &str,
    matched: &RuleMatch,
    deps: Option<&[String]>,
) -> BuildResult<String> {
    if key == "deps" {
        return deps
            .map(|deps| deps.join(" "))
            .ok_or_else(|| invalid(template, "`{deps}` is only available in commands"));
    }

    let value = match key.parse::<usize>() {
        Ok(index) => matched.get(index),
        Err(_) => matched.named(key),
    };

    value
        .map(str::to_string)
        .ok_or_else(|| invalid(template, &format!("no capture group `{}`", key)))
}

fn invalid(template: &str, reason: &str) -> BuildError {
    BuildError::Template {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

/// Escapes `text` so it matches literally inside a rule pattern.
pub fn regex_escape(text: &str) -> String {
    regex::escape(text)
}
