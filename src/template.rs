//! Output-key templates.
//!
//! A template is plain text with placeholders that pull capture groups out of
//! a pattern match:
//!
//! - `$1`, `${1}` insert a group by position (`$0` is the whole match)
//! - `$host`, `${host}` insert a named group
//! - `$$` inserts a literal `$`
//!
//! An unbraced placeholder takes the longest run of letters, digits and `_`,
//! so `$1x` names a group called `1x`; write `${1}x` to follow a group with
//! text. A braced placeholder takes everything up to the closing `}`, so
//! `${a.b}` names a group called `a.b`. A `$` that does not start a
//! placeholder is kept as-is.
//!
//! Templates are checked against the pattern once, when parsed. A placeholder
//! that refers to a group the pattern does not have is an error rather than an
//! empty expansion.

use crate::error::ConfigError;
use regex::{Captures, Regex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Group(usize),
}

/// A parsed, validated output template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses `template` and resolves each placeholder to a group of `pattern`.
    pub fn parse(template: &str, pattern: &Regex) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                literal.push('$');
                rest = tail;
                continue;
            }

            let (name, tail) = match split_placeholder(after) {
                Some(parsed) => parsed,
                None => {
                    literal.push('$');
                    rest = after;
                    continue;
                }
            };

            let index = resolve(name, template, pattern)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Group(index));
            rest = tail;
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Expands the template against a match. Groups that did not take part in
    /// the match expand to the empty string.
    pub fn expand(&self, captures: &Captures<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group(index) => {
                    if let Some(m) = captures.get(*index) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a placeholder name off the text following a `$`.
fn split_placeholder(after: &str) -> Option<(&str, &str)> {
    if let Some(braced) = after.strip_prefix('{') {
        let end = braced.find('}')?;
        let name = &braced[..end];
        if name.is_empty() {
            return None;
        }
        return Some((name, &braced[end + 1..]));
    }

    let end = after
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map_or(after.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    Some((&after[..end], &after[end..]))
}

fn resolve(name: &str, template: &str, pattern: &Regex) -> Result<usize, ConfigError> {
    if name.chars().all(|c| c.is_ascii_digit()) {
        let groups = pattern.captures_len() - 1;
        return match name.parse::<usize>() {
            Ok(index) if index <= groups => Ok(index),
            _ => Err(ConfigError::Template {
                template: template.to_string(),
                reason: format!("${{{}}} is out of range, the pattern has {} group(s)", name, groups),
            }),
        };
    }

    pattern
        .capture_names()
        .position(|group| group == Some(name))
        .ok_or_else(|| ConfigError::Template {
            template: template.to_string(),
            reason: format!("the pattern has no group named {:?}", name),
        })
}
