//! Named-placeholder path templates.
//!
//! A template is parsed once into literal and field segments so the same value
//! drives both directions: `expand` substitutes values into the placeholders
//! and a compiled [`TemplateMatcher`] recovers them from a concrete path.
use crate::error::QcError;
use anyhow::Result;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Field values keyed by placeholder name.
pub type Variables = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `{name}` placeholders; `{{` and `}}` are literal braces.
    ///
    /// Format specs and conversions (`{n:02d}`, `{n!r}`) are rejected so that
    /// every placeholder can be reversed unambiguously.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = parse_segments(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Distinct field names referenced by the template.
    pub fn fields(&self) -> BTreeSet<&str> {
        self.field_order().into_iter().collect()
    }

    /// Distinct field names in order of first appearance.
    pub fn field_order(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment {
                if seen.insert(name.as_str()) {
                    order.push(name.as_str());
                }
            }
        }
        order
    }

    pub fn references(&self, field: &str) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field(name) if name == field))
    }

    /// Substitute every placeholder from `variables`.
    pub fn expand(&self, variables: &Variables) -> Result<String> {
        self.expand_with(|field| variables.get(field).map(String::as_str))
    }

    /// Substitute placeholders using a lookup; a `None` is a missing field.
    pub fn expand_with<'a, F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = lookup(name).ok_or_else(|| QcError::MissingField {
                        template: self.raw.clone(),
                        field: name.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Compile a reverse matcher. Fields present in `fixed` are matched as
    /// literals, which pins values (such as directory prefixes) that would
    /// otherwise make the split ambiguous.
    pub fn matcher(&self, fixed: &Variables) -> Result<TemplateMatcher> {
        let mut pattern = String::from("^");
        let mut groups = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Field(name) => match fixed.get(name) {
                    Some(value) => pattern.push_str(&regex::escape(value)),
                    None => {
                        let group = format!("f{}", groups.len());
                        pattern.push_str(&format!("(?P<{group}>[^/]+?)"));
                        groups.push((group, name.clone()));
                    }
                },
            }
        }
        pattern.push('$');
        let regex = Regex::new(&pattern).map_err(|err| QcError::Template {
            template: self.raw.clone(),
            reason: err.to_string(),
        })?;
        Ok(TemplateMatcher {
            template: self.raw.clone(),
            regex,
            groups,
            fixed: fixed.clone(),
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compiled reverse parser for one template.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    template: String,
    regex: Regex,
    groups: Vec<(String, String)>,
    fixed: Variables,
}

impl TemplateMatcher {
    /// Recover the variables that produce `path`, or `None` when it does not
    /// match. A field repeated in the template must capture the same value at
    /// every occurrence.
    pub fn capture(&self, path: &str) -> Option<Variables> {
        let caps = self.regex.captures(path)?;
        let mut variables = self.fixed.clone();
        for (group, field) in &self.groups {
            let value = caps.name(group)?.as_str();
            match variables.get(field) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    variables.insert(field.clone(), value.to_string());
                }
            }
        }
        Some(variables)
    }

    /// Like [`capture`](Self::capture) but a miss is a [`QcError::Match`].
    pub fn bind(&self, path: &Path) -> Result<Variables> {
        let text = path.to_string_lossy();
        self.capture(&text).ok_or_else(|| {
            QcError::Match {
                template: self.template.clone(),
                path: path.to_path_buf(),
            }
            .into()
        })
    }
}

fn parse_segments(raw: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(invalid(raw, "unterminated placeholder")),
                    }
                }
                if !is_identifier(&name) {
                    return Err(invalid(
                        raw,
                        &format!("unsupported placeholder '{{{name}}}'"),
                    ));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name));
            }
            '}' => return Err(invalid(raw, "single '}' outside a placeholder")),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(raw: &str, reason: &str) -> anyhow::Error {
    QcError::Template {
        template: raw.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
