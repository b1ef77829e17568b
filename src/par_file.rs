//! Format preserving rewrites of `key = value` control files.
//!
//! Text goes through three steps: every line is parsed into an
//! [`Line::Assignment`] or kept [`Line::Verbatim`], requested assignments get a
//! new value, and the lines are rendered back. Only the value token of a
//! rewritten assignment changes; indentation, the `=` column, inline comments
//! and line terminators are carried through untouched.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};

use crate::{datatypes::ParameterValue, error::RegolithError, notation};

/// Floats with more fractional digits than this are written in scientific notation
const MAX_FIXED_DECIMALS: usize = 3;

/// An assignment split into its parts. Concatenating the parts in field
/// order gives back the original line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
    /// Leading whitespace plus the key
    pub head: &'a str,
    pub key: &'a str,
    /// Whitespace around the `=`
    pub separator: &'a str,
    /// Token after the separator, ended by whitespace or `#`. Empty when a
    /// comment follows the `=` directly.
    pub value: &'a str,
    /// Everything after the value, e.g. padding and an inline comment
    pub rest: &'a str,
    pub terminator: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line<'a> {
    Assignment(Assignment<'a>),
    Verbatim(&'a str),
}

/// Result of [`apply`]
#[derive(Debug, Clone, PartialEq)]
pub struct Patched {
    pub text: String,
    /// Keys whose lines were rewritten, in file order
    pub changed: Vec<String>,
    /// Lines that matched a requested key but could not be rewritten
    pub skipped: Vec<usize>,
}

fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, &line[body.len()..])
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, &line[body.len()..])
    } else {
        (line, "")
    }
}

/// Splits one line, terminator included, into its parts
pub fn parse_line(line: &str) -> Line<'_> {
    let (body, terminator) = split_terminator(line);

    let key_start = body.len() - body.trim_start().len();
    let after_indent = &body[key_start..];
    if after_indent.is_empty() || after_indent.starts_with('#') {
        return Line::Verbatim(line);
    }

    let key_len = after_indent
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(after_indent.len());
    if key_len == 0 {
        return Line::Verbatim(line);
    }
    let head_end = key_start + key_len;

    let after_key = &body[head_end..];
    let before_eq = after_key.len() - after_key.trim_start().len();
    if !after_key[before_eq..].starts_with('=') {
        return Line::Verbatim(line);
    }
    let after_eq = &after_key[before_eq + 1..];
    let value_start = head_end + before_eq + 1 + (after_eq.len() - after_eq.trim_start().len());

    let value_part = &body[value_start..];
    let value_len = value_part
        .find(|c: char| c.is_whitespace() || c == '#')
        .unwrap_or(value_part.len());
    let value_end = value_start + value_len;

    Line::Assignment(Assignment {
        head: &body[..head_end],
        key: &body[key_start..head_end],
        separator: &body[head_end..value_start],
        value: &body[value_start..value_end],
        rest: &body[value_end..],
        terminator,
    })
}

/// Renders a parameter the way the solver's reader expects it
///
/// * booleans become `.true.` / `.false.`
/// * floats with more than three decimals become `1.0e-04` style
/// * other floats are fixed point without trailing zeros, e.g. `0.5`, `2`
/// * integers and text are written as is
pub fn format_value(value: &ParameterValue) -> Result<String, RegolithError> {
    match value {
        ParameterValue::Bool(true) => Ok(".true.".to_owned()),
        ParameterValue::Bool(false) => Ok(".false.".to_owned()),
        ParameterValue::Int(i) => Ok(i.to_string()),
        ParameterValue::Text(s) => Ok(s.clone()),
        ParameterValue::Float(f) => {
            if !f.is_finite() {
                return Err(RegolithError::Input(format!("cannot write non-finite value {f}")));
            }
            let fixed = format!("{:.10}", f);
            let trimmed = fixed.trim_end_matches('0');
            let decimals = trimmed.split('.').last().map(str::len).unwrap_or(0);
            if decimals > MAX_FIXED_DECIMALS {
                Ok(notation::scientific(*f, 1))
            } else {
                Ok(trimmed.trim_end_matches('.').to_owned())
            }
        }
    }
}

fn render_assignment(assignment: &Assignment, new_value: &str) -> String {
    // an empty value has nothing to pad, keep the comment marker apart
    let gap = if assignment.value.is_empty() && assignment.rest.starts_with('#') {
        " "
    } else {
        ""
    };
    format!(
        "{}{}{:<width$}{}{}{}",
        assignment.head,
        assignment.separator,
        new_value,
        gap,
        assignment.rest,
        assignment.terminator,
        width = assignment.value.len()
    )
}

/// Rewrites the values of the requested keys in `text`
///
/// Lines that are not assignments, or whose key is not requested, pass
/// through byte for byte. A requested line whose new value cannot be
/// rendered is logged and left as it was.
pub fn apply(text: &str, modifications: &HashMap<String, ParameterValue>) -> Patched {
    let mut out = String::with_capacity(text.len());
    let mut changed = Vec::new();
    let mut skipped = Vec::new();
    let mut matched: Vec<&str> = Vec::new();

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let assignment = match parse_line(line) {
            Line::Assignment(a) => a,
            Line::Verbatim(v) => {
                out.push_str(v);
                continue;
            }
        };
        let new_value = match modifications.get(assignment.key) {
            Some(v) => {
                matched.push(assignment.key);
                v
            }
            None => {
                out.push_str(line);
                continue;
            }
        };

        match format_value(new_value) {
            Ok(rendered) => {
                out.push_str(&render_assignment(&assignment, &rendered));
                changed.push(assignment.key.to_owned());
            }
            Err(err) => {
                let err = RegolithError::MalformedLine {
                    line: index + 1,
                    reason: err.to_string(),
                };
                warn!("{err}, leaving it unchanged");
                out.push_str(line);
                skipped.push(index + 1);
            }
        }
    }

    for key in modifications.keys() {
        if !matched.contains(&key.as_str()) {
            warn!("parameter {key} not found in Par_file");
        }
    }

    Patched {
        text: out,
        changed,
        skipped,
    }
}

/// Applies `modifications` to the control file at `path` in place
pub fn patch_file(path: &Path, modifications: &HashMap<String, ParameterValue>) -> Result<Patched, RegolithError> {
    if !path.is_file() {
        return Err(RegolithError::MissingInputFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|err| RegolithError::io(path, err))?;

    let patched = apply(&text, modifications);
    std::fs::write(path, &patched.text).map_err(|err| RegolithError::io(path, err))?;

    info!(
        "updated {} parameter(s) in {}: {}",
        patched.changed.len(),
        path.display(),
        patched.changed.join(", ")
    );
    Ok(patched)
}

/// Value token of the first assignment to `key`, ignoring comment lines
pub fn read_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.split_inclusive('\n').find_map(|line| match parse_line(line) {
        Line::Assignment(a) if a.key == key => Some(a.value),
        _ => None,
    })
}

/// Reads an integer parameter such as `NPROC`
pub fn read_usize(text: &str, key: &str) -> Result<usize, RegolithError> {
    let raw = read_value(text, key).ok_or_else(|| RegolithError::Input(format!("{key} not found in Par_file")))?;
    raw.parse()
        .map_err(|_| RegolithError::Input(format!("{key} in Par_file is not a non-negative integer: {raw}")))
}

/// Parses `KEY=VALUE` overrides given on the command line
pub fn parse_override(arg: &str) -> Result<(String, ParameterValue), RegolithError> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| RegolithError::Input(format!("expected KEY=VALUE, got {arg}")))?;
    let key = key.trim();
    let raw = raw.trim();
    if key.is_empty() {
        return Err(RegolithError::Input(format!("missing key in {arg}")));
    }

    let value = match raw {
        "true" | ".true." => ParameterValue::Bool(true),
        "false" | ".false." => ParameterValue::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                ParameterValue::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                ParameterValue::Float(f)
            } else {
                ParameterValue::Text(raw.to_owned())
            }
        }
    };
    Ok((key.to_owned(), value))
}
