//! # Object-Path Parser
//!
//! Hand-rolled parser for the object-path text form. Errors carry the byte
//! position that stopped the parse. Segmentation rules:
//!
//! - `//host/` prefix is optional; the host runs to the next `/`;
//! - the namespace is everything before the first `:`, but only when that
//!   `:` comes before the first `.` (class names never contain `:`);
//! - the class name runs to the first `.` or the end;
//! - bindings are `name=value` pairs separated by `,`; a value starting with
//!   `"` is quoted with `\"` and `\\` escapes and may contain `,` and `=`.
//!
//! Kind inference for parsed values: quoted literal that contains `:` and
//! itself parses as an object path → `Reference`; any other quoted literal →
//! `String`; `true`/`false` in any case → `Boolean`; everything else →
//! `Numeric` (numeric equivalence falls back to literal comparison when the
//! literal does not parse, so nothing is rejected here).

use eyre::{bail, ensure, Result};

use crate::path::{KeyBinding, KeyBindingKind, ObjectPath};

pub(crate) fn parse(input: &str) -> Result<ObjectPath> {
    let mut rest = input;
    let mut consumed = 0usize;

    let mut host = "";
    if let Some(stripped) = rest.strip_prefix("//") {
        let slash = stripped
            .find('/')
            .ok_or_else(|| eyre::eyre!("missing '/' after host segment"))?;
        host = &stripped[..slash];
        ensure!(!host.is_empty(), "empty host segment at position 2");
        consumed += 2 + slash + 1;
        rest = &stripped[slash + 1..];
    }

    let mut namespace = "";
    if let Some(colon) = rest.find(':') {
        if colon < rest.find('.').unwrap_or(rest.len()) {
            namespace = &rest[..colon];
            ensure!(
                !namespace.is_empty(),
                "empty namespace segment at position {consumed}"
            );
            consumed += colon + 1;
            rest = &rest[colon + 1..];
        }
    }

    let (class_name, bindings) = match rest.find('.') {
        Some(dot) => (&rest[..dot], Some((&rest[dot + 1..], consumed + dot + 1))),
        None => (rest, None),
    };
    ensure!(
        !class_name.is_empty(),
        "empty class name at position {consumed}"
    );

    let mut path = ObjectPath::new(host, namespace, class_name);
    if let Some((text, base)) = bindings {
        parse_bindings(text, base, &mut path)?;
    }
    Ok(path)
}

fn parse_bindings(text: &str, base: usize, path: &mut ObjectPath) -> Result<()> {
    let mut pos = 0usize;
    loop {
        let eq = text[pos..]
            .find('=')
            .map(|i| pos + i)
            .ok_or_else(|| eyre::eyre!("missing '=' in key binding at position {}", base + pos))?;
        let name = &text[pos..eq];
        ensure!(
            !name.is_empty() && !name.contains(','),
            "bad key name at position {}",
            base + pos
        );
        pos = eq + 1;

        let (binding, end) = if text[pos..].starts_with('"') {
            let (literal, end) = parse_quoted(text, pos, base)?;
            let kind = if literal.contains(':') && parse(&literal).is_ok() {
                KeyBindingKind::Reference
            } else {
                KeyBindingKind::String
            };
            (KeyBinding::new(name, kind, literal), end)
        } else {
            let end = text[pos..].find(',').map(|i| pos + i).unwrap_or(text.len());
            let literal = &text[pos..end];
            ensure!(
                !literal.is_empty(),
                "empty key value at position {}",
                base + pos
            );
            let kind = if literal.eq_ignore_ascii_case("true")
                || literal.eq_ignore_ascii_case("false")
            {
                KeyBindingKind::Boolean
            } else {
                KeyBindingKind::Numeric
            };
            (KeyBinding::new(name, kind, literal), end)
        };
        path.set_binding(binding);

        if end == text.len() {
            return Ok(());
        }
        ensure!(
            text[end..].starts_with(','),
            "expected ',' between key bindings at position {}",
            base + end
        );
        pos = end + 1;
    }
}

/// Parses a `"…"` literal starting at `start`, unescaping `\"` and `\\`.
/// Returns the unescaped text and the position after the closing quote.
fn parse_quoted(text: &str, start: usize, base: usize) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut chars = text[start + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    bail!("unterminated escape at position {}", base + start + 1 + offset);
                };
                ensure!(
                    escaped == '"' || escaped == '\\',
                    "invalid escape '\\{}' at position {}",
                    escaped,
                    base + start + 1 + offset
                );
                out.push(escaped);
            }
            '"' => return Ok((out, start + 1 + offset + 1)),
            other => out.push(other),
        }
    }
    bail!("unterminated quoted value at position {}", base + start)
}
