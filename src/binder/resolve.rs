use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlBridgeError;
use crate::types::{BindParams, SqlValue};

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_a-zA-Z]\w*$").unwrap_or_else(|e| panic!("{e}")));

/// A parsed field selector. Arbitrary expressions are not supported; only
/// names, indices, and a closed set of dotted/indexed accessors resolved
/// structurally against the parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Selector {
    /// `{}` — next positional index.
    Auto,
    /// `{3}` — explicit positional index.
    Index(usize),
    /// `{name}` — named lookup.
    Name(String),
    /// `{name.field[0]["key"]}` — a root plus accessor steps.
    Path(Root, Vec<Accessor>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Root {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Accessor {
    Key(String),
    Index(usize),
}

pub(super) fn parse_selector(text: &str) -> Result<Selector, SqlBridgeError> {
    if text.is_empty() {
        return Ok(Selector::Auto);
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().map(Selector::Index).map_err(|_| {
            SqlBridgeError::ParamResolution(format!("index selector {text:?} out of range"))
        });
    }
    if IDENT_RE.is_match(text) {
        return Ok(Selector::Name(text.to_string()));
    }
    parse_path(text)
}

/// Path grammar: `root ( '.' ident | '[' digits ']' | '[' quoted ']' )*`.
fn parse_path(text: &str) -> Result<Selector, SqlBridgeError> {
    let bad = |msg: &str| SqlBridgeError::ParamResolution(format!("bad selector {text:?}: {msg}"));

    let root_end = text
        .find(['.', '['])
        .ok_or_else(|| bad("not a name, index, or path"))?;
    let root_text = &text[..root_end];
    let root = if root_text.bytes().all(|b| b.is_ascii_digit()) && !root_text.is_empty() {
        Root::Index(
            root_text
                .parse()
                .map_err(|_| bad("root index out of range"))?,
        )
    } else if IDENT_RE.is_match(root_text) {
        Root::Name(root_text.to_string())
    } else {
        return Err(bad("path root must be a name or index"));
    };

    let mut accessors = Vec::new();
    let mut rest = &text[root_end..];
    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot
                .find(['.', '['])
                .unwrap_or(after_dot.len());
            let name = &after_dot[..end];
            if !IDENT_RE.is_match(name) {
                return Err(bad("dotted step must be an identifier"));
            }
            accessors.push(Accessor::Key(name.to_string()));
            rest = &after_dot[end..];
        } else if let Some(after_open) = rest.strip_prefix('[') {
            let close = after_open.find(']').ok_or_else(|| bad("unclosed '['"))?;
            let inner = &after_open[..close];
            if inner.bytes().all(|b| b.is_ascii_digit()) && !inner.is_empty() {
                accessors.push(Accessor::Index(
                    inner.parse().map_err(|_| bad("index out of range"))?,
                ));
            } else if (inner.starts_with('"') && inner.ends_with('"') && inner.len() >= 2)
                || (inner.starts_with('\'') && inner.ends_with('\'') && inner.len() >= 2)
            {
                accessors.push(Accessor::Key(inner[1..inner.len() - 1].to_string()));
            } else {
                return Err(bad("index step must be digits or a quoted key"));
            }
            rest = &after_open[close + 1..];
        } else {
            return Err(bad("expected '.' or '[' in path"));
        }
    }

    Ok(Selector::Path(root, accessors))
}

/// Resolves selectors against one parameter source, tracking the running
/// auto-increment cursor so `{}` after `{1}` continues from index 2.
pub(super) struct Resolver<'p> {
    params: &'p BindParams,
    next_index: usize,
}

impl<'p> Resolver<'p> {
    pub(super) fn new(params: &'p BindParams) -> Self {
        Self {
            params,
            next_index: 0,
        }
    }

    /// Highest positional index consumed so far, plus one.
    pub(super) fn next_index(&self) -> usize {
        self.next_index
    }

    pub(super) fn resolve(&mut self, selector: &Selector) -> Result<SqlValue, SqlBridgeError> {
        match selector {
            Selector::Auto => {
                let index = self.next_index;
                self.next_index += 1;
                self.positional(index)
            }
            Selector::Index(index) => {
                self.next_index = index + 1;
                self.positional(*index)
            }
            Selector::Name(name) => self.named(name),
            Selector::Path(root, accessors) => {
                let mut value = match root {
                    Root::Index(index) => {
                        self.next_index = index + 1;
                        self.positional(*index)?
                    }
                    Root::Name(name) => self.named(name)?,
                };
                for accessor in accessors {
                    value = apply_accessor(value, accessor)?;
                }
                Ok(value)
            }
        }
    }

    fn positional(&self, index: usize) -> Result<SqlValue, SqlBridgeError> {
        match self.params {
            BindParams::Positional(values) => values.get(index).cloned().ok_or_else(|| {
                SqlBridgeError::ParamResolution(format!(
                    "positional parameter {index} out of range ({} supplied)",
                    values.len()
                ))
            }),
            BindParams::Named(_) => Err(SqlBridgeError::ParamMode(
                "cannot use positional indices against named parameters".into(),
            )),
            BindParams::None => Err(SqlBridgeError::ParamResolution(
                "template consumes parameters but none were supplied".into(),
            )),
        }
    }

    fn named(&self, name: &str) -> Result<SqlValue, SqlBridgeError> {
        match self.params {
            BindParams::Named(map) => map.get(name).cloned().ok_or_else(|| {
                SqlBridgeError::ParamResolution(format!("no parameter named {name:?}"))
            }),
            BindParams::Positional(_) => Err(SqlBridgeError::ParamMode(
                "cannot use named selectors against positional parameters".into(),
            )),
            BindParams::None => Err(SqlBridgeError::ParamResolution(
                "template consumes parameters but none were supplied".into(),
            )),
        }
    }
}

fn apply_accessor(value: SqlValue, accessor: &Accessor) -> Result<SqlValue, SqlBridgeError> {
    match (&value, accessor) {
        (SqlValue::Json(json), Accessor::Key(key)) => json
            .get(key)
            .cloned()
            .map(SqlValue::from)
            .ok_or_else(|| SqlBridgeError::ParamResolution(format!("no key {key:?} in JSON value"))),
        (SqlValue::Json(json), Accessor::Index(index)) => {
            json.get(index).cloned().map(SqlValue::from).ok_or_else(|| {
                SqlBridgeError::ParamResolution(format!("no index {index} in JSON value"))
            })
        }
        (SqlValue::Array(items), Accessor::Index(index)) => {
            items.get(*index).cloned().ok_or_else(|| {
                SqlBridgeError::ParamResolution(format!("no index {index} in array value"))
            })
        }
        (_, Accessor::Key(key)) => Err(SqlBridgeError::ParamResolution(format!(
            "cannot access key {key:?} on a scalar parameter"
        ))),
        (_, Accessor::Index(index)) => Err(SqlBridgeError::ParamResolution(format!(
            "cannot access index {index} on a scalar parameter"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_selectors() {
        assert_eq!(parse_selector("").unwrap(), Selector::Auto);
        assert_eq!(parse_selector("7").unwrap(), Selector::Index(7));
        assert_eq!(
            parse_selector("name").unwrap(),
            Selector::Name("name".into())
        );
    }

    #[test]
    fn parses_paths() {
        assert_eq!(
            parse_selector(r#"d["k"].x[0]"#).unwrap(),
            Selector::Path(
                Root::Name("d".into()),
                vec![
                    Accessor::Key("k".into()),
                    Accessor::Key("x".into()),
                    Accessor::Index(0),
                ]
            )
        );
    }

    #[test]
    fn rejects_expressions() {
        assert!(parse_selector("foo + bar").is_err());
        assert!(parse_selector("foo(1)").is_err());
    }
}
