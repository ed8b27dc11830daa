//! The query binder: parses a SQL template with `{...}` fields against a
//! parameter source into a backend-agnostic [`BoundQuery`], then renders it
//! for a concrete [`Dialect`].
//!
//! Binding and rendering are separate steps on purpose — a bound query can be
//! inspected (or rendered with no dialect at all) before a backend is chosen,
//! and rendering is a pure function of `(segments, params, dialect)`.

mod resolve;
mod scanner;

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::error::SqlBridgeError;
use crate::types::{BindParams, SqlValue};

use resolve::{Resolver, parse_selector};
use scanner::Piece;

/// One segment of a bound query. Literal text or a typed placeholder; no
/// segment carries backend-specific quoting until render time.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal SQL text, passed through verbatim (modulo `%` escaping for
    /// format-style dialects).
    Literal(String),
    /// One positional bind slot, aligned with the params list.
    Placeholder,
    /// A name to be quoted with the dialect's identifier rule.
    Identifier(String),
    /// A type alias to be adapted through the dialect's type table.
    TypeName(String),
    /// Raw SQL spliced without any escaping (the `:literal` directive).
    RawSql(String),
    /// One `(?, ?, ...)` tuple of the given width; its values sit in params.
    ValueGroup(usize),
    /// `rows` comma-joined tuples of `cols` placeholders each (bulk insert).
    MultiValueGroup { rows: usize, cols: usize },
}

impl Segment {
    fn emits_placeholder(&self) -> bool {
        matches!(
            self,
            Segment::Placeholder | Segment::ValueGroup(_) | Segment::MultiValueGroup { .. }
        )
    }
}

/// A parsed template plus its positionally-aligned parameter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundQuery {
    segments: Vec<Segment>,
    params: Vec<SqlValue>,
}

/// Parse `template` against `params` into a [`BoundQuery`].
///
/// # Errors
/// [`SqlBridgeError::TemplateSyntax`] for unbalanced braces,
/// [`SqlBridgeError::ParamResolution`] / [`SqlBridgeError::ParamMode`] for
/// lookup failures, [`SqlBridgeError::UnsupportedDirective`] for unknown
/// directive tokens, and [`SqlBridgeError::ShapeMismatch`] for bad
/// `values`/`values_list` shapes.
pub fn bind(
    template: &str,
    params: impl Into<BindParams>,
) -> Result<BoundQuery, SqlBridgeError> {
    let params = params.into();
    let mut segments = Vec::new();
    let mut out_params = Vec::new();
    let mut resolver = Resolver::new(&params);

    for piece in scanner::scan(template)? {
        match piece {
            Piece::Literal(text) => segments.push(Segment::Literal(text)),
            Piece::Field {
                selector,
                conversion,
                directive,
            } => {
                // `{SERIAL PRIMARY KEY!t}` style conversions take the selector
                // text directly and never touch the parameter source.
                if let Some(conv) = conversion {
                    segments.push(convert_segment(&conv, selector)?);
                    continue;
                }

                let value = resolver.resolve(&parse_selector(&selector)?)?;
                match directive.as_deref() {
                    None => {
                        segments.push(Segment::Placeholder);
                        out_params.push(value);
                    }
                    Some(dir) => {
                        bind_directive(dir, value, &mut segments, &mut out_params)?;
                    }
                }
            }
        }
    }

    // Trailing positional parameters beyond the highest referenced index are
    // carried through in order, for drivers expecting every supplied value.
    if let BindParams::Positional(values) = &params {
        let from = resolver.next_index();
        if from < values.len() {
            out_params.extend(values[from..].iter().cloned());
        }
    }

    Ok(BoundQuery {
        segments,
        params: out_params,
    })
}

fn convert_segment(conversion: &str, selector: String) -> Result<Segment, SqlBridgeError> {
    match conversion.to_ascii_lowercase().as_str() {
        "i" | "ident" | "identifier" => Ok(Segment::Identifier(selector)),
        "t" | "type" => Ok(Segment::TypeName(selector)),
        other => Err(SqlBridgeError::UnsupportedDirective(format!(
            "unknown conversion {other:?}"
        ))),
    }
}

fn bind_directive(
    directive: &str,
    value: SqlValue,
    segments: &mut Vec<Segment>,
    out_params: &mut Vec<SqlValue>,
) -> Result<(), SqlBridgeError> {
    let plain = |value: &SqlValue| {
        value.to_plain_string().ok_or_else(|| {
            SqlBridgeError::ParamResolution(format!(
                "{directive} directive requires a text-like parameter, got {value:?}"
            ))
        })
    };
    match directive.to_ascii_lowercase().as_str() {
        "i" | "ident" | "identifier" | "table" | "column" => {
            segments.push(Segment::Identifier(plain(&value)?));
        }
        "t" | "type" => {
            segments.push(Segment::TypeName(plain(&value)?));
        }
        "l" | "literal" => {
            segments.push(Segment::RawSql(plain(&value)?));
        }
        "v" | "values" => {
            let items = value.as_array().ok_or_else(|| {
                SqlBridgeError::ShapeMismatch(
                    "values directive requires a sequence parameter".into(),
                )
            })?;
            segments.push(Segment::ValueGroup(items.len()));
            out_params.extend(items.iter().cloned());
        }
        "vl" | "values_list" => {
            let rows = value.as_array().ok_or_else(|| {
                SqlBridgeError::ShapeMismatch(
                    "values_list directive requires a sequence of rows".into(),
                )
            })?;
            if rows.is_empty() {
                return Err(SqlBridgeError::ShapeMismatch(
                    "values_list requires at least one row".into(),
                ));
            }
            let mut cols = None;
            for row in rows {
                let items = row.as_array().ok_or_else(|| {
                    SqlBridgeError::ShapeMismatch("values_list rows must be sequences".into())
                })?;
                match cols {
                    None => cols = Some(items.len()),
                    Some(expected) if expected != items.len() => {
                        return Err(SqlBridgeError::ShapeMismatch(format!(
                            "values_list row width {} != {expected}",
                            items.len()
                        )));
                    }
                    Some(_) => {}
                }
                out_params.extend(items.iter().cloned());
            }
            segments.push(Segment::MultiValueGroup {
                rows: rows.len(),
                cols: cols.unwrap_or(0),
            });
        }
        other => {
            return Err(SqlBridgeError::UnsupportedDirective(format!(
                "unknown directive {other:?}"
            )));
        }
    }
    Ok(())
}

impl BoundQuery {
    /// The parsed segment sequence.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The ordered parameter list aligned with placeholder segments.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Render against `dialect`, producing final SQL text and the parameter
    /// list. `None` renders with a neutral `?` placeholder and ANSI identifier
    /// quoting so a bound query can be inspected before a backend is chosen.
    #[must_use]
    pub fn render(&self, dialect: Option<&Dialect>) -> (String, Vec<SqlValue>) {
        let escape_percent = dialect
            .is_some_and(|d| d.placeholder_style() == PlaceholderStyle::Format)
            && self.segments.iter().any(Segment::emits_placeholder);

        let mut sql = String::new();
        let mut slot = 0usize;
        let mut token = |slot: &mut usize| {
            let text = match dialect {
                Some(d) => d.placeholder_token(*slot),
                None => "?".to_string(),
            };
            *slot += 1;
            text
        };

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    if escape_percent && text.contains('%') {
                        sql.push_str(&text.replace('%', "%%"));
                    } else {
                        sql.push_str(text);
                    }
                }
                Segment::Placeholder => sql.push_str(&token(&mut slot)),
                Segment::Identifier(name) => match dialect {
                    Some(d) => sql.push_str(&d.quote_identifier(name)),
                    None => {
                        sql.push('"');
                        sql.push_str(&name.replace('"', "\"\""));
                        sql.push('"');
                    }
                },
                Segment::TypeName(name) => match dialect {
                    Some(d) => sql.push_str(&d.adapt_type(name)),
                    None => sql.push_str(name),
                },
                Segment::RawSql(text) => sql.push_str(text),
                Segment::ValueGroup(width) => {
                    push_group(&mut sql, *width, &mut slot, &mut token);
                }
                Segment::MultiValueGroup { rows, cols } => {
                    for row in 0..*rows {
                        if row > 0 {
                            sql.push_str(", ");
                        }
                        push_group(&mut sql, *cols, &mut slot, &mut token);
                    }
                }
            }
        }

        (sql, self.params.clone())
    }
}

fn push_group(
    sql: &mut String,
    width: usize,
    slot: &mut usize,
    token: &mut impl FnMut(&mut usize) -> String,
) {
    sql.push('(');
    for col in 0..width {
        if col > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&token(slot));
    }
    sql.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BindParams;

    fn named(pairs: &[(&str, SqlValue)]) -> BindParams {
        BindParams::Named(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn identifier_and_placeholder_across_dialects() {
        let bound = bind(
            "SELECT * FROM {t:identifier} WHERE id = {id}",
            named(&[("t", "foo".into()), ("id", SqlValue::Int(123))]),
        )
        .unwrap();

        let (sql, params) = bound.render(Some(&Dialect::sqlite()));
        assert_eq!(sql, r#"SELECT * FROM "foo" WHERE id = ?"#);
        assert_eq!(params, vec![SqlValue::Int(123)]);

        let (sql, params) = bound.render(Some(&Dialect::postgres()));
        assert_eq!(sql, r#"SELECT * FROM "foo" WHERE id = %s"#);
        assert_eq!(params, vec![SqlValue::Int(123)]);

        let (sql, _) = bound.render(None);
        assert_eq!(sql, r#"SELECT * FROM "foo" WHERE id = ?"#);
    }

    #[test]
    fn type_conversion_field_uses_selector_text() {
        let bound = bind("CREATE TABLE foo (id {SERIAL PRIMARY KEY!t})", BindParams::None)
            .unwrap();

        let (sql, params) = bound.render(None);
        assert_eq!(sql, "CREATE TABLE foo (id SERIAL PRIMARY KEY)");
        assert!(params.is_empty());

        let (sql, _) = bound.render(Some(&Dialect::sqlite()));
        assert_eq!(sql, "CREATE TABLE foo (id INTEGER PRIMARY KEY)");

        let (sql, _) = bound.render(Some(&Dialect::mssql()));
        assert_eq!(sql, "CREATE TABLE foo (id INTEGER IDENTITY PRIMARY KEY)");
    }

    #[test]
    fn literal_percent_escaped_only_with_placeholders() {
        // No placeholders: pass the backend's own syntax through untouched.
        let bound = bind("SELECT '%s'", vec![SqlValue::Int(1)]).unwrap();
        let (sql, params) = bound.render(Some(&Dialect::postgres()));
        assert_eq!(sql, "SELECT '%s'");
        assert_eq!(params, vec![SqlValue::Int(1)]);

        // A real placeholder alongside a literal `%` forces escaping.
        let bound = bind("SELECT '%s', {}", vec![SqlValue::Int(1)]).unwrap();
        let (sql, params) = bound.render(Some(&Dialect::postgres()));
        assert_eq!(sql, "SELECT '%%s', %s");
        assert_eq!(params, vec![SqlValue::Int(1)]);

        // Qmark dialects never escape.
        let bound = bind("SELECT '%s', {}", vec![SqlValue::Int(1)]).unwrap();
        let (sql, _) = bound.render(Some(&Dialect::sqlite()));
        assert_eq!(sql, "SELECT '%s', ?");
    }

    #[test]
    fn auto_index_continues_after_explicit_index() {
        let params: Vec<SqlValue> = vec![10.into(), 20.into(), 30.into()];
        let bound = bind("SELECT {1}, {}", params).unwrap();
        let (sql, params) = bound.render(None);
        assert_eq!(sql, "SELECT ?, ?");
        // {1} then auto-{} consumes index 2; index 0 is never referenced and
        // is not trailing, so it is dropped.
        assert_eq!(params, vec![SqlValue::Int(20), SqlValue::Int(30)]);
    }

    #[test]
    fn trailing_positionals_are_appended() {
        let params: Vec<SqlValue> = vec![1.into(), 2.into(), 3.into()];
        let bound = bind("SELECT {0}", params).unwrap();
        let (sql, params) = bound.render(None);
        assert_eq!(sql, "SELECT ?");
        assert_eq!(
            params,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn pass_through_with_no_fields_keeps_all_params() {
        let bound = bind("SELECT ?", vec![SqlValue::Int(1)]).unwrap();
        let (sql, params) = bound.render(None);
        assert_eq!(sql, "SELECT ?");
        assert_eq!(params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn values_group_expands_with_params() {
        let row = SqlValue::Array(vec![1.into(), "a".into()]);
        let bound = bind("INSERT INTO t VALUES {row:values}", named(&[("row", row)])).unwrap();
        let (sql, params) = bound.render(Some(&Dialect::sqlite()));
        assert_eq!(sql, "INSERT INTO t VALUES (?, ?)");
        assert_eq!(params, vec![SqlValue::Int(1), SqlValue::Text("a".into())]);

        let (sql, _) = bound.render(Some(&Dialect::mssql()));
        assert_eq!(sql, "INSERT INTO t VALUES (:0, :1)");
    }

    #[test]
    fn values_list_expands_rows() {
        let rows = SqlValue::Array(vec![
            SqlValue::Array(vec![1.into(), 2.into()]),
            SqlValue::Array(vec![3.into(), 4.into()]),
        ]);
        let bound =
            bind("INSERT INTO t VALUES {rows:values_list}", named(&[("rows", rows)])).unwrap();
        let (sql, params) = bound.render(Some(&Dialect::sqlite()));
        assert_eq!(sql, "INSERT INTO t VALUES (?, ?), (?, ?)");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn values_list_shape_errors() {
        let ragged = SqlValue::Array(vec![
            SqlValue::Array(vec![1.into(), 2.into()]),
            SqlValue::Array(vec![3.into()]),
        ]);
        let err = bind("INSERT INTO t VALUES {r:vl}", named(&[("r", ragged)])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ShapeMismatch(_)));

        let empty = SqlValue::Array(vec![]);
        let err = bind("INSERT INTO t VALUES {r:vl}", named(&[("r", empty)])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ShapeMismatch(_)));
    }

    #[test]
    fn raw_literal_splice_is_unescaped() {
        let bound = bind(
            "SELECT * FROM t WHERE {cond:literal} AND id = {}",
            vec![SqlValue::Text("x LIKE '100%'".into()), SqlValue::Int(5)],
        )
        .unwrap();
        let (sql, params) = bound.render(Some(&Dialect::postgres()));
        assert_eq!(sql, "SELECT * FROM t WHERE x LIKE '100%' AND id = %s");
        assert_eq!(params, vec![SqlValue::Int(5)]);
    }

    #[test]
    fn mode_mismatch_errors() {
        let err = bind("SELECT {0}", named(&[("a", 1.into())])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamMode(_)));

        let err = bind("SELECT {name}", vec![SqlValue::Int(1)]).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamMode(_)));

        let err = bind("SELECT {}", BindParams::None).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamResolution(_)));
    }

    #[test]
    fn missing_and_unknown_errors() {
        let err = bind("SELECT {missing}", named(&[("a", 1.into())])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamResolution(_)));

        let err = bind("SELECT {a:frobnicate}", named(&[("a", 1.into())])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedDirective(_)));

        let err = bind("SELECT {a!z}", named(&[("a", 1.into())])).unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedDirective(_)));
    }

    #[test]
    fn non_text_values_are_rejected_by_string_directives() {
        let err = bind(
            "SELECT * FROM {t:identifier}",
            named(&[("t", SqlValue::Blob(vec![1, 2]))]),
        )
        .unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamResolution(_)));

        let err = bind(
            "SELECT * FROM t WHERE {cond:literal}",
            named(&[("cond", SqlValue::Array(vec![1.into()]))]),
        )
        .unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParamResolution(_)));
    }

    #[test]
    fn dotted_and_indexed_paths_resolve_structurally() {
        let json = SqlValue::Json(serde_json::json!({"k": {"xs": [7, 8]}}));
        let bound = bind("SELECT {d.k.xs[1]}", named(&[("d", json)])).unwrap();
        let (sql, params) = bound.render(None);
        assert_eq!(sql, "SELECT ?");
        assert_eq!(params, vec![SqlValue::Int(8)]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let bound = bind(
            "SELECT * FROM {0:i} WHERE a = {} AND b IN {2:v} -- 100%",
            vec![
                SqlValue::Text("tbl".into()),
                SqlValue::Int(1),
                SqlValue::Array(vec![2.into(), 3.into()]),
            ],
        )
        .unwrap();
        let d = Dialect::postgres();
        assert_eq!(bound.render(Some(&d)), bound.render(Some(&d)));
    }
}
