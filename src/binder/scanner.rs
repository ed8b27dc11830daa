use crate::error::SqlBridgeError;

/// One parsed piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Piece {
    /// Literal SQL text between fields (brace escapes already collapsed).
    Literal(String),
    /// A `{selector!conversion:directive}` field.
    Field {
        selector: String,
        conversion: Option<String>,
        directive: Option<String>,
    },
}

/// Split a template into literal runs and `{...}` fields.
///
/// Grammar per field: selector text up to a top-level `!` or `:`, an optional
/// `!conversion` token, an optional `:directive` token. `{{` and `}}` escape
/// literal braces. A `:` inside `[...]` belongs to the selector, so indexed
/// paths like `{d["a:b"]}` survive intact.
pub(super) fn scan(template: &str) -> Result<Vec<Piece>, SqlBridgeError> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(scan_field(&mut chars)?);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(SqlBridgeError::TemplateSyntax(
                        "single '}' encountered outside a field".into(),
                    ));
                }
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

fn scan_field(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<Piece, SqlBridgeError> {
    let mut selector = String::new();
    let mut conversion: Option<String> = None;
    let mut directive: Option<String> = None;
    let mut bracket_depth = 0u32;

    // Which part of the field is being read.
    enum Part {
        Selector,
        Conversion,
        Directive,
    }
    let mut part = Part::Selector;

    for ch in chars.by_ref() {
        match part {
            Part::Selector => match ch {
                '}' if bracket_depth == 0 => {
                    return Ok(Piece::Field {
                        selector,
                        conversion,
                        directive,
                    });
                }
                '!' if bracket_depth == 0 => {
                    conversion = Some(String::new());
                    part = Part::Conversion;
                }
                ':' if bracket_depth == 0 => {
                    directive = Some(String::new());
                    part = Part::Directive;
                }
                '{' => {
                    return Err(SqlBridgeError::TemplateSyntax(
                        "'{' not allowed inside a field".into(),
                    ));
                }
                '[' => {
                    bracket_depth += 1;
                    selector.push(ch);
                }
                ']' => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    selector.push(ch);
                }
                other => selector.push(other),
            },
            Part::Conversion => match ch {
                '}' => {
                    return Ok(Piece::Field {
                        selector,
                        conversion,
                        directive,
                    });
                }
                ':' => {
                    directive = Some(String::new());
                    part = Part::Directive;
                }
                other => {
                    if let Some(conv) = conversion.as_mut() {
                        conv.push(other);
                    }
                }
            },
            Part::Directive => match ch {
                '}' => {
                    return Ok(Piece::Field {
                        selector,
                        conversion,
                        directive,
                    });
                }
                other => {
                    if let Some(dir) = directive.as_mut() {
                        dir.push(other);
                    }
                }
            },
        }
    }

    Err(SqlBridgeError::TemplateSyntax(
        "unterminated '{' field".into(),
    ))
}
