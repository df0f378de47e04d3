//! Minimal template formatter for the offline search page.
//!
//! Recognizes `{{name}}` substitutions and nestable
//! `{{foreach <key>}}...{{end foreach <key>}}` blocks. Inside a block the
//! item's values shadow the outer context.

use std::collections::BTreeMap;

use regex::Regex;

/// A context value: a plain string or a list of sub-contexts for `foreach`.
#[derive(Debug, Clone)]
pub enum Value {
    Text(String),
    List(Vec<Context>),
}

/// Lookup scope for markers.
pub type Context = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid marker: `{0}`")]
    InvalidMarker(String),
    #[error("unknown template key: `{0}`")]
    UnknownKey(String),
    #[error("`{0}` is not a list")]
    NotAList(String),
    #[error("unterminated block: `{0}`")]
    Unterminated(String),
}

#[derive(Debug, Clone)]
enum Span {
    Text(String),
    Marker(String),
}

fn tokenize(template: &str) -> Vec<Span> {
    // Marker syntax is fixed, so the pattern is too.
    let marker = Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_ ]+)\}\}").expect("valid marker pattern");

    let mut spans = Vec::new();
    let mut current = 0;
    for captures in marker.captures_iter(template) {
        let whole = captures.get(0).expect("capture 0 always present");
        spans.push(Span::Text(template[current..whole.start()].to_string()));
        spans.push(Span::Marker(captures[1].to_string()));
        current = whole.end();
    }
    spans.push(Span::Text(template[current..].to_string()));
    spans
}

/// Renders `template` against `context`.
pub fn format_page(template: &str, context: &Context) -> Result<String, TemplateError> {
    let spans = tokenize(template);
    let mut output = String::new();
    format_spans(&spans, context, &mut output)?;
    Ok(output)
}

fn format_spans(
    spans: &[Span],
    context: &Context,
    output: &mut String,
) -> Result<(), TemplateError> {
    let mut index = 0;
    while index < spans.len() {
        match &spans[index] {
            Span::Text(text) => {
                output.push_str(text);
                index += 1;
            }
            Span::Marker(marker) => {
                if let Some(key) = marker.strip_prefix("foreach ") {
                    let terminator = format!("end foreach {key}");
                    let body_start = index + 1;
                    let mut body_end = None;
                    for (offset, span) in spans[body_start..].iter().enumerate() {
                        if matches!(span, Span::Marker(inner) if *inner == terminator) {
                            body_end = Some(body_start + offset);
                            break;
                        }
                    }
                    let body_end =
                        body_end.ok_or_else(|| TemplateError::Unterminated(marker.clone()))?;

                    let items = match context.get(key) {
                        Some(Value::List(items)) => items,
                        Some(Value::Text(_)) => {
                            return Err(TemplateError::NotAList(key.to_string()))
                        }
                        None => return Err(TemplateError::UnknownKey(key.to_string())),
                    };
                    for item in items {
                        let mut merged = context.clone();
                        merged.extend(item.clone());
                        format_spans(&spans[body_start..body_end], &merged, output)?;
                    }
                    index = body_end + 1;
                } else if !marker.contains(' ') {
                    match context.get(marker) {
                        Some(Value::Text(text)) => output.push_str(text),
                        Some(Value::List(_)) => {
                            return Err(TemplateError::InvalidMarker(marker.clone()))
                        }
                        None => return Err(TemplateError::UnknownKey(marker.clone())),
                    }
                    index += 1;
                } else {
                    return Err(TemplateError::InvalidMarker(marker.clone()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{format_page, Context, TemplateError, Value};

    fn text(value: &str) -> Value {
        Value::Text(value.to_string())
    }

    #[test]
    fn plain_substitution() {
        let context = Context::from([("name".to_string(), text("ampm"))]);
        assert_eq!(format_page("hello {{name}}!", &context).unwrap(), "hello ampm!");
    }

    #[test]
    fn foreach_merges_scopes() {
        let items = vec![
            Context::from([("id".to_string(), text("a"))]),
            Context::from([("id".to_string(), text("b"))]),
        ];
        let context = Context::from([
            ("title".to_string(), text("index")),
            ("rows".to_string(), Value::List(items)),
        ]);
        let rendered =
            format_page("{{title}}: {{foreach rows}}[{{id}} in {{title}}]{{end foreach rows}}", &context)
                .unwrap();
        assert_eq!(rendered, "index: [a in index][b in index]");
    }

    #[test]
    fn nested_foreach() {
        let inner = vec![Context::from([("val".to_string(), text("1"))])];
        let outer = vec![Context::from([
            ("label".to_string(), text("outer")),
            ("inner".to_string(), Value::List(inner)),
        ])];
        let context = Context::from([("items".to_string(), Value::List(outer))]);
        let rendered = format_page(
            "{{foreach items}}{{label}}({{foreach inner}}{{val}}{{end foreach inner}}){{end foreach items}}",
            &context,
        )
        .unwrap();
        assert_eq!(rendered, "outer(1)");
    }

    #[test]
    fn errors() {
        let context = Context::new();
        assert!(matches!(
            format_page("{{missing key}}", &context),
            Err(TemplateError::InvalidMarker(_))
        ));
        assert!(matches!(
            format_page("{{nope}}", &context),
            Err(TemplateError::UnknownKey(_))
        ));
        assert!(matches!(
            format_page("{{foreach rows}}no end", &context),
            Err(TemplateError::Unterminated(_))
        ));
    }
}
