//! Line-oriented encoding, one event per line:
//!
//! ```text
//! Node(20) setProperty String("name") String("Alistair")
//! GraphDatabaseService() createNode => Node(13)
//! Node(13) getRelationships RelationshipType("KNOWS") Direction(OUTGOING) => Iterator(0)
//! ```
//!
//! Strings are JSON-quoted, so spaces, quotes and parentheses inside them are
//! escaped or enclosed and never confuse the tokenizer. Arrays render as
//! `{v1, v2, ...}` with JSON element literals.

use crate::codec::CodecRegistry;
use crate::errors::TapeError;
use crate::event::Event;
use crate::parameter::{non_finite_name, Parameter, WireKind};
use crate::value::Scalar;
use regex::Regex;
use serde_json::Value as Json;
use std::sync::LazyLock;

pub const RESULT_MARKER: &str = "=>";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\??\[\])?)\((.*)\)$").expect("token pattern compiles")
});

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name pattern compiles"));

fn malformed(message: impl Into<String>) -> TapeError {
    TapeError::Malformed(message.into())
}

fn render_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Bool(v) => v.to_string(),
        Scalar::Byte(v) => v.to_string(),
        Scalar::Int(v) => v.to_string(),
        Scalar::Long(v) => v.to_string(),
        // Debug keeps the shortest exact form and always shows a decimal point or exponent.
        Scalar::Float(v) => render_float(f64::from(*v), format!("{v:?}")),
        Scalar::Double(v) => render_float(*v, format!("{v:?}")),
        Scalar::Str(v) => quote(v),
    }
}

// NaN and the infinities are written as quoted names, the same strings JSON uses.
fn render_float(value: f64, finite: String) -> String {
    non_finite_name(value).map_or(finite, quote)
}

fn quote(text: &str) -> String {
    Json::String(text.to_string()).to_string()
}

/// Render `parameter` as `Tag(literal)`.
pub fn render_parameter(parameter: &Parameter) -> String {
    let literal = match parameter {
        Parameter::Null | Parameter::Ambient { .. } => String::new(),
        Parameter::Scalar(scalar) => render_scalar(scalar),
        Parameter::Array(array) => {
            let items = array
                .elements()
                .iter()
                .map(|element| element.as_ref().map_or("null".to_string(), render_scalar))
                .collect::<Vec<_>>();
            format!("{{{}}}", items.join(", "))
        }
        Parameter::Enum(value) => value.name.clone(),
        Parameter::Label(label) => quote(&label.name),
        Parameter::Stable { id, .. } => id.to_string(),
        Parameter::Surrogate { id, .. } => id.to_string(),
    };
    format!("{}({literal})", parameter.type_name())
}

fn parse_literal(kind: WireKind, literal: &str) -> Result<Json, TapeError> {
    match kind {
        WireKind::Empty => {
            if literal.is_empty() {
                Ok(Json::Null)
            } else {
                Err(malformed(format!("expected empty value, got {literal}")))
            }
        }
        WireKind::Name => {
            if NAME_RE.is_match(literal) {
                Ok(Json::String(literal.to_string()))
            } else {
                Err(malformed(format!("invalid name {literal}")))
            }
        }
        WireKind::Array => {
            let inner = literal
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .ok_or_else(|| malformed(format!("invalid array literal {literal}")))?;
            serde_json::from_str(&format!("[{inner}]"))
                .map_err(|e| malformed(format!("invalid array literal {literal}: {e}")))
        }
        WireKind::Boolean | WireKind::Integer | WireKind::Float | WireKind::Text => {
            serde_json::from_str(literal)
                .map_err(|e| malformed(format!("invalid literal {literal}: {e}")))
        }
    }
}

/// Parse one `Tag(literal)` token.
pub fn parse_parameter(registry: &CodecRegistry, token: &str) -> Result<Parameter, TapeError> {
    let captures = TOKEN_RE
        .captures(token)
        .ok_or_else(|| malformed(format!("cannot parse parameter: {token}")))?;
    let type_name = &captures[1];
    let literal = &captures[2];
    let kind = registry.wire_kind(type_name)?;
    let wire = parse_literal(kind, literal)?;
    registry.from_wire(type_name, &wire)
}

/// Split on single spaces that lie outside quoted strings, parentheses and braces.
fn tokenize(line: &str) -> Result<Vec<&str>, TapeError> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0usize;
    for (idx, ch) in line.char_indices() {
        if in_string {
            match (escaped, ch) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '{' => depth += 1,
            ')' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed(format!("unbalanced `{ch}` in: {line}")))?;
            }
            ' ' if depth == 0 => {
                if idx == start {
                    return Err(malformed(format!("empty field in: {line}")));
                }
                tokens.push(&line[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if in_string || depth != 0 {
        return Err(malformed(format!("unterminated token in: {line}")));
    }
    if start >= line.len() {
        return Err(malformed(format!("empty field in: {line}")));
    }
    tokens.push(&line[start..]);
    Ok(tokens)
}

pub fn encode(event: &Event) -> String {
    let mut fields = vec![
        render_parameter(event.target()),
        event.method().to_string(),
    ];
    fields.extend(event.arguments().iter().map(render_parameter));
    if !event.result().is_null() {
        fields.push(RESULT_MARKER.to_string());
        fields.push(render_parameter(event.result()));
    }
    fields.join(" ")
}

pub fn decode(registry: &CodecRegistry, line: &str) -> Result<Event, TapeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let tokens = tokenize(line)?;
    let [target, method, rest @ ..] = tokens.as_slice() else {
        return Err(malformed(format!("expected target and method in: {line}")));
    };
    if !NAME_RE.is_match(method) {
        return Err(malformed(format!("invalid method name {method}")));
    }
    let (argument_tokens, result_token) = match rest.iter().position(|t| *t == RESULT_MARKER) {
        Some(pos) => match &rest[pos + 1..] {
            [result] => (&rest[..pos], Some(*result)),
            _ => {
                return Err(malformed(format!(
                    "expected exactly one result after `{RESULT_MARKER}` in: {line}"
                )))
            }
        },
        None => (rest, None),
    };
    let target = parse_parameter(registry, target)?;
    let arguments = argument_tokens
        .iter()
        .map(|token| parse_parameter(registry, token))
        .collect::<Result<Vec<_>, _>>()?;
    let result = match result_token {
        Some(token) => parse_parameter(registry, token)?,
        None => Parameter::Null,
    };
    Ok(Event::new(target, *method, arguments, result))
}

pub fn decode_all(registry: &CodecRegistry, text: &str) -> Result<Vec<Event>, TapeError> {
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event = decode(registry, line).map_err(|e| {
            TapeError::Malformed(format!("event log line {}: {e}", idx + 1))
        })?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::AmbientRole;
    use crate::value::{EnumValue, Label, PrimitiveArray, ScalarKind};

    fn registry() -> CodecRegistry {
        CodecRegistry::standard()
            .with_ambient("GraphDatabaseService", AmbientRole::Root)
            .with_stable("Node")
            .with_surrogate("Iterator")
            .with_enum("Direction", &["OUTGOING", "INCOMING", "BOTH"])
            .with_label("RelationshipType")
    }

    fn string(value: &str) -> Parameter {
        Parameter::Scalar(Scalar::Str(value.into()))
    }

    #[test]
    fn should_format_for_readability() {
        let event = Event::new(
            Parameter::Stable {
                type_name: "Node".into(),
                id: 20,
            },
            "setProperty",
            vec![string("name"), string("Alistair")],
            Parameter::Null,
        );
        assert_eq!(
            encode(&event),
            r#"Node(20) setProperty String("name") String("Alistair")"#
        );
    }

    #[test]
    fn should_parse_from_string() {
        let event = decode(
            &registry(),
            r#"Node(20) setProperty String("name") String("Alistair")"#,
        )
        .expect("decode");
        assert_eq!(event.arguments().len(), 2);
        assert_eq!(event.arguments()[1], string("Alistair"));
    }

    #[test]
    fn parses_each_category() {
        let registry = registry();
        assert_eq!(
            parse_parameter(&registry, "Integer(42)").expect("int"),
            Parameter::Scalar(Scalar::Int(42))
        );
        assert_eq!(
            parse_parameter(&registry, "Node(13)").expect("node"),
            Parameter::Stable {
                type_name: "Node".into(),
                id: 13
            }
        );
        assert_eq!(
            parse_parameter(&registry, "Direction(OUTGOING)").expect("enum"),
            Parameter::Enum(EnumValue::new("Direction", "OUTGOING"))
        );
        assert_eq!(
            parse_parameter(&registry, r#"RelationshipType("KNOWS")"#).expect("label"),
            Parameter::Label(Label::new("RelationshipType", "KNOWS"))
        );
        assert_eq!(
            parse_parameter(&registry, "Integer[]({})").expect("empty array"),
            Parameter::Array(PrimitiveArray::Int(Vec::new()))
        );
        assert_eq!(
            parse_parameter(&registry, "Null()").expect("null"),
            Parameter::Null
        );
    }

    #[test]
    fn strings_with_spaces_quotes_and_parens_round_trip() {
        let tricky = string(r#"a "quoted" (value), with {braces}"#);
        let event = Event::new(
            Parameter::Ambient {
                type_name: "GraphDatabaseService".into(),
                role: AmbientRole::Root,
            },
            "index",
            vec![tricky.clone(), string(""), string("=>")],
            tricky,
        );
        let line = encode(&event);
        assert_eq!(decode(&registry(), &line).expect("decode"), event);
    }

    #[test]
    fn non_finite_floats_render_as_quoted_names() {
        let event = Event::new(
            Parameter::Stable {
                type_name: "Node".into(),
                id: 2,
            },
            "setProperty",
            vec![
                string("limit"),
                Parameter::Array(PrimitiveArray::Double(vec![f64::NEG_INFINITY, 0.5])),
            ],
            Parameter::Scalar(Scalar::Float(f32::INFINITY)),
        );
        let line = encode(&event);
        assert!(line.contains(r#"Double[]({"-Infinity", 0.5})"#), "{line}");
        assert!(line.ends_with(r#"=> Float("Infinity")"#), "{line}");
        assert_eq!(decode(&registry(), &line).expect("decode"), event);

        match parse_parameter(&registry(), r#"Double("NaN")"#).expect("nan") {
            Parameter::Scalar(Scalar::Double(v)) => assert!(v.is_nan()),
            other => panic!("expected a double, got {other:?}"),
        }
        assert!(parse_parameter(&registry(), "Double(inf)").is_err());
        assert!(parse_parameter(&registry(), "Float(1e300)").is_err());
    }

    #[test]
    fn arrays_and_results_round_trip() {
        let event = Event::new(
            Parameter::Stable {
                type_name: "Node".into(),
                id: 1,
            },
            "setProperty",
            vec![
                string("scores"),
                Parameter::Array(PrimitiveArray::Float(vec![1.0, 2.5, -0.125])),
                Parameter::Array(PrimitiveArray::Nullable {
                    kind: ScalarKind::String,
                    elements: vec![Some(Scalar::Str("a, b".into())), None],
                }),
            ],
            Parameter::Surrogate {
                type_name: "Iterator".into(),
                id: 3,
            },
        );
        let line = encode(&event);
        assert!(line.contains("Float[]({1.0, 2.5, -0.125})"));
        assert!(line.ends_with("=> Iterator(3)"));
        assert_eq!(decode(&registry(), &line).expect("decode"), event);
    }

    #[test]
    fn rejects_malformed_lines() {
        let registry = registry();
        for line in [
            "Node(1)",
            "Node(1)  setProperty",
            "Node(1) set(Property",
            r#"Node(1) setProperty String("open"#,
            "Node(1) getId =>",
            "Node(1) getId => Long(1) Long(2)",
            "Node(x) getId",
            "Direction(sideways now) x",
        ] {
            assert!(
                matches!(decode(&registry, line), Err(TapeError::Malformed(_))),
                "expected malformed: {line}"
            );
        }
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        assert!(matches!(
            decode(&registry(), "Widget(1) spin"),
            Err(TapeError::Unsupported(_))
        ));
    }
}
