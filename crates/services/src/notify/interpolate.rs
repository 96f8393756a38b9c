//! Variable interpolation for template bodies.
//!
//! Supported forms inside `{{ }}`:
//! - `{{name}}` — substitution; an undefined variable renders empty.
//! - `{{default name "fallback"}}` — fallback when absent or empty.
//! - `{{eq name "value" "then" "else"}}` — simple equality test.
//! - `{{date name "%Y-%m-%d"}}` — formats an RFC3339 string or an
//!   epoch-milliseconds number; anything unparseable renders verbatim.
//!
//! Rendering never fails; malformed expressions render as empty.

use chrono::{DateTime, Utc};
use serde_json::Value;

pub fn interpolate(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                out.push_str(&eval(after_open[..close].trim(), context));
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated expression; emit verbatim.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn eval(expr: &str, context: &Value) -> String {
    let tokens = tokenize(expr);
    match tokens.as_slice() {
        [Token::Ident(name)] => lookup(context, name),
        [Token::Ident(helper), Token::Ident(name), Token::Literal(fallback)]
            if helper == "default" =>
        {
            let value = lookup(context, name);
            if value.is_empty() {
                fallback.clone()
            } else {
                value
            }
        }
        [
            Token::Ident(helper),
            Token::Ident(name),
            Token::Literal(expected),
            Token::Literal(then),
            Token::Literal(otherwise),
        ] if helper == "eq" => {
            if lookup(context, name) == *expected {
                then.clone()
            } else {
                otherwise.clone()
            }
        }
        [Token::Ident(helper), Token::Ident(name), Token::Literal(format)]
            if helper == "date" =>
        {
            format_date(context, name, format)
        }
        _ => String::new(),
    }
}

fn lookup(context: &Value, name: &str) -> String {
    match context.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn format_date(context: &Value, name: &str, format: &str) -> String {
    let parsed: Option<DateTime<Utc>> = match context.get(name) {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Some(Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    };
    match parsed {
        Some(dt) => dt.format(format).to_string(),
        None => lookup(context, name),
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
}

fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            for ch in chars.by_ref() {
                if ch == '"' {
                    break;
                }
                literal.push(ch);
            }
            tokens.push(Token::Literal(literal));
        } else {
            let mut ident = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '"' {
                    break;
                }
                ident.push(ch);
                chars.next();
            }
            tokens.push(Token::Ident(ident));
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_variables() {
        let ctx = json!({ "name": "Ana" });
        assert_eq!(interpolate("Hello {{name}}", &ctx), "Hello Ana");
    }

    #[test]
    fn unknown_variable_renders_empty() {
        let ctx = json!({});
        assert_eq!(interpolate("Hello {{name}}!", &ctx), "Hello !");
    }

    #[test]
    fn default_helper_uses_fallback_when_absent() {
        let ctx = json!({});
        assert_eq!(
            interpolate(r#"Hello {{default name "User"}}"#, &ctx),
            "Hello User"
        );
    }

    #[test]
    fn default_helper_prefers_present_value() {
        let ctx = json!({ "name": "Ana" });
        assert_eq!(
            interpolate(r#"Hello {{default name "User"}}"#, &ctx),
            "Hello Ana"
        );
    }

    #[test]
    fn eq_helper_branches() {
        let ctx = json!({ "status": "accepted" });
        let tpl = r#"{{eq status "accepted" "Congratulations" "Update"}}"#;
        assert_eq!(interpolate(tpl, &ctx), "Congratulations");

        let ctx = json!({ "status": "rejected" });
        assert_eq!(interpolate(tpl, &ctx), "Update");
    }

    #[test]
    fn date_helper_formats_rfc3339() {
        let ctx = json!({ "starts_at": "2026-03-14T09:30:00Z" });
        assert_eq!(
            interpolate(r#"{{date starts_at "%Y-%m-%d %H:%M"}}"#, &ctx),
            "2026-03-14 09:30"
        );
    }

    #[test]
    fn date_helper_formats_epoch_millis() {
        let ctx = json!({ "ts": 0 });
        assert_eq!(interpolate(r#"{{date ts "%Y"}}"#, &ctx), "1970");
    }

    #[test]
    fn date_helper_passes_through_garbage() {
        let ctx = json!({ "ts": "not-a-date" });
        assert_eq!(interpolate(r#"{{date ts "%Y"}}"#, &ctx), "not-a-date");
    }

    #[test]
    fn numbers_and_bools_stringify() {
        let ctx = json!({ "count": 3, "ok": true });
        assert_eq!(interpolate("{{count}} {{ok}}", &ctx), "3 true");
    }

    #[test]
    fn malformed_expression_renders_empty() {
        let ctx = json!({ "a": "x" });
        assert_eq!(interpolate("{{default a}}", &ctx), "");
    }

    #[test]
    fn unterminated_braces_pass_through() {
        let ctx = json!({});
        assert_eq!(interpolate("Hello {{name", &ctx), "Hello {{name");
    }

    #[test]
    fn plain_text_untouched() {
        let ctx = json!({});
        assert_eq!(interpolate("No variables here", &ctx), "No variables here");
    }
}
