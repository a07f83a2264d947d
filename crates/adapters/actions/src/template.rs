//! `{{path}}` placeholders in action configuration strings.

use serde_json::Value;

use ruleflow_domain::automation::extract_field;

/// Replace every `{{dotted.path}}` in string values of `config` with the
/// matching field of `data`. Unknown paths render as an empty string.
pub(crate) fn render(config: &Value, data: &Value) -> Value {
    match config {
        Value::String(text) => Value::String(render_str(text, data)),
        Value::Array(items) => Value::Array(items.iter().map(|item| render(item, data)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), render(value, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_str(text: &str, data: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = rest[start + 2..start + 2 + len].trim();
        match extract_field(data, path) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    out
}
