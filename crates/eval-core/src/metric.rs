//! Metric-name template renderer (C4, spec §4.4).

use serde_json::Value;
use std::collections::HashMap;

/// Substitutes `{{name}}` with the string coercion of `vars[name]`; missing
/// variables render to the empty string. Never throws: an unclosed `{{`
/// falls back to the raw template untouched, since a malformed metric name
/// must not abort a run that's otherwise passing.
pub fn render_metric(template: &str, vars: &HashMap<String, Value>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
            match template[i + 2..].find("}}") {
                Some(rel_end) => {
                    let name = template[i + 2..i + 2 + rel_end].trim();
                    out.push_str(&coerce(vars.get(name)));
                    i += 2 + rel_end + 2;
                }
                None => return template.to_string(),
            }
        } else {
            let ch = template[i..].chars().next().unwrap_or('\u{0}');
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    out
}

fn coerce(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn substitutes_known_var() {
        let v = vars(&[("category", json!("math")), ("version", json!(2))]);
        assert_eq!(render_metric("{{category}}_{{version}}", &v), "math_2");
    }

    #[test]
    fn missing_var_renders_empty() {
        let v = vars(&[]);
        assert_eq!(render_metric("{{undefinedVar}}", &v), "");
    }

    #[test]
    fn malformed_template_falls_back_to_raw() {
        let v = vars(&[]);
        assert_eq!(render_metric("{{unterminated", &v), "{{unterminated");
    }

    #[test]
    fn rendering_is_idempotent_without_braces() {
        let v = vars(&[("x", json!("y"))]);
        let once = render_metric("plain_text", &v);
        let twice = render_metric(&once, &v);
        assert_eq!(once, twice);
    }
}
