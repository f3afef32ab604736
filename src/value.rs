//! Converts serializable values into template [`Value`]s. Everything handed
//! to a template goes through JSON first, so the template sees exactly the
//! fields the `index.json` files carry.

use gtmpl::Value;
use serde::Serialize;
use std::collections::HashMap;

/// Serializes `value` and converts the result into a template [`Value`].
pub fn to_value<T: Serialize>(value: &T) -> serde_json::Result<Value> {
    Ok(from_json(serde_json::to_value(value)?))
}

pub fn from_json(json: serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (None, Some(u), _) => Value::from(u),
            (None, None, Some(f)) => Value::from(f),
            (None, None, None) => Value::String(n.to_string()),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        Json::Object(fields) => {
            let m: HashMap<String, Value> = fields
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect();
            Value::Object(m)
        }
    }
}

/// Converts an optional URL into a string, or nil.
pub fn option_to_value(opt: Option<&str>) -> Value {
    match opt {
        Some(s) => Value::String(s.to_owned()),
        None => Value::Nil,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use gtmpl::{Context, Template};

    fn execute(template: &str, value: Value) -> Result<String, String> {
        let mut tmpl = Template::default();
        tmpl.parse(template).map_err(|e| e.to_string())?;
        let context = Context::from(value).map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        tmpl.execute(&mut out, &context).map_err(|e| e.to_string())?;
        String::from_utf8(out).map_err(|e| e.to_string())
    }

    #[test]
    fn test_objects_and_arrays() -> Result<(), String> {
        let json = serde_json::json!({
            "title": "Paging",
            "draft": false,
            "tags": ["os", "memory"],
            "next": null,
        });
        let rendered = execute(
            "{{.title}}|{{range .tags}}{{.}},{{end}}|{{if .draft}}draft{{else}}final{{end}}|{{if .next}}x{{end}}",
            from_json(json),
        )?;
        assert_eq!(rendered, "Paging|os,memory,|final|");
        Ok(())
    }

    #[test]
    fn test_scalars() {
        assert!(matches!(from_json(serde_json::Value::Null), Value::Nil));
        assert!(matches!(from_json(serde_json::json!(true)), Value::Bool(true)));
        assert!(matches!(option_to_value(None), Value::Nil));
        assert!(matches!(
            option_to_value(Some("/a/")),
            Value::String(ref s) if s == "/a/"
        ));
    }
}
