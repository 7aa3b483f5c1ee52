//! Template renderer - `{{key}}` substitution over the campaign data bag

use regex::Regex;
use serde_json::Value;

/// Renders campaign templates against their data bag.
///
/// Rendering never fails: degenerate input passes through as-is, and
/// placeholders that resolve to nothing are removed (mirroring the
/// render-or-raw fallback contract of the message pipeline).
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render a template with the campaign data bag plus the implicit
    /// `to` variable carrying the recipient address.
    pub fn render(&self, template: &str, data: &Value, to: &str) -> String {
        let mut result = template.to_string();

        result = result.replace("{{to}}", to);

        if let Some(bag) = data.as_object() {
            for (key, value) in bag {
                let placeholder = format!("{{{{{}}}}}", key);
                let value_str = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => String::new(),
                    _ => value.to_string(),
                };
                result = result.replace(&placeholder, &value_str);
            }
        }

        remove_unused_placeholders(&result)
    }
}

/// Remove placeholders left unresolved by the data bag
fn remove_unused_placeholders(content: &str) -> String {
    let re = Regex::new(r"\{\{[^}]+\}\}").unwrap();
    re.replace_all(content, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_basic() {
        let renderer = TemplateRenderer::new();
        let data = serde_json::json!({"name": "Ada", "plan": "premium"});

        let result = renderer.render(
            "Hello {{name}} ({{to}}), you are on {{plan}}.",
            &data,
            "ada@x.com",
        );
        assert_eq!(result, "Hello Ada (ada@x.com), you are on premium.");
    }

    #[test]
    fn test_render_removes_unresolved() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("Hi {{name}},{{unknown}} bye", &serde_json::json!({}), "a@x.com");
        assert_eq!(result, "Hi , bye");
    }

    #[test]
    fn test_render_non_object_bag_passthrough() {
        let renderer = TemplateRenderer::new();
        let result = renderer.render("plain text", &serde_json::json!("not a map"), "a@x.com");
        assert_eq!(result, "plain text");
    }

    #[test]
    fn test_render_number_and_bool_values() {
        let renderer = TemplateRenderer::new();
        let data = serde_json::json!({"count": 3, "beta": true});
        let result = renderer.render("{{count}} items, beta={{beta}}", &data, "a@x.com");
        assert_eq!(result, "3 items, beta=true");
    }
}
