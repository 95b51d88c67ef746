//! Prompt templates with `{{name}}` placeholders

use std::collections::HashMap;

/// Renders `{{name}}` placeholders from a variable map. Unknown
/// placeholders render as empty strings.
#[derive(Debug, Default, Clone)]
pub struct PromptRenderer {
    vars: HashMap<String, String>,
}

impl PromptRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    /// Join a list for display, or use `fallback` when it is empty
    pub fn list_var<I, S>(self, name: &str, items: I, fallback: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = items
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        if joined.is_empty() {
            self.var(name, fallback)
        } else {
            self.var(name, joined)
        }
    }

    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = after[..end].trim();
                    if let Some(value) = self.vars.get(name) {
                        out.push_str(value);
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_simple() {
        let out = PromptRenderer::new().var("name", "World").render("Hello, {{name}}!");
        assert_eq!(out, "Hello, World!");
    }

    #[test]
    fn test_render_missing_variable_empty_string() {
        assert_eq!(PromptRenderer::new().render("Hello, {{ name }}!"), "Hello, !");
    }

    #[test]
    fn test_render_unterminated_placeholder_kept() {
        assert_eq!(PromptRenderer::new().render("a {{b"), "a {{b");
    }

    #[test]
    fn test_list_var_fallback() {
        let empty: Vec<String> = vec![];
        let out = PromptRenderer::new()
            .list_var("skills", ["rust", "go"], "(none)")
            .list_var("musts", empty, "(none)")
            .render("{{skills}} / {{musts}}");
        assert_eq!(out, "rust, go / (none)");
    }
}
