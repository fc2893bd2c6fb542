//! Name templates.
//!
//! User configured names such as `{{ .ProjectName }}_{{ .Version }}_{{ .Os }}`
//! are rendered through a [`TemplateEngine`]. The built in [`SimpleTemplate`]
//! understands field lookups, `.Env.NAME` lookups and `if`/`else`/`end`
//! blocks, which covers every template shipwright itself uses.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").expect("static regex is valid")
});

/// Values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    values: BTreeMap<String, String>,
    env: BTreeMap<String, String>,
}

impl Fields {
    /// Creates an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets a field in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Replaces the `.Env` map.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Looks up a dotted field reference such as `.Version` or `.Env.HOME`.
    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<&str> {
        let name = reference.strip_prefix('.')?;
        if let Some(key) = name.strip_prefix("Env.") {
            return Some(self.env.get(key).map_or("", String::as_str));
        }
        self.values.get(name).map(String::as_str)
    }
}

/// Renders user supplied templates.
pub trait TemplateEngine: Send + Sync + std::fmt::Debug {
    /// Renders `template` against `fields`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] when the template is malformed or refers
    /// to an unknown field.
    fn apply(&self, template: &str, fields: &Fields) -> Result<String>;
}

/// Minimal Go-template compatible renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTemplate;

#[derive(Debug)]
struct Block {
    parent_active: bool,
    condition: bool,
    in_else: bool,
}

impl Block {
    const fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

impl SimpleTemplate {
    fn resolve<'a>(template: &str, fields: &'a Fields, reference: &str) -> Result<&'a str> {
        fields.lookup(reference).ok_or_else(|| {
            let key = reference.trim_start_matches('.');
            Error::template(template, format!("map has no entry for key \"{key}\""))
        })
    }
}

impl TemplateEngine for SimpleTemplate {
    fn apply(&self, template: &str, fields: &Fields) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut blocks: Vec<Block> = Vec::new();
        let mut last = 0;
        let active = |blocks: &[Block]| blocks.last().is_none_or(Block::active);

        for caps in ACTION.captures_iter(template) {
            let (Some(whole), Some(action)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if active(&blocks) {
                out.push_str(&template[last..whole.start()]);
            }
            last = whole.end();

            let action = action.as_str();
            let mut words = action.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("if"), Some(reference), None) if reference.starts_with('.') => {
                    let value = Self::resolve(template, fields, reference)?;
                    blocks.push(Block {
                        parent_active: active(&blocks),
                        condition: !value.is_empty(),
                        in_else: false,
                    });
                }
                (Some("else"), None, None) => match blocks.last_mut() {
                    Some(block) if !block.in_else => block.in_else = true,
                    _ => return Err(Error::template(template, "unexpected {{else}}")),
                },
                (Some("end"), None, None) => {
                    if blocks.pop().is_none() {
                        return Err(Error::template(template, "unexpected {{end}}"));
                    }
                }
                (Some(reference), None, None) if reference.starts_with('.') => {
                    let value = Self::resolve(template, fields, reference)?;
                    if active(&blocks) {
                        out.push_str(value);
                    }
                }
                _ => {
                    return Err(Error::template(
                        template,
                        format!("unsupported action \"{action}\""),
                    ));
                }
            }
        }

        if !blocks.is_empty() {
            return Err(Error::template(template, "unexpected EOF, missing {{end}}"));
        }
        if template[last..].contains("{{") {
            return Err(Error::template(template, "unclosed action"));
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Fields {
        Fields::new()
            .with("ProjectName", "app")
            .with("Version", "1.2.3")
            .with("Os", "linux")
            .with("Arch", "arm")
            .with("Arm", "7")
            .with("Empty", "")
            .with_env(BTreeMap::from([("USER".to_string(), "ci".to_string())]))
    }

    #[test]
    fn test_fields_and_env() {
        let out = SimpleTemplate
            .apply("{{ .ProjectName }}_{{.Version}}-{{ .Env.USER }}{{ .Env.MISSING }}", &fields())
            .unwrap();
        assert_eq!(out, "app_1.2.3-ci");
    }

    #[test]
    fn test_conditionals() {
        let tpl = "{{ .Os }}_{{ .Arch }}{{ if .Arm }}v{{ .Arm }}{{ end }}";
        assert_eq!(SimpleTemplate.apply(tpl, &fields()).unwrap(), "linux_armv7");

        let tpl = "{{ if .Empty }}yes{{ else }}no{{ end }}";
        assert_eq!(SimpleTemplate.apply(tpl, &fields()).unwrap(), "no");

        let tpl = concat!(
            "{{ if .Empty }}{{ if .Arm }}a{{ end }}",
            "{{ else }}{{ if .Arm }}b{{ else }}c{{ end }}{{ end }}"
        );
        assert_eq!(SimpleTemplate.apply(tpl, &fields()).unwrap(), "b");
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let err = SimpleTemplate.apply("{{ .Nope }}", &fields()).unwrap_err();
        assert!(err.to_string().contains("{{ .Nope }}"));
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(SimpleTemplate.apply("{{ if .Arm }}x", &fields()).is_err());
        assert!(SimpleTemplate.apply("{{ end }}", &fields()).is_err());
        assert!(SimpleTemplate.apply("{{ .Version ", &fields()).is_err());
        assert!(SimpleTemplate.apply("{{ .Version | upper }}", &fields()).is_err());
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(SimpleTemplate.apply("dist", &fields()).unwrap(), "dist");
    }
}
