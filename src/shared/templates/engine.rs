use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::core::error::AppError;

/// Global template environment
static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

const TEMPLATES: &[(&str, &str)] = &[
    (
        "admin/base.html.jinja",
        include_str!("../../../templates/admin/base.html.jinja"),
    ),
    (
        "admin/pagination.html.jinja",
        include_str!("../../../templates/admin/pagination.html.jinja"),
    ),
    (
        "admin/settings.html.jinja",
        include_str!("../../../templates/admin/settings.html.jinja"),
    ),
    (
        "admin/files.html.jinja",
        include_str!("../../../templates/admin/files.html.jinja"),
    ),
    (
        "admin/logs.html.jinja",
        include_str!("../../../templates/admin/logs.html.jinja"),
    ),
    (
        "admin/instructions.html.jinja",
        include_str!("../../../templates/admin/instructions.html.jinja"),
    ),
];

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to render template: {0}")]
    RenderError(String),
}

impl From<TemplateError> for AppError {
    fn from(e: TemplateError) -> Self {
        tracing::error!("Template error: {}", e);
        AppError::Internal(e.to_string())
    }
}

fn init_environment() -> Environment<'static> {
    let mut env = Environment::new();
    // Every template is HTML, whatever the `.jinja` suffix suggests
    env.set_auto_escape_callback(|_| AutoEscape::Html);

    for (name, source) in TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            tracing::warn!("Failed to load template {}: {}", name, e);
        } else {
            tracing::debug!("Loaded template: {}", name);
        }
    }
    env
}

fn get_environment() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(init_environment)
}

/// Render a template with any serializable context.
pub fn render_template<S: Serialize>(template_name: &str, ctx: S) -> Result<String, TemplateError> {
    let template = get_environment()
        .get_template(template_name)
        .map_err(|_| TemplateError::NotFound(template_name.to_string()))?;

    template
        .render(ctx)
        .map_err(|e| TemplateError::RenderError(e.to_string()))
}

pub fn template_exists(template_name: &str) -> bool {
    get_environment().get_template(template_name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_all_templates_load() {
        for (name, _) in TEMPLATES {
            assert!(template_exists(name), "{name} failed to load");
        }
    }

    #[test]
    fn test_unknown_template() {
        assert!(matches!(
            render_template("admin/nope.html.jinja", context! {}),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn test_output_is_html_escaped() {
        let html = render_template(
            "admin/instructions.html.jinja",
            context! {
                title => "<script>",
                active => "instructions",
                base_url => "https://forms.example.org",
                allowed_roles => vec!["administrator"],
            },
        )
        .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<title><script>"));
    }
}
