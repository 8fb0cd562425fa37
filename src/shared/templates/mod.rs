//! HTML templates for the administration pages.
//!
//! Templates live in `templates/admin/` and use Jinja2 syntax. They are embedded
//! into the binary, so rendering does not depend on the working directory.
//!
//! # Usage
//!
//! ```ignore
//! use minijinja::context;
//! use crate::shared::templates::render_template;
//!
//! let html = render_template("admin/instructions.html.jinja", context! { title => "Instructions" })?;
//! ```

pub mod engine;

pub use engine::{render_template, template_exists, TemplateError};
