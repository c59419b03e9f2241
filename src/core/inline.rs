//! Email template CSS inlining.
//!
//! Email clients ignore `<style>` blocks, so the production templates are
//! post-processed: every `<name>.source.html` in the templates directory gets
//! the shared stylesheet's rules inlined into per-element `style` attributes
//! and is written back as `<name>.html`.
//!
//! The inliner percent-encodes template placeholders that appear inside URL
//! attributes, so a fixed set of encoded marker substrings is restored after
//! inlining to keep the downstream templating syntax literal.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::log_status;
use crate::utils::io;

/// Fixed production locations, relative to the service root.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates/emails";
pub const DEFAULT_CSS_PATH: &str = "templates/emails/email.css";

const SOURCE_SUFFIX: &str = ".source.html";

/// Percent-encoded placeholder markers and their literal forms.
/// Longest patterns first so the spaced forms win over the bare braces.
const PLACEHOLDER_FIXUPS: [(&str, &str); 4] = [
    ("%7B%7B%20", "{{ "),
    ("%20%7D%7D", " }}"),
    ("%7B%7B", "{{"),
    ("%7D%7D", "}}"),
];

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResult {
    pub name: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineReport {
    pub templates: Vec<TemplateResult>,
}

/// Discover template base names: every `<name>.source.html` directly under
/// the templates directory. Anything else is ignored.
pub fn discover_templates(templates_dir: &Path) -> Result<Vec<String>> {
    if !templates_dir.is_dir() {
        return Err(Error::template_dir_invalid(
            templates_dir.display().to_string(),
            "not a directory",
        ));
    }

    let pattern = templates_dir.join(format!("*{}", SOURCE_SUFFIX));
    let pattern = pattern.to_string_lossy().to_string();
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::internal_io(e.to_string(), Some("glob templates".to_string())))?;

    let mut names = Vec::new();
    for entry in entries {
        let path =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some("glob templates".to_string())))?;
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(name) = file_name.strip_suffix(SOURCE_SUFFIX) {
                names.push(name.to_string());
            }
        }
    }

    Ok(names)
}

/// Undo the percent-encoding the inliner applied to placeholder markers.
pub fn restore_placeholders(html: &str) -> String {
    let mut restored = html.to_string();
    for (encoded, literal) in PLACEHOLDER_FIXUPS {
        restored = restored.replace(encoded, literal);
    }
    restored
}

fn inline_html(source: &str, css: &str, template: &str) -> Result<String> {
    let inliner = css_inline::CSSInliner::options()
        .load_remote_stylesheets(false)
        .extra_css(Some(css.into()))
        .build();

    inliner
        .inline(source)
        .map_err(|e| Error::template_inline_failed(template, e.to_string()))
}

/// Inline one template and write the sibling output file.
pub fn inline_template(templates_dir: &Path, name: &str, css: &str) -> Result<TemplateResult> {
    let source_path = templates_dir.join(format!("{}{}", name, SOURCE_SUFFIX));
    let output_path = templates_dir.join(format!("{}.html", name));

    let source = io::read_file(&source_path, "read template source")?;
    let inlined = inline_html(&source, css, name)?;
    let restored = restore_placeholders(&inlined);
    io::write_file(&output_path, &restored, "write inlined template")?;

    log_status!("inline", "Wrote {}", output_path.display());

    Ok(TemplateResult {
        name: name.to_string(),
        output_path: output_path.display().to_string(),
    })
}

/// Inline every discovered template against the shared stylesheet.
///
/// Templates are independent; any failure aborts the run and leaves already
/// written outputs in place.
pub fn run(templates_dir: &Path, css_path: &Path) -> Result<InlineReport> {
    let css = io::read_file(css_path, "read stylesheet")?;
    let names = discover_templates(templates_dir)?;

    let mut templates = Vec::with_capacity(names.len());
    for name in names {
        templates.push(inline_template(templates_dir, &name, &css)?);
    }

    Ok(InlineReport { templates })
}
