//! Prompt filling.
//!
//! Templates are free-form text authored outside this crate, so filling is
//! plain literal substitution with no templating language:
//! - `{CODE HERE}` receives the source text; `{}` is used only when the
//!   template has no `{CODE HERE}`
//! - the in-repo reference path [`REFERENCE_PATH_PLACEHOLDER`] becomes the
//!   real file path
//! - templates with neither code marker get the code appended after a blank line

/// Primary code marker.
pub const CODE_MARKER: &str = "{CODE HERE}";

/// Bare marker, honoured only when [`CODE_MARKER`] is absent.
pub const BARE_MARKER: &str = "{}";

/// Example path the templates were authored against.
pub const REFERENCE_PATH_PLACEHOLDER: &str = "/server.js";

/// Characters of a template kept in report previews.
pub const PREVIEW_CHARS: usize = 100;

/// Fills `template` for one file.
///
/// `vars` are extra `{KEY}` placeholders. They and the reference path are
/// substituted into the template text before the code goes in, so the
/// source text itself is never rewritten.
pub fn fill(template: &str, file_path: &str, code: &str, vars: &[(String, String)]) -> String {
    let mut text = template.replace(REFERENCE_PATH_PLACEHOLDER, file_path);
    for (key, value) in vars {
        if key.is_empty() {
            continue;
        }
        text = text.replace(&format!("{{{key}}}"), value);
    }

    if text.contains(CODE_MARKER) {
        text.replace(CODE_MARKER, code)
    } else if text.contains(BARE_MARKER) {
        text.replace(BARE_MARKER, code)
    } else {
        format!("{text}\n\n{code}")
    }
}

/// First [`PREVIEW_CHARS`] characters of a template, with `...` when cut.
pub fn preview(template: &str) -> String {
    match template.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &template[..cut]),
        None => template.to_string(),
    }
}
