//! Human-readable event printing.
//!
//! Templates are plain strings with `{placeholder}` fields:
//! `{id}`, `{id_short}`, `{timestamp}`, `{source}`, `{tags}`, `{content}`.
//! Unknown placeholders are left as written.

// Rust guideline compliant 2026-02

use std::io::Write;

use crate::event::Event;

/// Everything, with the full id.
pub const FULL_FORMAT: &str = "{id}:[{timestamp}]({source}) {tags} - {content}";

/// Source, tags and content only.
pub const SHORT_FORMAT: &str = "[{source}]{tags} - {content}";

/// Like [`FULL_FORMAT`] with the id cut to seven characters.
pub const DEFAULT_FORMAT: &str = "{id_short}:[{timestamp}]({source}) {tags} - {content}";

/// Number of id characters shown by `{id_short}`.
const ID_SHORT_LEN: usize = 7;

/// Resolve a named template (`full`, `short`, `default`); any other value is
/// used as a template itself.
pub fn template(name: &str) -> &str {
    match name {
        "full" => FULL_FORMAT,
        "short" => SHORT_FORMAT,
        "" | "default" => DEFAULT_FORMAT,
        custom => custom,
    }
}

/// Render `event` with `template`. The result always ends in a newline.
pub fn render(event: &Event, template: &str) -> String {
    let mut content = event.content_lossy().into_owned();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    let id_short: String = event.id.chars().take(ID_SHORT_LEN).collect();
    let timestamp = format!("{:.6}", event.timestamp);
    let tags = event.tags.as_deref().unwrap_or_default().join(" ");

    let mut out = String::with_capacity(template.len() + content.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let field = &after[..close];
        match field {
            "id" => out.push_str(&event.id),
            "id_short" => out.push_str(&id_short),
            "timestamp" => out.push_str(&timestamp),
            "source" => out.push_str(&event.source),
            "tags" => out.push_str(&tags),
            "content" => out.push_str(&content),
            _ => {
                out.push('{');
                out.push_str(field);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Write `event` to `out` with `template`.
pub fn print_event(out: &mut impl Write, event: &Event, template: &str) -> std::io::Result<()> {
    out.write_all(render(event, template).as_bytes())
}
