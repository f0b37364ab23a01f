//! Register deltas as replaceable comments.
//!
//! A comment is `<free-form prefix padded to 10> e: <deltas>`. Only the part
//! from the `e:` marker on belongs to us; re-annotating replaces it and
//! leaves the prefix alone.

use crate::host::DebugHost;
use crate::rpc::{RegisterDelta, RegisterDeltas};
use crate::Result;

/// Start of the bridge's part of a comment. Only a whitespace-led (or
/// comment-leading) `e:` is the marker; `e:` inside a word such as `see:`
/// is user text and may appear again in the prefix.
pub const MARKER: &str = "e:";
pub const PREFIX_WIDTH: usize = 10;
pub const NO_CHANGES: &str = "No reg changes";

pub fn is_ip_register(name: &str) -> bool {
    name.eq_ignore_ascii_case("rip") || name.eq_ignore_ascii_case("eip")
}

/// `rax=0x5 rbx=0x1`, or [`NO_CHANGES`].
pub fn render_deltas(regs: &[RegisterDelta]) -> String {
    let rendered: Vec<String> = regs
        .iter()
        .filter(|d| !is_ip_register(&d.name))
        .map(|d| format!("{}={:#x}", d.name, d.value))
        .collect();
    if rendered.is_empty() {
        NO_CHANGES.to_string()
    } else {
        rendered.join(" ")
    }
}

/// The user's part of a comment. The marker only counts at the start of
/// the comment or after whitespace, so `note: ...` is not mistaken for it.
pub fn user_prefix(comment: &str) -> &str {
    let marker = comment.match_indices(MARKER).find(|(i, _)| {
        comment[..*i]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace)
    });
    match marker {
        Some((i, _)) => comment[..i].trim_end(),
        None => comment,
    }
}

pub fn annotated_comment(existing: Option<&str>, regs: &[RegisterDelta]) -> String {
    let prefix = existing.map(user_prefix).unwrap_or("");
    format!(
        "{:<width$} {} {}",
        prefix,
        MARKER,
        render_deltas(regs),
        width = PREFIX_WIDTH
    )
}

/// Write one comment per address. Returns how many comments were written.
pub fn apply_deltas(host: &mut dyn DebugHost, deltas: &RegisterDeltas) -> Result<usize> {
    for (address, regs) in deltas {
        let existing = host.comment(*address);
        let comment = annotated_comment(existing.as_deref(), regs);
        host.set_comment(*address, &comment)?;
    }
    Ok(deltas.len())
}
