//! Renders the injectable context block.
//!
//! Rendering is pure: the same profile and result set always produce
//! the same bytes, which is what makes cached blocks exact replays.

use crate::models::{Profile, RankedResult};

const BLOCK_OPEN: &str = "<hindsight-context>";
const BLOCK_CLOSE: &str = "</hindsight-context>";
const PREAMBLE: &str = "Context recalled from earlier sessions for this project.\n\
                        Use it for orientation; do not quote it back verbatim.";

pub struct ContextFormatter;

impl ContextFormatter {
    /// Render the full block: preferences, then project activity, then
    /// recent cross-session context. Sections with nothing to say are
    /// omitted entirely, and when all three are empty the block becomes
    /// the distinct first-contact marker instead.
    pub fn format(
        profile: &Profile,
        results: &[RankedResult],
        project: &str,
        max_item_chars: usize,
    ) -> String {
        let mut sections: Vec<String> = Vec::new();

        if !profile.static_prefs.is_empty() {
            let mut lines = vec!["## User Preferences".to_string()];
            lines.extend(profile.static_prefs.iter().map(|p| format!("- {p}")));
            sections.push(lines.join("\n"));
        }

        if !results.is_empty() {
            let mut lines = vec![format!("## Project Activity: {project}")];
            for result in results {
                lines.push(format!(
                    "- [{}] {}",
                    result.memory_type,
                    truncate_chars(&result.content, max_item_chars)
                ));
            }
            sections.push(lines.join("\n"));
        }

        if !profile.dynamic.is_empty() {
            // Oldest first, so the most recent note sits closest to the
            // new conversation.
            let mut lines = vec!["## Recent Context".to_string()];
            lines.extend(profile.dynamic.iter().map(|e| format!("- {e}")));
            sections.push(lines.join("\n"));
        }

        if sections.is_empty() {
            return Self::empty_marker(project);
        }

        format!(
            "{BLOCK_OPEN}\n{PREAMBLE}\n\n{}\n{BLOCK_CLOSE}",
            sections.join("\n\n")
        )
    }

    /// Marker for "nothing known yet". Distinct from a degraded render,
    /// which still emits whatever sections survived.
    pub fn empty_marker(project: &str) -> String {
        format!(
            "{BLOCK_OPEN}\nNo prior context found for project: {project}\n\
             Memories will be saved as you work.\n{BLOCK_CLOSE}"
        )
    }
}

/// Character-boundary truncation with an ellipsis. Byte slicing would
/// panic mid-codepoint on non-ASCII content.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
