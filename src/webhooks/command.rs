//! Detection of the `/easycla` re-check command in comment text.

/// The command, compared case-insensitively.
pub const RECHECK_COMMAND: &str = "/easycla";

/// Whether `text` contains `/easycla` as a standalone token.
///
/// The command must not be preceded by an alphanumeric character or `/`,
/// and must not be followed by an alphanumeric character, `-` or `_`.
///
/// ```
/// use cla_connect::webhooks::contains_recheck_command;
///
/// assert!(contains_recheck_command("/easycla"));
/// assert!(contains_recheck_command("please re-run\n/EasyCLA."));
/// assert!(!contains_recheck_command("see docs/easycla"));
/// assert!(!contains_recheck_command("/easyclaim"));
/// ```
pub fn contains_recheck_command(text: &str) -> bool {
    let mut search_pos = 0;
    while let Some(offset) = text[search_pos..].find('/') {
        let abs_pos = search_pos + offset;
        let end = abs_pos + RECHECK_COMMAND.len();
        if let Some(candidate) = text.get(abs_pos..end)
            && candidate.eq_ignore_ascii_case(RECHECK_COMMAND)
            && left_boundary(text, abs_pos)
            && right_boundary(text, end)
        {
            return true;
        }
        search_pos = abs_pos + 1;
    }
    false
}

fn left_boundary(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_alphanumeric() && c != '/')
}

fn right_boundary(text: &str, pos: usize) -> bool {
    text[pos..]
        .chars()
        .next()
        .is_none_or(|c| !c.is_alphanumeric() && c != '-' && c != '_')
}
