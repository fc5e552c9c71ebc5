//! Detection of "run the engine again" requests in a finished log.

/// Case-insensitive phrases meaning cross-references are not yet stable.
pub const RERUN_PHRASES: &[&str] = &[
    "label(s) may have changed",
    "labels may have changed",
    "citation(s) may have changed",
    "please rerun",
    "rerun to get",
    "there were undefined references",
    "there were undefined citations",
];

/// Continuation tag of the `rerunfilecheck` package. Its outline reminders
/// contain "rerun" but only concern PDF bookmarks.
pub const RERUN_EXCLUSION: &str = "(rerunfilecheck)";

/// The first rerun phrase found in `text`, if any.
pub fn rerun_reason(text: &str) -> Option<&'static str> {
    text.lines()
        .filter(|line| !line.trim_start().starts_with(RERUN_EXCLUSION))
        .find_map(|line| {
            let lower = line.to_lowercase();
            RERUN_PHRASES.iter().copied().find(|phrase| lower.contains(phrase))
        })
}

/// Whether the log asks for another engine pass.
pub fn needs_rerun(text: &str) -> bool {
    rerun_reason(text).is_some()
}
