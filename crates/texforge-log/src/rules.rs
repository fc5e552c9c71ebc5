//! Line classification tables.
//!
//! Label rules are evaluated in declaration order; the first match decides
//! the severity and how the summary is extracted. Detail and ignorable
//! patterns are consulted by the parser for lines that carry no label.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::message::Severity;

/// How a matching label rule turns the segment into a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extract {
    /// The `msg` capture group.
    Message,
    /// `"<name>: <msg>"`, for package/class scoped labels.
    Qualified,
    /// The whole segment.
    Whole,
}

/// One entry in the ordered label table.
#[derive(Debug, Clone, Copy)]
pub struct LabelRule {
    pub name: &'static str,
    pub pattern: &'static str,
    pub severity: Severity,
    pub extract: Extract,
}

pub const LABEL_RULES: &[LabelRule] = &[
    LabelRule {
        name: "latex_error",
        pattern: r"^! LaTeX Error: (?P<msg>.*)$",
        severity: Severity::Error,
        extract: Extract::Message,
    },
    LabelRule {
        name: "package_error",
        pattern: r"^! Package (?P<name>\S+) Error: (?P<msg>.*)$",
        severity: Severity::Error,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "class_error",
        pattern: r"^! Class (?P<name>\S+) Error: (?P<msg>.*)$",
        severity: Severity::Error,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "tex_error",
        pattern: r"^! (?P<msg>.+)$",
        severity: Severity::Error,
        extract: Extract::Message,
    },
    LabelRule {
        name: "file_line_error",
        pattern: r"^[^\s:]+\.[A-Za-z]+:\d+: .*$",
        severity: Severity::Error,
        extract: Extract::Whole,
    },
    LabelRule {
        name: "latex_warning",
        pattern: r"^LaTeX Warning: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Message,
    },
    LabelRule {
        name: "latex_font_warning",
        pattern: r"^LaTeX Font Warning: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Message,
    },
    LabelRule {
        name: "package_warning",
        pattern: r"^Package (?P<name>\S+) Warning: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "class_warning",
        pattern: r"^Class (?P<name>\S+) Warning: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "engine_warning",
        pattern: r"^(?P<name>(?i:pdftex|xetex|luatex|dvipdfmx)) warning(?: \([^)]*\))?: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "box_warning",
        pattern: r"^(?:Overfull|Underfull) \\[hv]box .*$",
        severity: Severity::Warning,
        extract: Extract::Whole,
    },
    LabelRule {
        name: "missing_character",
        pattern: r"^Missing character: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Message,
    },
    LabelRule {
        name: "no_output",
        pattern: r"^No pages of output\.$",
        severity: Severity::Warning,
        extract: Extract::Whole,
    },
    LabelRule {
        name: "driver_error",
        pattern: r"^error: (?P<msg>.*)$",
        severity: Severity::Error,
        extract: Extract::Message,
    },
    LabelRule {
        name: "driver_warning",
        pattern: r"^warning: (?P<msg>.*)$",
        severity: Severity::Warning,
        extract: Extract::Message,
    },
    LabelRule {
        name: "package_info",
        pattern: r"^Package (?P<name>\S+) Info: (?P<msg>.*)$",
        severity: Severity::Info,
        extract: Extract::Qualified,
    },
    LabelRule {
        name: "latex_info",
        pattern: r"^LaTeX Info: (?P<msg>.*)$",
        severity: Severity::Info,
        extract: Extract::Message,
    },
    LabelRule {
        name: "latex_font_info",
        pattern: r"^LaTeX Font Info: (?P<msg>.*)$",
        severity: Severity::Info,
        extract: Extract::Message,
    },
    LabelRule {
        name: "driver_note",
        pattern: r"^note: (?P<msg>.*)$",
        severity: Severity::Info,
        extract: Extract::Message,
    },
    LabelRule {
        name: "latexmk",
        pattern: r"^Latexmk: (?P<msg>.*)$",
        severity: Severity::Info,
        extract: Extract::Message,
    },
];

/// Result of matching a segment against the label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatch {
    pub rule: &'static str,
    pub severity: Severity,
    pub summary: String,
}

fn compiled_rules() -> &'static [(Regex, &'static LabelRule)] {
    static RULES: OnceLock<Vec<(Regex, &'static LabelRule)>> = OnceLock::new();
    RULES.get_or_init(|| {
        LABEL_RULES
            .iter()
            .map(|rule| {
                let re = Regex::new(rule.pattern).expect("label rule pattern is valid");
                (re, rule)
            })
            .collect()
    })
}

fn extract(rule: &LabelRule, caps: &Captures<'_>, segment: &str) -> String {
    let group = |name: &str| caps.name(name).map(|m| m.as_str().trim()).unwrap_or_default();
    match rule.extract {
        Extract::Message => group("msg").to_string(),
        Extract::Qualified => format!("{}: {}", group("name"), group("msg")),
        Extract::Whole => segment.trim().to_string(),
    }
}

/// Match a segment against the ordered label table.
pub fn classify(segment: &str) -> Option<LabelMatch> {
    let segment = segment.trim_start();
    compiled_rules().iter().find_map(|(re, rule)| {
        re.captures(segment).map(|caps| LabelMatch {
            rule: rule.name,
            severity: rule.severity,
            summary: extract(rule, &caps, segment),
        })
    })
}

/// Fixed prefixes TeX uses for the help text that follows an error.
const DETAIL_PREFIXES: &[&str] = &[
    "See the ",
    "Type  H <return>",
    "Type X to quit",
    "or enter new name",
    "Enter file name",
    "Try typing",
    "You're in trouble",
    "Your command was ignored",
    "I'm going to ignore",
    "I'm ignoring",
    "The control sequence at the end of the top line",
];

fn detail_pattern() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| {
        Regex::new(
            r"^(?:l\.\d+|\([A-Za-z][\w.@*-]*\)(?:\s|$)|\s+[^\s)]|\[\]|<(?:argument|recently read|inserted text|to be read again|read (?:\d+|\*)|output|write|template|\*)>)",
        )
        .expect("detail pattern is valid")
    })
}

/// Whether a token following `(` names a file rather than starting prose.
pub fn is_path_like(token: &str) -> bool {
    token.contains(['/', '\\', '.'])
}

/// Whether a line, ignoring indentation, starts with a file-inclusion banner.
pub fn opens_file(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('(') else {
        return false;
    };
    if rest.starts_with('"') {
        return true;
    }
    let token = rest
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .next()
        .unwrap_or_default();
    is_path_like(token)
}

/// Whether a raw line continues the current message as a detail line.
pub fn is_detail_line(line: &str) -> bool {
    if opens_file(line) {
        return false;
    }
    detail_pattern().is_match(line) || DETAIL_PREFIXES.iter().any(|p| line.starts_with(p))
}

fn ignorable_pattern() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| {
        let token = r"(?:\[[^\]]*\]?|\{[^}]*\}?|<[^>]*>?|[\]}>])";
        Regex::new(&format!(r"^{token}(?:\s*{token})*$")).expect("ignorable pattern is valid")
    })
}

/// Page markers, font files and map files carry no diagnostic content.
pub fn is_ignorable(segment: &str) -> bool {
    let segment = segment.trim();
    segment.is_empty() || ignorable_pattern().is_match(segment)
}

/// Closing delimiter still owed by a font or map token the segment leaves
/// open, as in `</usr/share/fonts/cmr10.pfb></usr/sh`.
pub fn unclosed_token(segment: &str) -> Option<char> {
    let segment = segment.trim_end();
    [('<', '>'), ('{', '}')].into_iter().find_map(|(open, close)| {
        let opened = segment.rfind(open)?;
        match segment.rfind(close) {
            Some(closed) if closed > opened => None,
            _ => Some(close),
        }
    })
}
