//! Streaming state machine over TeX engine output.
//!
//! The engine marks "entering a file" with `(` and "leaving a file" with `)`,
//! but message text can carry parentheses of its own and the engine hard-wraps
//! every line at [`WRAP_WIDTH`] columns. [`LogParser`] is fed one physical line
//! at a time and yields finalized [`DiagnosticMessage`] values:
//!
//! 1. Lines that look like detail lines of the open message are attached whole.
//! 2. Every other line is split into structural tokens (file open/close) and
//!    text segments. A parenthesis is literal while the text it appears in
//!    belongs to a message, or when the token after it is not a path; the
//!    message keeps a count of literal opens still owed a close so a wrapped
//!    sentence can close them on a later line. Page markers and font lists
//!    are dropped, including a font path the engine wrapped mid-token.
//! 3. Text segments are matched against the label table, then tried as a
//!    wrapped continuation of the open message, and otherwise become a new
//!    informational message.

use std::iter::Peekable;
use std::str::Chars;

use tracing::{debug, trace};

use crate::message::{DiagnosticMessage, Severity};
use crate::rules;

/// Column at which TeX engines hard-wrap console and log output.
pub const WRAP_WIDTH: usize = 79;

/// Text segments at most this long read as the tail of a wrapped sentence.
const SHORT_TAIL: usize = 3;

/// Characters that attach to the preceding word without a space.
const CLOSING_PUNCTUATION: &str = ".,;:!?)'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    /// File-inclusion banner; the summary is the path.
    File,
    /// Message text, labeled or not.
    Text,
}

#[derive(Debug)]
struct Pending {
    kind: PendingKind,
    severity: Severity,
    summary: String,
    details: Vec<String>,
    depth: usize,
    literal_owed: usize,
}

impl Pending {
    fn file(path: String, depth: usize) -> Self {
        Self {
            kind: PendingKind::File,
            severity: Severity::Info,
            summary: path,
            details: Vec::new(),
            depth,
            literal_owed: 0,
        }
    }

    fn text(severity: Severity, summary: String, depth: usize, literal_owed: usize) -> Self {
        Self {
            kind: PendingKind::Text,
            severity,
            summary,
            details: Vec::new(),
            depth,
            literal_owed,
        }
    }

    fn finish(self) -> DiagnosticMessage {
        DiagnosticMessage {
            severity: self.severity,
            summary: self.summary,
            details: self.details,
            depth: self.depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Structural `(` followed by a path (possibly empty).
    Open { path: String, at_eol: bool },
    /// Structural `)`.
    Close,
    /// Remainder of a file path the previous line cut off.
    PathTail { tail: String, at_eol: bool },
    /// Non-ignorable text. `owed` counts literal opens left unclosed at the
    /// end of the segment; `first` marks the first segment on the line.
    Text { text: String, owed: usize, first: bool },
}

/// Segments of one physical line.
struct Scan {
    segments: Vec<Segment>,
    /// Closing delimiter of a font or map token cut off at end of line.
    token_open: Option<char>,
}

/// Accumulates one text segment while scanning a line.
struct TextBuf {
    text: String,
    owed: usize,
    carried: bool,
}

impl TextBuf {
    fn new(carried_owed: usize) -> Self {
        Self {
            text: String::new(),
            owed: carried_owed,
            carried: carried_owed > 0,
        }
    }

    /// Parentheses inside message text are literal.
    fn is_textual(&self) -> bool {
        self.carried || !rules::is_ignorable(&self.text)
    }

    fn flush_into(&mut self, segments: &mut Vec<Segment>) {
        let text = self.text.trim();
        if !rules::is_ignorable(text) {
            segments.push(Segment::Text {
                text: text.to_string(),
                owed: self.owed,
                first: segments.is_empty(),
            });
        }
        self.text.clear();
        self.owed = 0;
        self.carried = false;
    }
}

/// Skip the remainder of a font or map token wrapped from the previous line.
/// Returns whether the token is still open at end of line.
fn skip_token_tail(chars: &mut Peekable<Chars<'_>>, close: char) -> bool {
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            return false;
        }
        chars.next();
        if c == close {
            return false;
        }
    }
    true
}

/// Read a path token, stopping before whitespace or a parenthesis.
fn take_path(chars: &mut Peekable<Chars<'_>>, allow_quoted: bool) -> String {
    let mut path = String::new();
    if allow_quoted && chars.peek() == Some(&'"') {
        chars.next();
        for c in chars.by_ref() {
            if c == '"' {
                break;
            }
            path.push(c);
        }
        return path;
    }
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || c == '(' || c == ')' {
            break;
        }
        path.push(c);
        chars.next();
    }
    path
}

fn is_soft_wrap(summary: &str, segment: &str, prev_len: usize) -> bool {
    let Some(first) = segment.chars().next() else {
        return false;
    };
    prev_len >= WRAP_WIDTH
        || (first.is_ascii_digit() && summary.ends_with(|c: char| c.is_ascii_digit()))
        || segment.chars().all(|c| c.is_ascii_punctuation())
        || first.is_lowercase()
        || segment.chars().count() <= SHORT_TAIL
}

fn join_wrapped(summary: &mut String, segment: &str, prev_len: usize, prev_trailing_space: bool) {
    let last = summary.chars().last();
    let first = segment.chars().next();
    let glued = if prev_trailing_space {
        false
    } else if prev_len >= WRAP_WIDTH {
        // The engine broke a contiguous run of characters at the column limit.
        true
    } else {
        match (last, first) {
            (_, Some(c)) if CLOSING_PUNCTUATION.contains(c) => true,
            (Some(l), Some(c)) => l.is_ascii_digit() && c.is_ascii_digit(),
            _ => false,
        }
    };
    if !glued && !summary.is_empty() {
        summary.push(' ');
    }
    summary.push_str(segment);
}

/// Incremental classifier for one output stream.
#[derive(Debug, Default)]
pub struct LogParser {
    depth: usize,
    current: Option<Pending>,
    emitted: usize,
    prev_len: usize,
    prev_trailing_space: bool,
    path_open_at_eol: bool,
    token_open_at_eol: Option<char>,
    after_blank: bool,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current file-inclusion depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of messages finalized so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Feed one physical line; returns the messages it completed.
    pub fn process_line(&mut self, line: &str) -> Vec<DiagnosticMessage> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut out = Vec::new();

        if line.trim().is_empty() {
            self.after_blank = true;
            self.path_open_at_eol = false;
            self.token_open_at_eol = None;
            self.prev_len = 0;
            self.prev_trailing_space = false;
            return out;
        }

        if !self.path_open_at_eol && self.token_open_at_eol.is_none() && self.attach_detail(line) {
            self.end_line(line, false, None);
            return out;
        }

        let scan = self.scan(line);
        if scan.segments.is_empty() {
            // Page markers and font lists leave the text state untouched.
            self.path_open_at_eol = false;
            let full_width = line.chars().count() >= WRAP_WIDTH;
            self.token_open_at_eol = scan.token_open.filter(|_| full_width);
            return out;
        }

        let mut path_at_eol = false;
        for segment in scan.segments {
            path_at_eol = false;
            match segment {
                Segment::Open { path, at_eol } => {
                    self.emit(&mut out);
                    let depth = self.depth;
                    self.depth += 1;
                    if !path.is_empty() {
                        self.current = Some(Pending::file(path, depth));
                        path_at_eol = at_eol;
                    }
                }
                Segment::Close => {
                    self.emit(&mut out);
                    if self.depth == 0 {
                        trace!("close marker at depth zero ignored");
                    }
                    self.depth = self.depth.saturating_sub(1);
                }
                Segment::PathTail { tail, at_eol } => match self.current.as_mut() {
                    Some(pending) if pending.kind == PendingKind::File => {
                        pending.summary.push_str(&tail);
                        path_at_eol = at_eol;
                    }
                    _ => self.text_segment(tail, 0, true, &mut out),
                },
                Segment::Text { text, owed, first } => self.text_segment(text, owed, first, &mut out),
            }
        }

        self.end_line(line, path_at_eol, scan.token_open);
        out
    }

    /// Flush the open message at end of stream.
    pub fn finalize(&mut self) -> Vec<DiagnosticMessage> {
        let mut out = Vec::new();
        self.emit(&mut out);
        if self.depth != 0 {
            debug!(depth = self.depth, "output ended inside unclosed file inclusions");
        }
        self.path_open_at_eol = false;
        self.token_open_at_eol = None;
        self.after_blank = false;
        self.prev_len = 0;
        out
    }

    fn attach_detail(&mut self, line: &str) -> bool {
        match self.current.as_mut() {
            Some(pending) if pending.kind == PendingKind::Text && rules::is_detail_line(line) => {
                pending.details.push(line.trim().to_string());
                true
            }
            _ => false,
        }
    }

    fn scan(&self, line: &str) -> Scan {
        let mut segments = Vec::new();
        let mut chars = line.chars().peekable();

        if let Some(close) = self.token_open_at_eol {
            if skip_token_tail(&mut chars, close) {
                return Scan {
                    segments,
                    token_open: Some(close),
                };
            }
        } else if self.path_open_at_eol {
            let tail = take_path(&mut chars, false);
            if !tail.is_empty() {
                let at_eol = chars.peek().is_none();
                segments.push(Segment::PathTail { tail, at_eol });
            }
        }

        let carried = match &self.current {
            Some(pending) if pending.kind == PendingKind::Text && !self.after_blank => {
                pending.literal_owed
            }
            _ => 0,
        };
        let mut buf = TextBuf::new(carried);

        while let Some(c) = chars.next() {
            match c {
                '(' if buf.is_textual() => {
                    buf.text.push(c);
                    buf.owed += 1;
                }
                '(' => {
                    buf.flush_into(&mut segments);
                    let quoted = chars.peek() == Some(&'"');
                    let path = take_path(&mut chars, true);
                    if quoted || path.is_empty() || rules::is_path_like(&path) {
                        let at_eol = chars.peek().is_none();
                        segments.push(Segment::Open { path, at_eol });
                    } else {
                        // Prose such as "(see the transcript file ...)".
                        buf.text.push(c);
                        buf.text.push_str(&path);
                        buf.owed += 1;
                    }
                }
                ')' if buf.owed > 0 => {
                    buf.text.push(c);
                    buf.owed -= 1;
                }
                ')' => {
                    buf.flush_into(&mut segments);
                    segments.push(Segment::Close);
                }
                _ => buf.text.push(c),
            }
        }
        let token_open = if rules::is_ignorable(&buf.text) {
            rules::unclosed_token(&buf.text)
        } else {
            None
        };
        buf.flush_into(&mut segments);
        Scan { segments, token_open }
    }

    fn text_segment(&mut self, text: String, owed: usize, first: bool, out: &mut Vec<DiagnosticMessage>) {
        if let Some(label) = rules::classify(&text) {
            self.emit(out);
            self.current = Some(Pending::text(label.severity, label.summary, self.depth, owed));
            return;
        }

        if first && !self.after_blank {
            if let Some(pending) = self.current.as_mut() {
                if pending.kind == PendingKind::Text && is_soft_wrap(&pending.summary, &text, self.prev_len) {
                    join_wrapped(&mut pending.summary, &text, self.prev_len, self.prev_trailing_space);
                    pending.literal_owed = owed;
                    return;
                }
            }
        }

        self.emit(out);
        self.current = Some(Pending::text(Severity::Info, text, self.depth, owed));
    }

    fn emit(&mut self, out: &mut Vec<DiagnosticMessage>) {
        if let Some(pending) = self.current.take() {
            self.emitted += 1;
            out.push(pending.finish());
        }
    }

    fn end_line(&mut self, line: &str, path_at_eol: bool, token_open: Option<char>) {
        let len = line.chars().count();
        let banner_open = matches!(&self.current, Some(p) if p.kind == PendingKind::File);
        self.path_open_at_eol = path_at_eol && banner_open && len >= WRAP_WIDTH;
        self.token_open_at_eol = token_open.filter(|_| len >= WRAP_WIDTH);
        self.prev_len = len;
        self.prev_trailing_space = line.ends_with(char::is_whitespace);
        self.after_blank = false;
    }
}

/// Classify a complete output text in one go.
pub fn parse_log(text: &str) -> Vec<DiagnosticMessage> {
    let mut parser = LogParser::new();
    let mut messages = Vec::new();
    for line in text.lines() {
        messages.extend(parser.process_line(line));
    }
    messages.extend(parser.finalize());
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut LogParser, lines: &[&str]) -> Vec<DiagnosticMessage> {
        let mut out = Vec::new();
        for line in lines {
            out.extend(parser.process_line(line));
        }
        out.extend(parser.finalize());
        out
    }

    #[test]
    fn test_digit_continuation_joins_without_space() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &["Reference `X' on page 2 undefined on input line 2", "86."],
        );
        assert_eq!(messages.len(), 1);
        assert!(messages[0].summary.ends_with("line 286."), "{}", messages[0].summary);
    }

    #[test]
    fn test_labeled_warning_digit_continuation() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &["LaTeX Warning: Reference `X' on page 2 undefined on input line 2", "86."],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, Severity::Warning);
        assert_eq!(messages[0].summary, "Reference `X' on page 2 undefined on input line 286.");
    }

    #[test]
    fn test_wrapped_file_banner_is_one_message() {
        let path = format!("./{}/chapter-one.tex", "sections".repeat(12));
        let banner = format!("({path}");
        let (head, tail) = banner.split_at(WRAP_WIDTH);
        let second = format!("{tail})");

        let mut parser = LogParser::new();
        assert!(parser.process_line(head).is_empty());
        let messages = parser.process_line(&second);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].summary, path);
        assert_eq!(messages[0].severity, Severity::Info);
        assert_eq!(messages[0].depth, 0);
        assert!(parser.finalize().is_empty());
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_short_banner_line_is_not_continued() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["(./doc.aux", "\\openout1 = `doc.aux'.", ")"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].summary, "./doc.aux");
        assert_eq!(messages[1].summary, "\\openout1 = `doc.aux'.");
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_literal_parens_inside_message() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                "LaTeX Warning: Citation `knuth' on page 1 undefined (see log) on input line 3.",
                ")",
            ],
        );
        assert_eq!(parser.depth(), 0);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].severity, Severity::Warning);
        assert!(messages[1].summary.contains("(see log)"));
        assert_eq!(messages[1].depth, 1);
    }

    #[test]
    fn test_literal_open_closed_on_next_line() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                "LaTeX Warning: something (wrapped across the",
                "line boundary) here.",
                ")",
            ],
        );
        assert_eq!(parser.depth(), 0);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].summary, "something (wrapped across the line boundary) here.");
    }

    #[test]
    fn test_label_after_open_on_same_line() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["(./doc.tex LaTeX Warning: Empty document.", ")"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].summary, "./doc.tex");
        assert_eq!(messages[0].depth, 0);
        assert_eq!(messages[1].summary, "Empty document.");
        assert_eq!(messages[1].depth, 1);
    }

    #[test]
    fn test_error_collects_details() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "! Undefined control sequence.",
                "l.5 \\foo",
                "         (bar)",
                "",
                "Here is how much of TeX's memory you used:",
            ],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].severity, Severity::Error);
        assert_eq!(messages[0].details, vec!["l.5 \\foo".to_string(), "(bar)".to_string()]);
        assert_eq!(messages[1].severity, Severity::Info);
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_package_continuation_prefix_is_detail() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "Package biblatex Warning: Please (re)run Biber on the file:",
                "(biblatex)                doc",
                "(biblatex)                and rerun LaTeX afterwards.",
            ],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].summary, "biblatex: Please (re)run Biber on the file:");
        assert_eq!(messages[0].details.len(), 2);
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_page_markers_are_ignored() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["[1{/var/lib/texmf/fonts/map/pdftex/updmap/pdftex.map}] [2]"]);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_page_marker_does_not_hide_structure() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["[1] (./doc.aux)"]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].summary, "./doc.aux");
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_depth_clamped_at_zero() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["))", "(./a.tex)"]);
        assert_eq!(parser.depth(), 0);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_nested_inclusions_track_depth() {
        let mut parser = LogParser::new();
        let mut out = Vec::new();
        out.extend(parser.process_line("(./doc.tex (./sec/intro.tex"));
        assert_eq!(parser.depth(), 2);
        out.extend(parser.process_line("LaTeX Warning: Label `a' multiply defined."));
        out.extend(parser.process_line(") (./sec/end.tex)"));
        assert_eq!(parser.depth(), 1);
        out.extend(parser.process_line(")"));
        out.extend(parser.finalize());
        assert_eq!(parser.depth(), 0);

        let depths: Vec<usize> = out.iter().map(|m| m.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
        assert_eq!(parser.emitted(), out.len());
    }

    #[test]
    fn test_quoted_path() {
        let mut parser = LogParser::new();
        let messages = feed(&mut parser, &["(\"./my chapter.tex\")"]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].summary, "./my chapter.tex");
    }

    #[test]
    fn test_unmatched_line_becomes_info() {
        let messages = parse_log("Transcript written on doc.log.");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, Severity::Info);
    }

    #[test]
    fn test_full_width_wrap_glues_words() {
        let head = format!("LaTeX Warning: {}", "x".repeat(WRAP_WIDTH - 15));
        assert_eq!(head.chars().count(), WRAP_WIDTH);
        let messages = parse_log(&format!("{head}\nyz end."));
        assert_eq!(messages.len(), 1);
        assert!(messages[0].summary.ends_with("xxyz end."));
    }

    #[test]
    fn test_wrapped_font_list_is_ignored() {
        let fonts = "</usr/share/texlive/texmf-dist/fonts/type1/public/amsfonts/cm/cmbx12.pfb></usr/";
        assert_eq!(fonts.chars().count(), WRAP_WIDTH);

        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                "LaTeX Warning: There were undefined references.",
                "",
                fonts,
                "share/texlive/texmf-dist/fonts/type1/public/amsfonts/cm/cmr10.pfb>",
                ")",
            ],
        );
        assert_eq!(parser.depth(), 0);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].severity, Severity::Warning);
        assert_eq!(messages[1].summary, "There were undefined references.");
        assert_eq!(messages[1].depth, 1);
    }

    #[test]
    fn test_font_list_after_close_does_not_start_message() {
        let head = format!(" ){}", "</usr/share/texlive/texmf-dist/fonts/type1/public/amsfonts/cm/cmbx12.pfb></us");
        assert_eq!(head.chars().count(), WRAP_WIDTH);

        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                head.as_str(),
                "r/share/texlive/texmf-dist/fonts/type1/public/amsfonts/cm/cmr10.pfb>",
                "Output written on doc.pdf (1 page, 1024 bytes).",
            ],
        );
        let summaries: Vec<&str> = messages.iter().map(|m| m.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["./doc.tex", "Output written on doc.pdf (1 page, 1024 bytes)."]
        );
        assert_eq!(messages[1].depth, 0);
    }

    #[test]
    fn test_ignorable_line_keeps_wrap_state() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &["LaTeX Warning: Empty document.", "", "[1]", "page one text"],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].summary, "Empty document.");
        assert_eq!(messages[1].summary, "page one text");
    }

    #[test]
    fn test_indented_open_after_warning_tracks_depth() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                "LaTeX Warning: foo.",
                " (./chap.tex",
                "LaTeX Warning: inner.",
                ")",
                "LaTeX Warning: after.",
                ")",
            ],
        );
        assert_eq!(parser.depth(), 0);
        let actual: Vec<(&str, usize)> = messages.iter().map(|m| (m.summary.as_str(), m.depth)).collect();
        assert_eq!(
            actual,
            vec![
                ("./doc.tex", 0),
                ("foo.", 1),
                ("./chap.tex", 1),
                ("inner.", 2),
                ("after.", 1),
            ]
        );
        assert!(messages[1].details.is_empty());
    }

    #[test]
    fn test_parenthesised_prose_is_not_a_file() {
        let mut parser = LogParser::new();
        let messages = feed(
            &mut parser,
            &[
                "(./doc.tex",
                "! Emergency stop.",
                "",
                "(see the transcript file for additional information)",
                ")",
            ],
        );
        assert_eq!(parser.depth(), 0);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].severity, Severity::Info);
        assert_eq!(
            messages[2].summary,
            "(see the transcript file for additional information)"
        );
        assert_eq!(messages[2].depth, 1);
    }

    #[test]
    fn test_finalize_returns_open_message_once() {
        let mut parser = LogParser::new();
        assert!(parser.process_line("LaTeX Warning: Empty document.").is_empty());
        assert_eq!(parser.finalize().len(), 1);
        assert!(parser.finalize().is_empty());
    }
}
