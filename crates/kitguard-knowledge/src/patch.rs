use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffOp, TextDiff};
use std::fmt::Write as _;
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// Lines of unchanged context around each hunk.
pub const CONTEXT_LINES: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed hunk header at line {line}: {header}")]
    MalformedHeader { line: usize, header: String },

    #[error("unexpected patch line {line}: {content:?}")]
    UnexpectedLine { line: usize, content: String },

    #[error("hunk at line {line} does not match its header counts")]
    CountMismatch { line: usize },

    #[error("hunk expects {expected:?} at line {line} but found {found:?}")]
    ContextMismatch {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("hunk starting at line {line} is out of order or past end of file")]
    OutOfRange { line: usize },
}

/// Added/removed line counts of a patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchStats {
    pub additions: usize,
    pub deletions: usize,
}

/// Build a unified diff turning `original` into `modified`.
///
/// Returns an empty string when the two are identical. Lines keep their own
/// terminators; a last line without one is followed by the conventional
/// `\ No newline at end of file` marker, so the patch reproduces `modified`
/// byte for byte. If the grouped hunks fail to reproduce it, a single hunk
/// replacing the whole file is emitted instead.
pub fn create_patch(file: &str, original: &str, modified: &str) -> (String, PatchStats) {
    let (text, stats) = grouped_patch(file, original, modified);
    if reproduces(&text, original, modified) {
        return (text, stats);
    }

    debug!(file, "Grouped hunks did not reproduce the new content, using a whole-file hunk");
    whole_file_patch(file, original, modified)
}

/// Whether `text` parses and turns `original` into exactly `modified`.
pub fn reproduces(text: &str, original: &str, modified: &str) -> bool {
    Patch::parse(text)
        .and_then(|patch| patch.apply(original))
        .map_or(false, |out| out == modified)
}

fn grouped_patch(file: &str, original: &str, modified: &str) -> (String, PatchStats) {
    let diff = TextDiff::from_lines(original, modified);
    let mut stats = PatchStats::default();
    let mut out = String::new();

    let groups: Vec<Vec<DiffOp>> = diff
        .grouped_ops(CONTEXT_LINES)
        .into_iter()
        .filter(|group| group.iter().any(|op| !matches!(op, DiffOp::Equal { .. })))
        .collect();

    if groups.is_empty() {
        return (out, stats);
    }

    write_file_header(&mut out, file);

    for group in &groups {
        // Ops in a group are not guaranteed to be ordered on both sides.
        let (Some(old), Some(new)) = (
            span(group.iter().map(DiffOp::old_range)),
            span(group.iter().map(DiffOp::new_range)),
        ) else {
            continue;
        };
        let _ = writeln!(out, "@@ -{} +{} @@", format_range(old), format_range(new));

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => {
                        stats.deletions += 1;
                        '-'
                    }
                    ChangeTag::Insert => {
                        stats.additions += 1;
                        '+'
                    }
                };
                push_line(&mut out, sign, change.value());
            }
        }
    }

    (out, stats)
}

/// One hunk removing every original line and adding every modified one.
fn whole_file_patch(file: &str, original: &str, modified: &str) -> (String, PatchStats) {
    let mut out = String::new();
    if original == modified {
        return (out, PatchStats::default());
    }

    let old = split_lines(original);
    let new = split_lines(modified);
    write_file_header(&mut out, file);
    let _ = writeln!(
        out,
        "@@ -{} +{} @@",
        format_range(0..old.len()),
        format_range(0..new.len())
    );
    for line in &old {
        push_line(&mut out, '-', line);
    }
    for line in &new {
        push_line(&mut out, '+', line);
    }

    (
        out,
        PatchStats {
            additions: new.len(),
            deletions: old.len(),
        },
    )
}

fn span(ranges: impl Iterator<Item = Range<usize>>) -> Option<Range<usize>> {
    ranges.fold(None, |acc, r| match acc {
        None => Some(r),
        Some(acc) => Some(acc.start.min(r.start)..acc.end.max(r.end)),
    })
}

fn write_file_header(out: &mut String, file: &str) {
    let _ = writeln!(out, "--- a/{}", file);
    let _ = writeln!(out, "+++ b/{}", file);
}

fn push_line(out: &mut String, sign: char, value: &str) {
    out.push(sign);
    out.push_str(value);
    if !value.ends_with(['\n', '\r']) {
        out.push('\n');
        out.push_str(NO_NEWLINE_MARKER);
        out.push('\n');
    }
}

/// `start,len` in unified diff notation (1-based; a zero-length range names
/// the line before it).
fn format_range(range: Range<usize>) -> String {
    let len = range.end - range.start;
    let start = if len == 0 { range.start } else { range.start + 1 };
    if len == 1 {
        start.to_string()
    } else {
        format!("{},{}", start, len)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatchLine {
    Context(String),
    Removed(String),
    Added(String),
}

impl PatchLine {
    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Context(t) | Self::Removed(t) | Self::Added(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
struct Hunk {
    /// 0-based index of the first original line the hunk covers
    old_start: usize,
    old_len: usize,
    new_len: usize,
    /// Line of the header within the patch text, for error messages
    header_line: usize,
    lines: Vec<PatchLine>,
}

impl Hunk {
    fn parse_header(header: &str, line: usize) -> Result<Self, PatchError> {
        let malformed = || PatchError::MalformedHeader {
            line,
            header: header.to_string(),
        };

        let body = header
            .strip_prefix("@@ ")
            .and_then(|rest| rest.split(" @@").next())
            .ok_or_else(malformed)?;
        let mut parts = body.split_whitespace();
        let old = parts
            .next()
            .and_then(|p| p.strip_prefix('-'))
            .ok_or_else(malformed)?;
        let new = parts
            .next()
            .and_then(|p| p.strip_prefix('+'))
            .ok_or_else(malformed)?;

        let (old_start, old_len) = parse_range(old).ok_or_else(malformed)?;
        let (_, new_len) = parse_range(new).ok_or_else(malformed)?;

        let old_start = if old_len == 0 {
            old_start
        } else {
            old_start.checked_sub(1).ok_or_else(malformed)?
        };

        Ok(Self {
            old_start,
            old_len,
            new_len,
            header_line: line,
            lines: Vec::new(),
        })
    }

    fn check_counts(&self) -> Result<(), PatchError> {
        let old = self
            .lines
            .iter()
            .filter(|l| !matches!(l, PatchLine::Added(_)))
            .count();
        let new = self
            .lines
            .iter()
            .filter(|l| !matches!(l, PatchLine::Removed(_)))
            .count();
        if old != self.old_len || new != self.new_len {
            return Err(PatchError::CountMismatch {
                line: self.header_line,
            });
        }
        Ok(())
    }
}

/// Split after every `\n`, `\r\n` or lone `\r`, keeping terminators.
///
/// Matches how `similar` tokenizes lines, so patch text and file content
/// are cut at the same places.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                lines.push(&text[start..i + 2]);
                i += 2;
                start = i;
            }
            b'\r' | b'\n' => {
                lines.push(&text[start..i + 1]);
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// A parsed unified diff for a single file.
#[derive(Debug, Clone)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

impl Patch {
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut current: Option<Hunk> = None;

        for (idx, raw) in split_lines(text).into_iter().enumerate() {
            let line = idx + 1;

            if raw.starts_with("@@") {
                if let Some(hunk) = current.take() {
                    hunk.check_counts()?;
                    hunks.push(hunk);
                }
                current = Some(Hunk::parse_header(raw.trim_end(), line)?);
                continue;
            }

            let Some(hunk) = current.as_mut() else {
                // File headers before the first hunk
                if raw.starts_with("---")
                    || raw.starts_with("+++")
                    || raw.starts_with("diff ")
                    || raw.starts_with("index ")
                    || raw.starts_with("Index:")
                    || raw.starts_with("===")
                    || raw.trim().is_empty()
                {
                    continue;
                }
                return Err(PatchError::UnexpectedLine {
                    line,
                    content: raw.to_string(),
                });
            };

            let mut chars = raw.chars();
            let tag = chars.next();
            let body = chars.as_str().to_string();
            match tag {
                Some(' ') => hunk.lines.push(PatchLine::Context(body)),
                Some('-') => hunk.lines.push(PatchLine::Removed(body)),
                Some('+') => hunk.lines.push(PatchLine::Added(body)),
                Some('\\') => {
                    if let Some(last) = hunk.lines.last_mut() {
                        let text = last.text_mut();
                        if text.ends_with('\n') {
                            text.pop();
                        }
                    }
                }
                _ => {
                    return Err(PatchError::UnexpectedLine {
                        line,
                        content: raw.to_string(),
                    })
                }
            }
        }

        if let Some(hunk) = current.take() {
            hunk.check_counts()?;
            hunks.push(hunk);
        }

        Ok(Self { hunks })
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn hunk_count(&self) -> usize {
        self.hunks.len()
    }

    /// Apply the patch to `original`, verifying every context and removed line.
    pub fn apply(&self, original: &str) -> Result<String, PatchError> {
        let lines = split_lines(original);
        let mut out = String::with_capacity(original.len());
        let mut cursor = 0;

        for hunk in &self.hunks {
            if hunk.old_start < cursor || hunk.old_start > lines.len() {
                return Err(PatchError::OutOfRange {
                    line: hunk.old_start + 1,
                });
            }
            for line in &lines[cursor..hunk.old_start] {
                out.push_str(line);
            }

            let mut pos = hunk.old_start;
            for patch_line in &hunk.lines {
                match patch_line {
                    PatchLine::Context(expected) | PatchLine::Removed(expected) => {
                        let found = lines.get(pos).copied();
                        if found != Some(expected.as_str()) {
                            return Err(PatchError::ContextMismatch {
                                line: pos + 1,
                                expected: expected.clone(),
                                found: found.unwrap_or("<end of file>").to_string(),
                            });
                        }
                        if matches!(patch_line, PatchLine::Context(_)) {
                            out.push_str(expected);
                        }
                        pos += 1;
                    }
                    PatchLine::Added(text) => out.push_str(text),
                }
            }
            cursor = pos;
        }

        for line in &lines[cursor..] {
            out.push_str(line);
        }

        Ok(out)
    }
}
