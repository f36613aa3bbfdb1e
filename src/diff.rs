//! Diff-based distance between a sample and its reformatted output.
//!
//! ## Pipeline
//!
//! ```text
//! original, formatted
//!     │ Myers line diff
//!     ▼
//! equal / delete / insert lines ── replaced blocks ──► Myers char diff
//!     │
//!     ▼ normalise: merge same tags, deletions before insertions
//! Equal | Edit { delete, insert } | Equal | Edit ...
//!     │
//!     ▼ semantic cleanup: fold short equalities into surrounding edits
//! score = Σ chars(delete) + chars(insert)
//! ```
//!
//! The score is an integer, so identical inputs always produce identical
//! scores and comparisons need no tolerance.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, DiffTag, TextDiff};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Distance between two texts. Zero means identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Score(u64);

impl Score {
    pub const ZERO: Score = Score(0);

    /// Sentinel for a candidate that could not be evaluated.
    pub const WORST: Score = Score(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_perfect(self) -> bool {
        self == Self::ZERO
    }

    pub fn is_worst(self) -> bool {
        self == Self::WORST
    }
}

impl Add for Score {
    type Output = Score;

    /// Saturates at [`Score::WORST`].
    fn add(self, rhs: Score) -> Score {
        Score(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Score {
    fn sum<I: Iterator<Item = Score>>(iter: I) -> Score {
        iter.fold(Score::ZERO, Add::add)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_worst() {
            write!(f, "failed")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Kind of a diff chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkTag {
    Equal,
    Delete,
    Insert,
}

/// A span of text that is equal in both inputs, only in the original
/// (`Delete`) or only in the formatted output (`Insert`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub tag: ChunkTag,
    pub text: String,
}

/// Normalised diff: equalities alternate with edit groups.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Equal(String),
    Edit { delete: String, insert: String },
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_raw(out: &mut Vec<Chunk>, tag: ChunkTag, text: String) {
    if !text.is_empty() {
        out.push(Chunk { tag, text });
    }
}

/// Character diff of one replaced block of lines.
fn char_chunks(old: &str, new: &str, out: &mut Vec<Chunk>) {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(old, new);
    for change in diff.iter_all_changes() {
        let tag = match change.tag() {
            ChangeTag::Equal => ChunkTag::Equal,
            ChangeTag::Delete => ChunkTag::Delete,
            ChangeTag::Insert => ChunkTag::Insert,
        };
        push_raw(out, tag, change.value().to_string());
    }
}

/// Line diff first, refined to characters inside replaced blocks.
fn raw_chunks(original: &str, formatted: &str) -> Vec<Chunk> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(original, formatted);
    let old = diff.old_slices();
    let new = diff.new_slices();
    let join = |slices: &[&str], range: std::ops::Range<usize>| -> String {
        slices.get(range).map(|s| s.concat()).unwrap_or_default()
    };

    let mut out = Vec::new();
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => push_raw(&mut out, ChunkTag::Equal, join(old, old_range)),
            DiffTag::Delete => push_raw(&mut out, ChunkTag::Delete, join(old, old_range)),
            DiffTag::Insert => push_raw(&mut out, ChunkTag::Insert, join(new, new_range)),
            DiffTag::Replace => {
                char_chunks(&join(old, old_range), &join(new, new_range), &mut out);
            }
        }
    }
    out
}

/// Merge adjacent chunks into alternating equal / edit segments.
fn normalize(chunks: Vec<Chunk>) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for chunk in chunks {
        match (chunk.tag, segments.last_mut()) {
            (ChunkTag::Equal, Some(Segment::Equal(text))) => text.push_str(&chunk.text),
            (ChunkTag::Equal, _) => segments.push(Segment::Equal(chunk.text)),
            (ChunkTag::Delete, Some(Segment::Edit { delete, .. })) => delete.push_str(&chunk.text),
            (ChunkTag::Insert, Some(Segment::Edit { insert, .. })) => insert.push_str(&chunk.text),
            (ChunkTag::Delete, _) => segments.push(Segment::Edit {
                delete: chunk.text,
                insert: String::new(),
            }),
            (ChunkTag::Insert, _) => segments.push(Segment::Edit {
                delete: String::new(),
                insert: chunk.text,
            }),
        }
    }
    segments
}

fn edit_weight(segment: &Segment) -> Option<usize> {
    match segment {
        Segment::Edit { delete, insert } => Some(char_len(delete).max(char_len(insert))),
        Segment::Equal(_) => None,
    }
}

/// Fold every equality that is no longer than the edits on both of its
/// sides into one edit, until nothing changes.
///
/// This removes the "confetti" a minimal diff produces when two texts only
/// line up by accident, e.g. a single shared space between two rewritten
/// words.
fn cleanup_semantic(mut segments: Vec<Segment>) -> Vec<Segment> {
    let mut i = 1;
    while i + 1 < segments.len() {
        let fold = match (
            edit_weight(&segments[i - 1]),
            &segments[i],
            edit_weight(&segments[i + 1]),
        ) {
            (Some(before), Segment::Equal(equal), Some(after)) => {
                let len = char_len(equal);
                len <= before && len <= after
            }
            _ => false,
        };

        if !fold {
            i += 1;
            continue;
        }

        let merged: Vec<Segment> = segments.drain(i - 1..=i + 1).collect();
        let mut delete = String::new();
        let mut insert = String::new();
        for segment in merged {
            match segment {
                Segment::Equal(text) => {
                    delete.push_str(&text);
                    insert.push_str(&text);
                }
                Segment::Edit {
                    delete: d,
                    insert: n,
                } => {
                    delete.push_str(&d);
                    insert.push_str(&n);
                }
            }
        }
        segments.insert(i - 1, Segment::Edit { delete, insert });

        // The grown edit may now swallow the equality before it.
        i = if i >= 3 { i - 2 } else { 1 };
    }
    segments
}

fn cleaned(original: &str, formatted: &str) -> Vec<Segment> {
    cleanup_semantic(normalize(raw_chunks(original, formatted)))
}

/// The cleaned diff as equal / delete / insert chunks.
pub fn chunks(original: &str, formatted: &str) -> Vec<Chunk> {
    let mut out = Vec::new();
    for segment in cleaned(original, formatted) {
        match segment {
            Segment::Equal(text) => push_raw(&mut out, ChunkTag::Equal, text),
            Segment::Edit { delete, insert } => {
                push_raw(&mut out, ChunkTag::Delete, delete);
                push_raw(&mut out, ChunkTag::Insert, insert);
            }
        }
    }
    out
}

/// Number of deleted plus inserted characters after semantic cleanup.
pub fn score(original: &str, formatted: &str) -> Score {
    if original == formatted {
        return Score::ZERO;
    }

    let total: usize = cleaned(original, formatted)
        .iter()
        .map(|segment| match segment {
            Segment::Equal(_) => 0,
            Segment::Edit { delete, insert } => char_len(delete) + char_len(insert),
        })
        .sum();
    Score::new(total as u64)
}

/// Render a line-level unified diff, empty when the texts are equal.
pub fn unified(original: &str, formatted: &str, name: &str) -> String {
    if original == formatted {
        return String::new();
    }

    let diff = TextDiff::from_lines(original, formatted);
    let mut out = String::new();
    out.push_str(&format!("--- a/{}\n", name));
    out.push_str(&format!("+++ b/{} (formatted)\n", name));

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        out.push_str(&format!("{}\n", hunk.header()));
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            out.push_str(sign);
            out.push_str(change.value());
            if !change.value().ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}
