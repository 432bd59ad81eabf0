//! Structure-aware text chunkers.
//!
//! [`chunk_source`] splits C# source along type declarations, then along
//! member declarations for any type that is still too large, and packs the
//! resulting pieces into chunks of at most `max_chars` characters.
//!
//! [`chunk_paragraphs`] is the plain-text counterpart used for documentation
//! pages: it splits on `\n\n` paragraph boundaries and hard-splits oversized
//! paragraphs at the nearest newline or space.
//!
//! # Algorithm (`chunk_source`)
//!
//! 1. Cut the text at every line that opens a `class`/`struct`/`interface`/`enum`.
//! 2. Cut any piece longer than `max_chars` again at every line that opens a
//!    member (a visibility modifier at line start).
//!
//!    In both passes attribute lines directly above the declaration move
//!    with it.
//! 3. Append pieces to a running buffer, flushing the buffer whenever the
//!    next piece would push it past `max_chars`.
//! 4. Flush the trailing buffer. Every chunk is trimmed; empty chunks are dropped.
//!
//! A piece with no inner boundary that is still over the limit is emitted
//! whole, so `max_chars` is a soft ceiling.
//!
//! # Example
//!
//! ```rust
//! use unity_context_core::chunk::chunk_source;
//!
//! let chunks = chunk_source("public class A {}\n\npublic class B {}", 1000);
//! assert_eq!(chunks, vec!["public class A {}\n\npublic class B {}"]);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

/// Default chunk ceiling in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1000;

/// Attribute-only lines (`[Serializable]`) directly above a declaration
/// belong to it.
const LEADING_ATTRIBUTE_LINES: &str = r"(?:[ \t]*\[[^\]\n]*\][ \t]*\r?\n)*";

static TYPE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^{}[ \t]*(?:\[[^\]\n]*\][ \t]*)*(?:(?:public|private|protected|internal|static|abstract|sealed|partial|readonly)[ \t]+)*(?:class|struct|interface|enum)[ \t]+[A-Za-z_]",
        LEADING_ATTRIBUTE_LINES
    ))
    .unwrap()
});

static MEMBER_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?m)^{}[ \t]*(?:\[[^\]\n]*\][ \t]*)*(?:public|private|protected|internal)[ \t]+",
        LEADING_ATTRIBUTE_LINES
    ))
    .unwrap()
});

/// Split C# source into ordered, trimmed, non-empty chunks.
pub fn chunk_source(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces: Vec<&str> = Vec::new();
    for piece in split_at_boundaries(text, &TYPE_BOUNDARY) {
        if char_len(piece) > max_chars {
            pieces.extend(split_at_boundaries(piece, &MEMBER_BOUNDARY));
        } else {
            pieces.push(piece);
        }
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for piece in pieces {
        let piece_chars = char_len(piece);
        if !buf.is_empty() && buf_chars + piece_chars > max_chars {
            flush(&mut chunks, &mut buf);
            buf_chars = 0;
        }
        buf.push_str(piece);
        buf_chars += piece_chars;
    }
    flush(&mut chunks, &mut buf);

    chunks
}

/// Cut `text` at the start of every match of `boundary`.
///
/// The pieces concatenate back to `text` exactly.
fn split_at_boundaries<'a>(text: &'a str, boundary: &Regex) -> Vec<&'a str> {
    let mut cuts: Vec<usize> = boundary
        .find_iter(text)
        .map(|m| m.start())
        .filter(|&i| i > 0)
        .collect();
    cuts.dedup();

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        pieces.push(&text[start..cut]);
        start = cut;
    }
    pieces.push(&text[start..]);
    pieces
}

fn flush(chunks: &mut Vec<String>, buf: &mut String) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    buf.clear();
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split prose into chunks on paragraph boundaries, respecting `max_chars`.
///
/// Paragraphs are packed greedily and joined with a blank line. A single
/// paragraph longer than `max_chars` is hard-split at the nearest newline or
/// space before the limit.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = hard_split_point(remaining, max_chars);
                let piece = remaining[..split_at].trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
                remaining = &remaining[split_at..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(current_buf);
    }

    chunks
}

/// Byte offset to cut `s` at: the last newline or space before `max_chars`,
/// snapped to a char boundary and never zero for non-empty input.
fn hard_split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let limit = snap_to_char_boundary(s, max_chars);
    let split = s[..limit]
        .rfind('\n')
        .or_else(|| s[..limit].rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit);
    if split == 0 {
        s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
    } else {
        split
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
