//! Document-side components.
//!
//! [`line_index`] owns the cached table pairing native and normalized byte
//! offsets at every line start; [`normalized`] owns the native string mirror
//! of a shared text and the translation between the two offset spaces.

pub mod line_index;
pub mod normalized;

pub use line_index::{LineIndex, LineOffset};
pub use normalized::{DocUpdate, NormalizedDoc};

/// Newline style of a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n` only; the canonical form stored in the shared text.
    Lf,
    /// `\r\n`, as produced by editors on some platforms.
    CrLf,
}

impl LineEnding {
    /// The literal byte sequence for this ending.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Detect the ending style of `text`.
    ///
    /// Any carriage return marks the buffer as CRLF-styled; editors do not
    /// mix endings within one buffer.
    pub fn of(text: &str) -> Self {
        if text.contains('\r') {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }
}

/// Rewrite every `\r\n` or `\n` in `text` to the requested ending.
///
/// A lone `\r` not followed by `\n` is not a line break and passes through
/// untouched. Normalization is total; it cannot fail.
pub fn normalize_newlines(text: &str, ending: LineEnding) -> String {
    // Fast path: an LF-only string normalized to LF is already canonical.
    if ending == LineEnding::Lf && !text.contains('\r') {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut run_start = 0;
    while i < bytes.len() {
        let is_crlf = bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n');
        if is_crlf || bytes[i] == b'\n' {
            out.push_str(&text[run_start..i]);
            out.push_str(ending.as_str());
            i += if is_crlf { 2 } else { 1 };
            run_start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&text[run_start..]);
    out
}
