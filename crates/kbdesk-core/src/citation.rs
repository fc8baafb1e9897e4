//! Citation tokenizer.
//!
//! Splits generated answer text into plain-text runs and `[S<n>]` citation
//! markers. The scan is lazy: [`tokenize`] returns an iterator that borrows
//! the input and can be cloned to restart from the same point.
//!
//! Anything that is not exactly `[`, `S`, one or more ASCII digits, `]` is
//! literal text, so `[S]`, `[s1]`, `[S1` and a lone `[` pass through
//! unchanged. The tokenizer never fails, never emits an empty text segment,
//! and concatenating [`Segment::as_str`] over all segments reproduces the
//! input byte for byte.
//!
//! ```
//! use kbdesk_core::citation::{tokenize, Segment};
//!
//! let segments: Vec<_> = tokenize("See [S2] and [S10].").collect();
//! assert_eq!(segments[1], Segment::Citation { source_no: 2, raw: "[S2]" });
//! assert_eq!(segments.len(), 5);
//! ```

/// One renderable piece of answer text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A run of literal text. Never empty.
    Text(&'a str),
    /// A citation marker and the source number it names.
    Citation { source_no: u32, raw: &'a str },
}

impl<'a> Segment<'a> {
    /// The exact slice of input this segment covers.
    pub fn as_str(&self) -> &'a str {
        match self {
            Segment::Text(text) => text,
            Segment::Citation { raw, .. } => raw,
        }
    }

    pub fn source_no(&self) -> Option<u32> {
        match self {
            Segment::Citation { source_no, .. } => Some(*source_no),
            Segment::Text(_) => None,
        }
    }
}

/// Lazy segment iterator returned by [`tokenize`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    pos: usize,
    queued: Option<Segment<'a>>,
}

/// Tokenize answer text into segments in order of appearance.
pub fn tokenize(text: &str) -> Segments<'_> {
    Segments {
        text,
        pos: 0,
        queued: None,
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(segment) = self.queued.take() {
            return Some(segment);
        }
        if self.pos >= self.text.len() {
            return None;
        }

        match find_marker(self.text, self.pos) {
            Some(marker) => {
                let citation = Segment::Citation {
                    source_no: marker.source_no,
                    raw: &self.text[marker.start..marker.end],
                };
                let before = &self.text[self.pos..marker.start];
                self.pos = marker.end;
                if before.is_empty() {
                    Some(citation)
                } else {
                    self.queued = Some(citation);
                    Some(Segment::Text(before))
                }
            }
            None => {
                let rest = &self.text[self.pos..];
                self.pos = self.text.len();
                Some(Segment::Text(rest))
            }
        }
    }
}

impl std::iter::FusedIterator for Segments<'_> {}

struct Marker {
    start: usize,
    end: usize,
    source_no: u32,
}

/// Find the first well-formed marker at or after byte offset `from`.
///
/// All marker bytes are ASCII, so every offset produced here is a char
/// boundary of the original string.
fn find_marker(text: &str, from: usize) -> Option<Marker> {
    let bytes = text.as_bytes();
    let mut cursor = from;

    while let Some(offset) = text[cursor..].find('[') {
        let start = cursor + offset;
        if let Some((end, source_no)) = marker_at(bytes, start) {
            return Some(Marker {
                start,
                end,
                source_no,
            });
        }
        cursor = start + 1;
    }
    None
}

/// If a marker begins at `start` (which holds `[`), return its end offset
/// and source number.
fn marker_at(bytes: &[u8], start: usize) -> Option<(usize, u32)> {
    if bytes.get(start + 1) != Some(&b'S') {
        return None;
    }
    let digits_start = start + 2;
    let mut idx = digits_start;
    let mut value: u32 = 0;
    while let Some(&b) = bytes.get(idx) {
        if !b.is_ascii_digit() {
            break;
        }
        // A number too large for u32 cannot name a real source.
        value = value.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
        idx += 1;
    }
    if idx == digits_start || bytes.get(idx) != Some(&b']') {
        return None;
    }
    Some((idx + 1, value))
}

/// Distinct source numbers cited in `text`, in order of first appearance.
pub fn cited_source_nos(text: &str) -> Vec<u32> {
    let mut seen = Vec::new();
    for source_no in tokenize(text).filter_map(|s| s.source_no()) {
        if !seen.contains(&source_no) {
            seen.push(source_no);
        }
    }
    seen
}
