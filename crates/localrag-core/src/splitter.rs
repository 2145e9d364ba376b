//! Recursive, separator-cascading text splitter.
//!
//! The coarsest separator present in the text decides how it is cut into
//! pieces; pieces are packed greedily into chunks of at most `chunk_size`
//! characters, and a piece that cannot fit on its own is split again with the
//! finer separators. Lengths are counted in `char`s, not bytes.

use crate::types::Chunk;

/// Paragraph, line, sentence, word, character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Precondition: `chunk_overlap < chunk_size`. This is not checked here;
    /// see `ChunkingSettings::validate`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Replace the separator cascade, coarsest first. Without a trailing `""`
    /// an indivisible piece is hard-cut at `chunk_size`.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        if self.chunk_size == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        let mut raw = Vec::new();
        self.split_recursive(text, &separators, &mut raw);
        raw.into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn split_document(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        self.split(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk { text, source_id: source_id.to_string(), index })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let Some(pos) = separators.iter().position(|s| s.is_empty() || text.contains(s)) else {
            hard_cut(text, self.chunk_size, out);
            return;
        };
        let separator = separators[pos];
        let finer = &separators[pos + 1..];

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
        } else {
            text.split_inclusive(separator).collect()
        };

        let mut current = String::new();
        let mut current_len = 0usize;
        for piece in pieces {
            let piece_len = char_len(piece);
            if piece_len > self.chunk_size {
                if current_len > 0 {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                self.split_recursive(piece, finer, out);
                continue;
            }
            if current_len + piece_len > self.chunk_size {
                let flushed = std::mem::take(&mut current);
                // The seed is shortened so that seed + piece still fits.
                let keep = self
                    .chunk_overlap
                    .min(current_len)
                    .min(self.chunk_size - piece_len);
                current.push_str(tail(&flushed, keep));
                current_len = keep;
                out.push(flushed);
            }
            current.push_str(piece);
            current_len += piece_len;
        }
        if current_len > 0 {
            out.push(current);
        }
    }
}

/// Convenience wrapper over [`TextSplitter`] with the default separators.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    TextSplitter::new(chunk_size, chunk_overlap).split(text)
}

fn hard_cut(text: &str, size: usize, out: &mut Vec<String>) {
    let mut buf = String::new();
    let mut n = 0usize;
    for c in text.chars() {
        buf.push(c);
        n += 1;
        if n == size {
            out.push(std::mem::take(&mut buf));
            n = 0;
        }
    }
    if n > 0 {
        out.push(buf);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`.
fn tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let total = char_len(s);
    if n >= total {
        return s;
    }
    let start = s.char_indices().nth(total - n).map_or(s.len(), |(i, _)| i);
    &s[start..]
}
