//! Recursive character text splitter.
//!
//! Splits on the coarsest separator present in the text, recursing into
//! pieces that are still too large with the next finer separator, then
//! merges neighbouring pieces back into chunks of at most `chunk_size`
//! characters with `chunk_overlap` characters carried between chunks.

use serde::{Deserialize, Serialize};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk of text and where it starts in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Character offset in the original text.
    pub start_offset: usize,
    pub chunk_index: usize,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let pieces = self.split_recursive(text, &self.separators);

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut search_from = 0usize;
        for (chunk_index, piece) in pieces.into_iter().enumerate() {
            let byte_offset = text[search_from..]
                .find(&piece)
                .map(|pos| search_from + pos)
                .or_else(|| text.find(&piece))
                .unwrap_or(0);
            let start_offset = text[..byte_offset].chars().count();
            search_from = next_char_boundary(text, byte_offset);
            chunks.push(TextChunk {
                text: piece,
                start_offset,
                chunk_index,
            });
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut output = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                output.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if finer.is_empty() {
                output.push(piece);
            } else {
                output.extend(self.split_recursive(&piece, finer));
            }
        }
        if !pending.is_empty() {
            output.extend(self.merge(&pending, separator));
        }
        output
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = if current.is_empty() { 0 } else { sep_len };
            if total + len + joined_len > self.chunk_size {
                if total > self.chunk_size {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        self.chunk_size
                    );
                }
                if !current.is_empty() {
                    push_trimmed(&mut docs, current.join(separator));
                    while total > self.chunk_overlap
                        || (total > 0
                            && total + len + if current.is_empty() { 0 } else { sep_len }
                                > self.chunk_size)
                    {
                        let removed = char_len(current[0]);
                        total -= removed + if current.len() > 1 { sep_len } else { 0 };
                        current.remove(0);
                    }
                }
            }
            current.push(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if !current.is_empty() {
            push_trimmed(&mut docs, current.join(separator));
        }
        docs
    }
}

fn push_trimmed(docs: &mut Vec<String>, doc: String) {
    let trimmed = doc.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn next_char_boundary(text: &str, byte_offset: usize) -> usize {
    text[byte_offset..]
        .chars()
        .next()
        .map(|c| byte_offset + c.len_utf8())
        .unwrap_or(text.len())
}
