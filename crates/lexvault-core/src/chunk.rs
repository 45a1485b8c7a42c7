//! Overlapping fixed-window text chunker.
//!
//! Splits a document's extracted text into [`Chunk`]s of at most
//! `chunk_size` bytes, where each window starts `chunk_overlap` bytes
//! before the previous one ended so that sentences straddling a cut point
//! stay retrievable from either side.
//!
//! # Algorithm
//!
//! 1. Trim the text; empty text yields no chunks.
//! 2. Take a window of `chunk_size` bytes from the current start, snapped
//!    back to a UTF-8 char boundary.
//! 3. If the window does not reach the end of the text, move the cut back
//!    to the last whitespace in the second half of the window.
//! 4. Emit the trimmed window with the next sequence index.
//! 5. Start the next window `chunk_overlap` bytes before the cut, advanced
//!    to the next word boundary. The start always moves forward.
//!
//! # Example
//!
//! ```rust
//! use lexvault_core::chunk::chunk_text;
//! use lexvault_core::models::Document;
//!
//! let doc = Document {
//!     id: "doc-1".into(),
//!     filename: "nda.txt".into(),
//!     owner_id: "alice".into(),
//!     ciphertext_ref: "x.enc".into(),
//!     content_hash: String::new(),
//!     uploaded_at: 0,
//!     description: String::new(),
//!     indexed_at: None,
//! };
//! let chunks = chunk_text(&doc, "Termination clause: 30 days notice.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].sequence_index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Split `text` into overlapping windows tagged with `doc`'s identity.
///
/// # Guarantees
///
/// - Sequence indices are contiguous: `0, 1, 2, …, N-1`, in text order.
/// - No chunk exceeds `chunk_size` bytes, provided `chunk_size` is at
///   least 4 (one UTF-8 character always fits). A narrower window still
///   makes progress by emitting a single character.
/// - Consecutive chunks share up to `chunk_overlap` bytes of text.
/// - `chunk_overlap >= chunk_size` is treated as zero overlap.
pub fn chunk_text(doc: &Document, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = if chunk_overlap >= chunk_size {
        0
    } else {
        chunk_overlap
    };

    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let hard_end = snap_to_char_boundary(text, (start + chunk_size).min(len));
        let mut end = hard_end;

        if hard_end < len {
            let min_cut = start + chunk_size / 2;
            if let Some(pos) = text[start..hard_end].rfind(char::is_whitespace) {
                if start + pos > min_cut {
                    end = start + pos;
                }
            }
        }

        if end <= start {
            end = next_char_boundary(text, start);
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(doc, index, piece));
            index += 1;
        }

        if end >= len {
            break;
        }

        let mut next = snap_to_char_boundary(text, end.saturating_sub(overlap));
        if next > start && overlap > 0 {
            if let Some(pos) = text[next..end].find(char::is_whitespace) {
                next += pos;
            }
        }
        if next <= start {
            next = end;
        }
        start = next;
    }

    chunks
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

fn next_char_boundary(s: &str, index: usize) -> usize {
    s[index..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| index + i)
        .unwrap_or(s.len())
}

fn make_chunk(doc: &Document, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_id: doc.id.clone(),
        sequence_index: index,
        text: text.to_string(),
        hash,
        filename: doc.filename.clone(),
        owner_id: doc.owner_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document {
            id: "doc1".to_string(),
            filename: "contract.txt".to_string(),
            owner_id: "u1".to_string(),
            ciphertext_ref: "ref.enc".to_string(),
            content_hash: String::new(),
            uploaded_at: 0,
            description: String::new(),
            indexed_at: None,
        }
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text(&doc(), "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].filename, "contract.txt");
        assert_eq!(chunks[0].owner_id, "u1");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text(&doc(), "", 1000, 200).is_empty());
        assert!(chunk_text(&doc(), "  \n\n ", 1000, 200).is_empty());
    }

    #[test]
    fn test_windows_respect_size_and_are_contiguous() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&doc(), &text, 100, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, i as i64);
            assert!(c.text.len() <= 100, "chunk {} is {} bytes", i, c.text.len());
        }
    }

    #[test]
    fn test_multibyte_text_fits_narrowest_window() {
        let text = "§€𝄞 naïve clause";
        let chunks = chunk_text(&doc(), text, 4, 0);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.len() <= 4, "{:?} is {} bytes", c.text, c.text.len());
        }
        assert!(chunks.iter().any(|c| c.text.contains('𝄞')));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..100)
            .map(|i| format!("token{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&doc(), &text, 80, 30);
        for pair in chunks.windows(2) {
            let last_word = pair[0].text.split_whitespace().last().unwrap();
            assert!(
                pair[1].text.contains(last_word),
                "'{}' missing from next chunk '{}'",
                last_word,
                pair[1].text
            );
        }
    }

    #[test]
    fn test_zero_overlap_covers_every_word_once() {
        let words: Vec<String> = (0..60).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&doc(), &text, 40, 0);
        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string))
            .collect();
        assert_eq!(rejoined, words);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_still_terminates() {
        let text = "a b c d e f g h i j k l m n o p";
        let chunks = chunk_text(&doc(), text, 4, 10);
        assert!(!chunks.is_empty());
        assert!(chunks.len() <= text.len());
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text(&doc(), text, 7, 2);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_unbroken_text_is_hard_split() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&doc(), &text, 100, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.len(), 50);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let c1 = chunk_text(&doc(), text, 20, 5);
        let c2 = chunk_text(&doc(), text, 20, 5);
        assert_eq!(c1, c2);
    }
}
