//! Paragraph-boundary text splitter.
//!
//! Splits document body text into pieces that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! to preserve semantic coherence within each piece.
//!
//! Empty or whitespace-only input yields zero pieces: importing an empty
//! document must produce no chunks and no writes.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into pieces on paragraph boundaries, respecting max_tokens.
/// Pieces come back in document order; sequence numbers are assigned by
/// the store at append time.
pub fn split_text(text: &str, max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        // If adding this paragraph would exceed max, flush current buffer
        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        // If a single paragraph exceeds max, split it at word boundaries
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                pieces.push(std::mem::take(&mut current_buf));
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let mut split_at = remaining.len().min(max_chars);
                while !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                // Prefer a newline or space boundary
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    pieces.push(piece.to_string());
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_piece() {
        let pieces = split_text("Hello, world!", 700);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], "Hello, world!");
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(split_text("", 700).is_empty());
        assert!(split_text("   \n\n  \t", 700).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let pieces = split_text(text, 700);
        assert_eq!(pieces.len(), 1);
        assert!(pieces[0].contains("First paragraph."));
        assert!(pieces[0].contains("Third paragraph."));
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let pieces = split_text(text, 5);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(!piece.trim().is_empty());
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(100);
        let pieces = split_text(&text, 10);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.len() <= 40 + 5);
        }
    }

    #[test]
    fn test_multibyte_paragraph_splits_on_boundary() {
        let text = "déjà vu ".repeat(60);
        // Must not panic on non-ASCII boundaries
        let pieces = split_text(&text, 10);
        assert!(!pieces.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = split_text(text, 5);
        let b = split_text(text, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_preserves_order() {
        let text = (0..20)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let pieces = split_text(&text, 10);
        let joined = pieces.join("\n\n");
        let mut last = 0;
        for i in 0..20 {
            let pos = joined.find(&format!("number {}.", i)).unwrap();
            assert!(pos >= last, "paragraph {} out of order", i);
            last = pos;
        }
    }
}
