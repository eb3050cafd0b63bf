//! Character-window text chunking with overlap.

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Split `text` into windows of at most `chunk_size` characters.
///
/// Consecutive windows share up to `overlap` characters. A window end is
/// pulled back to the last whitespace in its second half when there is one,
/// so words are not cut. Short text comes back as a single chunk; blank
/// text yields nothing.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let chunk_size = chunk_size.max(1);
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }
    let overlap = overlap.min(chunk_size / 2);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());

        if end < chars.len() {
            let floor = start + chunk_size / 2;
            // A break at `start` would make no progress.
            if let Some(ws) = (floor.max(start + 1)..end)
                .rev()
                .find(|&i| chars[i].is_whitespace())
            {
                end = ws;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }

        // Move forward, but keep overlap
        let next = end.saturating_sub(overlap);
        start = if next <= start { end } else { next };
    }

    chunks
}
