//! Token-bounded text splitting.

use super::types::ExtractionError;
use semchunk_rs::Chunker;

/// Split `text` into chunks of at most `chunk_size` whitespace-delimited tokens.
///
/// Blank input yields no chunks.
pub(crate) fn chunk_text(text: &str, chunk_size: usize) -> Result<Vec<String>, ExtractionError> {
    if chunk_size == 0 {
        return Err(ExtractionError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunker = Chunker::new(chunk_size, Box::new(count_tokens));
    Ok(chunker
        .chunk(text)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect())
}

fn count_tokens(segment: &str) -> usize {
    segment.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_chunk_size() {
        let chunks = chunk_text("one two three four five", 2).unwrap();
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(chunk_text("   \n", 4).unwrap().is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(matches!(
            chunk_text("text", 0),
            Err(ExtractionError::InvalidChunkSize)
        ));
    }
}
