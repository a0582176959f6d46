//! Sentence segmentation, shared verbatim by `count_sentences`, `read_sentence`
//! and `write_sentence` so that spec invariant "a file's sentence count equals
//! the count produced by re-segmenting the current on-disk content" can never
//! drift between call sites.
//!
//! A sentence is a maximal non-empty span starting at the first non-whitespace
//! byte after the previous terminator and ending at (and including) the next
//! `.`, `!` or `?`. A trailing span with no terminator counts as one final
//! sentence iff it holds at least one non-whitespace byte. This is the same
//! single left-to-right pass as `count_sentences`/`read_sentence`/
//! `write_sentence` in the original storage server, generalized to operate on
//! an in-memory byte slice instead of re-reading the file per call.

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_terminator(b: u8) -> bool {
    matches!(b, b'.' | b'!' | b'?')
}

/// Half-open `[start, end)` byte range of a sentence, `end` pointing just past
/// the terminator (or past the last non-whitespace byte for an unterminated
/// trailing sentence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
}

/// Performs the single left-to-right segmentation pass and returns the
/// `[start, end)` span of every sentence in `content`, in order.
pub fn segment(content: &[u8]) -> Vec<SentenceSpan> {
    let mut spans = Vec::new();
    let mut in_sentence = false;
    let mut start = 0usize;

    for (i, &b) in content.iter().enumerate() {
        if !in_sentence && !is_whitespace(b) {
            in_sentence = true;
            start = i;
        }
        if in_sentence && is_terminator(b) {
            spans.push(SentenceSpan { start, end: i + 1 });
            in_sentence = false;
        }
    }

    if in_sentence {
        spans.push(SentenceSpan { start, end: content.len() });
    }

    spans
}

/// Number of sentences in `content`.
pub fn count_sentences(content: &[u8]) -> usize {
    segment(content).len()
}

/// The byte range of sentence `idx`, or `None` if `idx` is out of range.
pub fn sentence_range(content: &[u8], idx: usize) -> Option<SentenceSpan> {
    segment(content).into_iter().nth(idx)
}

/// The bytes of sentence `idx`, or `None` if `idx` is out of range.
pub fn read_sentence<'a>(content: &'a [u8], idx: usize) -> Option<&'a [u8]> {
    sentence_range(content, idx).map(|span| &content[span.start..span.end])
}

/// Replaces sentence `idx` with `new_content` verbatim (it need not itself
/// end in a terminator) and returns the spliced file content. The caller is
/// responsible for re-segmenting the result to refresh any cached sentence
/// count, since inserting or removing terminators can change it.
pub fn write_sentence(content: &[u8], idx: usize, new_content: &[u8]) -> Option<Vec<u8>> {
    let span = sentence_range(content, idx)?;
    let mut out = Vec::with_capacity(content.len() - (span.end - span.start) + new_content.len());
    out.extend_from_slice(&content[..span.start]);
    out.extend_from_slice(new_content);
    out.extend_from_slice(&content[span.end..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_basic_sentences() {
        let content = b"Hello world. How are you? Fine!";
        assert_eq!(count_sentences(content), 3);
    }

    #[test]
    fn trailing_unterminated_span_counts_once() {
        let content = b"A. B! C? trailing";
        assert_eq!(count_sentences(content), 4);
        assert_eq!(read_sentence(content, 3), Some(&b"trailing"[..]));
    }

    #[test]
    fn pure_whitespace_has_no_sentences() {
        assert_eq!(count_sentences(b"   \n\t  "), 0);
    }

    #[test]
    fn empty_file_has_no_sentences() {
        assert_eq!(count_sentences(b""), 0);
    }

    #[test]
    fn leading_whitespace_is_skipped() {
        let content = b"   Hello.";
        let spans = segment(content);
        assert_eq!(spans.len(), 1);
        assert_eq!(&content[spans[0].start..spans[0].end], b"Hello.");
    }

    #[test]
    fn read_sentence_out_of_range_is_none() {
        assert_eq!(read_sentence(b"Only one.", 1), None);
    }

    #[test]
    fn write_sentence_round_trip_preserves_bytes() {
        let content = b"Hello world. Second sentence. Third.";
        let updated = write_sentence(content, 1, b"Replaced sentence.").unwrap();
        assert_eq!(read_sentence(&updated, 1), Some(&b"Replaced sentence."[..]));
        assert_eq!(read_sentence(&updated, 0), Some(&b"Hello world."[..]));
        assert_eq!(read_sentence(&updated, 2), Some(&b"Third."[..]));
    }

    #[test]
    fn write_sentence_without_terminator_shrinks_count() {
        // Replacing sentence 1 with text that carries no terminator merges
        // it with whatever follows into a single sentence.
        let content = b"One. Two. Three.";
        let updated = write_sentence(content, 1, b"Two and").unwrap();
        // "One." stays sentence 0; "Two and Three." becomes sentence 1.
        assert_eq!(count_sentences(&updated), 2);
        assert_eq!(read_sentence(&updated, 1), Some(&b"Two and Three."[..]));
    }

    #[test]
    fn write_sentence_out_of_range_fails() {
        assert_eq!(write_sentence(b"Only one.", 5, b"x"), None);
    }
}
