//! Sentence boundaries in streamed deltas, and the chunker's
//! prefix-homomorphism.

use claudia_voice::SentenceChunker;

#[test]
fn streamed_deltas_become_three_sentences() {
    let mut chunker = SentenceChunker::new();
    let mut sentences = Vec::new();
    for delta in ["Hello", " ", "world.", " Next", " one?", " end."] {
        sentences.extend(chunker.feed(delta));
    }
    sentences.extend(chunker.flush());
    assert_eq!(sentences, ["Hello world.", "Next one?", "end."]);
}

#[test]
fn feeding_a_then_b_equals_feeding_ab() {
    let a = "First sentence. Second";
    let b = " half! And a third? tail";

    let mut split = SentenceChunker::new();
    let mut split_out = split.feed(a);
    split_out.extend(split.feed(b));
    split_out.extend(split.flush());

    let mut whole = SentenceChunker::new();
    let mut whole_out = whole.feed(&format!("{a}{b}"));
    whole_out.extend(whole.flush());

    assert_eq!(split_out, whole_out);
}

#[test]
fn flush_is_required_for_the_trailing_sentence() {
    let mut chunker = SentenceChunker::new();
    assert!(chunker.feed("No trailing whitespace ever arrives.").is_empty());
    assert_eq!(
        chunker.flush(),
        Some("No trailing whitespace ever arrives.".to_string())
    );
}
