use fti_core::tokenizer::{tokenize, Analyzer};
use fti_core::Language;

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! The ﬁles menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // NFKC folds the "fi" ligature
    assert!(words.contains(&"file".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn it_is_deterministic_per_language() {
    let de = Analyzer::new(Language::German);
    let a = de.analyze("Häuser und Bäume");
    let b = de.analyze("Häuser und Bäume");
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
}
