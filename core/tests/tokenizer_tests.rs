use core::tokenizer::tokenize;

#[test]
fn empty_input_yields_nothing() {
    assert!(tokenize("").is_empty());
    assert!(tokenize("   \t\n").is_empty());
}

#[test]
fn it_lowercases_splits_and_filters() {
    let toks = tokenize("The Quick-Brown Fox's Nature2024!");
    assert_eq!(toks, vec!["quick", "brown", "fox", "nature2024"]);
}

#[test]
fn it_filters_stopwords() {
    assert!(tokenize("the and is").is_empty());
    let toks = tokenize("what happens when they search");
    assert_eq!(toks, vec!["happens", "search"]);
}

#[test]
fn it_drops_single_character_tokens() {
    let toks = tokenize("a b c method");
    assert_eq!(toks, vec!["method"]);
}

#[test]
fn it_keeps_duplicates_in_order() {
    let toks = tokenize("signal noise signal");
    assert_eq!(toks, vec!["signal", "noise", "signal"]);
}
