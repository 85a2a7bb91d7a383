//! Profanity detection for free-text submission fields.
//!
//! Matching is word-oriented and runs over a normalized form of the input so that common
//! obfuscations still match: leetspeak substitutions (`sh1t`, `@ss`), separators inside a
//! word (`f.u.c.k`), letters spaced out across words (`f u c k`), and stretched letters
//! (`fuuuuck`). A short list of strong terms is also matched inside longer words, with an
//! allow-list for well-known innocent embeddings.

use std::collections::HashSet;

const BLOCKED_TERMS: &[&str] = &[
    "arse",
    "arsehole",
    "ass",
    "asshole",
    "bastard",
    "bitch",
    "bollocks",
    "bullshit",
    "cock",
    "cunt",
    "dick",
    "dickhead",
    "dipshit",
    "douche",
    "douchebag",
    "fag",
    "faggot",
    "fuck",
    "fucker",
    "jackass",
    "kys",
    "motherfucker",
    "nigga",
    "nigger",
    "piss",
    "prick",
    "pussy",
    "retard",
    "shit",
    "skank",
    "slut",
    "twat",
    "wanker",
    "whore",
];

const EMBEDDED_TERMS: &[&str] = &["fuck", "shit", "cunt", "nigger", "nigga", "faggot", "whore"];

const ALLOWED_EMBEDDINGS: &[&str] = &["scunthorpe", "shitake", "shitzu"];

/// Ordinary words and surnames that read as a blocked stem plus an inflection.
const ALLOWED_WORDS: &[&str] = &[
    "cocker", "cockers", "cockerel", "cockerels", "cocky", "dickens", "dickey", "dickeys",
    "dicky", "pricked", "pricking",
];

const INFLECTION_SUFFIXES: &[&str] =
    &["s", "es", "ed", "er", "ers", "ing", "in", "y", "ty", "ey", "head", "heads", "hole", "holes"];

#[derive(Clone, Debug)]
pub struct ContentFilter {
    terms: HashSet<String>,
    collapsed_terms: HashSet<String>,
    embedded_terms: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(BLOCKED_TERMS.iter().copied())
    }
}

impl ContentFilter {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms: HashSet<String> =
            terms.into_iter().map(|term| normalize_token(term.as_ref())).collect();
        let collapsed_terms = terms
            .iter()
            .map(|term| collapse_repeats(term))
            .filter(|collapsed| collapsed.chars().count() >= 4)
            .collect();
        let embedded_terms = EMBEDDED_TERMS
            .iter()
            .map(|term| normalize_token(term))
            .filter(|term| terms.contains(term))
            .collect();

        Self { terms, collapsed_terms, embedded_terms }
    }

    /// Returns true when the text contains a blocked term in any recognised spelling.
    pub fn is_inappropriate(&self, text: &str) -> bool {
        candidate_words(text).iter().any(|word| self.word_matches(word))
    }

    fn word_matches(&self, word: &str) -> bool {
        if word.is_empty() || ALLOWED_WORDS.contains(&word) {
            return false;
        }
        if self.terms.contains(word) || self.matches_inflection(word) {
            return true;
        }

        let collapsed = collapse_repeats(word);
        if self.collapsed_terms.contains(&collapsed) {
            return true;
        }

        if ALLOWED_EMBEDDINGS.iter().any(|allowed| word.contains(allowed)) {
            return false;
        }
        self.embedded_terms.iter().any(|term| word.contains(term.as_str()))
    }

    fn matches_inflection(&self, word: &str) -> bool {
        INFLECTION_SUFFIXES.iter().any(|suffix| {
            word.strip_suffix(suffix)
                .filter(|stem| stem.len() >= 3)
                .is_some_and(|stem| self.terms.contains(stem))
        })
    }
}

/// Splits text into normalized words, adding the joined form of any run of single letters
/// (`f u c k` becomes `fuck`).
fn candidate_words(text: &str) -> Vec<String> {
    let words: Vec<String> = text.split_whitespace().map(normalize_token).collect();
    let mut candidates = words.clone();

    let mut run = String::new();
    for word in &words {
        if word.chars().count() == 1 {
            run.push_str(word);
            continue;
        }
        if run.chars().count() > 1 {
            candidates.push(std::mem::take(&mut run));
        }
        run.clear();
    }
    if run.chars().count() > 1 {
        candidates.push(run);
    }

    candidates
}

fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|ch| matches!(ch, '.' | ',' | '!' | '?' | ';' | ':' | '"' | '\'' | '(' | ')'))
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            '0' => 'o',
            '1' | '!' | '|' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' | '+' => 't',
            '8' => 'b',
            other => other,
        })
        .filter(|ch| ch.is_alphabetic())
        .collect()
}

fn collapse_repeats(word: &str) -> String {
    let mut collapsed = String::with_capacity(word.len());
    let mut previous = None;
    for ch in word.chars() {
        if previous != Some(ch) {
            collapsed.push(ch);
        }
        previous = Some(ch);
    }
    collapsed
}
