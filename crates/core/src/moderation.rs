pub const DEFAULT_BANNED_WORDS: [&str; 4] = ["crap", "loser", "bozo", "bum"];

/// Flags text containing any banned term.
///
/// Text is lowercased and stripped of ASCII punctuation, then each term is
/// matched as a plain substring. There is no word-boundary check, so a term
/// also matches inside longer words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfanityFilter {
    banned_words: Vec<String>,
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BANNED_WORDS)
    }
}

impl ProfanityFilter {
    pub fn new<I, S>(banned_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let banned_words = banned_words
            .into_iter()
            .map(|word| normalize(word.as_ref()))
            .filter(|word| !word.trim().is_empty())
            .collect();
        Self { banned_words }
    }

    pub fn contains_banned_word(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.banned_words.iter().any(|word| normalized.contains(word.as_str()))
    }

    pub fn banned_words(&self) -> &[String] {
        &self.banned_words
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().chars().filter(|ch| !ch.is_ascii_punctuation()).collect()
}

#[cfg(test)]
mod tests {
    use super::ProfanityFilter;

    #[test]
    fn matches_case_insensitively_through_punctuation() {
        let filter = ProfanityFilter::default();
        assert!(filter.contains_banned_word("You Bozo!!"));
        assert!(filter.contains_banned_word("what a l.o.s.e.r"));
    }

    #[test]
    fn matches_inside_longer_words() {
        // Substring match, no word boundaries: these count as hits.
        let filter = ProfanityFilter::default();
        assert!(filter.contains_banned_word("bozosity"));
        assert!(filter.contains_banned_word("great album"));
    }

    #[test]
    fn clean_text_passes() {
        let filter = ProfanityFilter::default();
        assert!(!filter.contains_banned_word("clean text"));
        assert!(!filter.contains_banned_word(""));
    }

    #[test]
    fn custom_terms_are_normalized() {
        let filter = ProfanityFilter::new(["Heck!", "  ", "DARN"]);
        assert_eq!(filter.banned_words(), ["heck".to_owned(), "darn".to_owned()]);
        assert!(filter.contains_banned_word("oh heck"));
        assert!(!filter.contains_banned_word("crap"));
    }
}
