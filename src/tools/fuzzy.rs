//! Fuzzy program-name matching on a 0-100 scale.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

/// Lowercases, replaces punctuation with spaces and collapses whitespace.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio of the shorter string against every same-length window of the longer one.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 || long_chars.len() == short_len {
        return ratio(short, long);
    }

    let mut best = 0.0f64;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Shared words of both strings plus the words only `a` and only `b` have,
/// each sorted and joined.
struct TokenSets {
    common: String,
    only_a: String,
    only_b: String,
}

impl TokenSets {
    fn new(a: &str, b: &str) -> Self {
        let set_a: BTreeSet<&str> = a.split_whitespace().collect();
        let set_b: BTreeSet<&str> = b.split_whitespace().collect();
        let join = |words: Vec<&str>| words.join(" ");
        Self {
            common: join(set_a.intersection(&set_b).copied().collect()),
            only_a: join(set_a.difference(&set_b).copied().collect()),
            only_b: join(set_b.difference(&set_a).copied().collect()),
        }
    }

    fn with_common(&self, rest: &str) -> String {
        match (self.common.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => self.common.clone(),
            (false, false) => format!("{} {}", self.common, rest),
        }
    }
}

/// A query holding every word of a name, plus extras, scores 100.
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let sets = TokenSets::new(a, b);
    if !sets.common.is_empty() && (sets.only_a.is_empty() || sets.only_b.is_empty()) {
        return 100.0;
    }

    let full_a = sets.with_common(&sets.only_a);
    let full_b = sets.with_common(&sets.only_b);
    let mut best = ratio(&full_a, &full_b);
    if !sets.common.is_empty() {
        best = best
            .max(ratio(&sets.common, &full_a))
            .max(ratio(&sets.common, &full_b));
    }
    best
}

/// Any shared word is a full partial match.
fn partial_token_set_ratio(a: &str, b: &str) -> f64 {
    let sets = TokenSets::new(a, b);
    if !sets.common.is_empty() {
        return 100.0;
    }
    partial_ratio(&sets.only_a, &sets.only_b)
}

/// Weighted ratio in the style of fuzzywuzzy's `WRatio`.
///
/// Strings of similar length take the best of the plain ratio and the
/// token-sort and token-set ratios scaled by 0.95. When one string is at
/// least 1.5 times longer, the partial variants are used instead, scaled by
/// 0.9 (0.6 past a factor of 8) and token variants additionally by 0.95.
pub fn weighted_ratio(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let len_a = a.chars().count() as f64;
    let len_b = b.chars().count() as f64;
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);
    const TOKEN_SCALE: f64 = 0.95;

    let mut best = ratio(&a, &b);
    if len_ratio < 1.5 {
        best = best
            .max(ratio(&token_sort(&a), &token_sort(&b)) * TOKEN_SCALE)
            .max(token_set_ratio(&a, &b) * TOKEN_SCALE);
    } else {
        let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
        best = best
            .max(partial_ratio(&a, &b) * partial_scale)
            .max(partial_ratio(&token_sort(&a), &token_sort(&b)) * TOKEN_SCALE * partial_scale)
            .max(partial_token_set_ratio(&a, &b) * TOKEN_SCALE * partial_scale);
    }
    best.round().clamp(0.0, 100.0) as u8
}

/// Highest scoring candidate, if it reaches `threshold`.
pub fn best_match<'a, T>(
    query: &str,
    candidates: &'a [(T, String)],
    threshold: u8,
) -> Option<(&'a T, &'a str, u8)> {
    let mut best: Option<(&'a T, &'a str, u8)> = None;
    for (key, name) in candidates {
        let score = weighted_ratio(query, name);
        if best.map_or(true, |(_, _, top)| score > top) {
            best = Some((key, name.as_str(), score));
        }
    }
    best.filter(|(_, _, score)| *score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn programs() -> Vec<(String, String)> {
        vec![
            ("p-dscr".to_string(), "DSCR Plus".to_string()),
            ("p-flex".to_string(), "Flex Select".to_string()),
            ("p-jumbo".to_string(), "Prime Jumbo".to_string()),
        ]
    }

    #[test]
    fn exact_match_ignores_case_and_punctuation() {
        assert_eq!(weighted_ratio("dscr-plus", "DSCR Plus"), 100);
    }

    #[test]
    fn misspellings_are_accepted() {
        let candidates = programs();
        let (id, name, score) = best_match("Flex Selct", &candidates, 85).unwrap();
        assert_eq!(id, "p-flex");
        assert_eq!(name, "Flex Select");
        assert!(score >= 85);

        let (id, _, _) = best_match("DSCR Plu", &candidates, 85).unwrap();
        assert_eq!(id, "p-dscr");
    }

    #[test]
    fn reordered_and_partial_names_match() {
        assert!(weighted_ratio("Select Flex", "Flex Select") >= 85);
        assert!(weighted_ratio("dscr", "DSCR Plus") >= 85);
    }

    #[test]
    fn extra_words_around_the_name_still_match() {
        let candidates = programs();
        let (id, _, score) = best_match("NQM Flex Select", &candidates, 85).unwrap();
        assert_eq!(id, "p-flex");
        assert_eq!(score, 95);

        let (id, _, score) = best_match("ARC DSCR Plus", &candidates, 85).unwrap();
        assert_eq!(id, "p-dscr");
        assert_eq!(score, 95);

        let (id, _, _) = best_match("Flex Select NQM", &candidates, 85).unwrap();
        assert_eq!(id, "p-flex");
    }

    #[test]
    fn token_set_ratio_handles_disjoint_words() {
        assert_eq!(token_set_ratio("flex select", "select flex"), 100.0);
        assert!(token_set_ratio("bank statement", "prime jumbo") < 50.0);
        assert_eq!(partial_token_set_ratio("jumbo", "prime jumbo loans"), 100.0);
    }

    #[test]
    fn unrelated_names_are_rejected() {
        let candidates = programs();
        assert!(best_match("Bank Statement Elite", &candidates, 85).is_none());
        assert!(best_match("", &candidates, 85).is_none());
    }

    #[test]
    fn no_candidates_means_no_match() {
        let empty: Vec<(String, String)> = Vec::new();
        assert!(best_match("DSCR Plus", &empty, 0).is_none());
    }
}
