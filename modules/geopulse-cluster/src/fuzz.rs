//! Fuzzy string ratios on the 0–100 scale used by the matcher
//! thresholds. `strsim` provides the normalized Levenshtein base;
//! `token_set_ratio` and `partial_ratio` are the order-insensitive and
//! substring-tolerant variants built on top of it.

/// Plain similarity ratio, 0–100.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Token-set ratio: tokenize both sides, then compare the shared-token
/// core against each side's full sorted token string. Robust to word
/// order and to one side carrying extra tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: std::collections::BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let inter: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let diff_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let diff_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    let joined_inter = inter.join(" ");
    let joined_a = join_nonempty(&joined_inter, &diff_a.join(" "));
    let joined_b = join_nonempty(&joined_inter, &diff_b.join(" "));

    ratio(&joined_inter, &joined_a)
        .max(ratio(&joined_inter, &joined_b))
        .max(ratio(&joined_a, &joined_b))
}

/// Best alignment of the shorter string against any equal-length window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let (short, long) = if chars_a.len() <= chars_b.len() {
        (&chars_a, &chars_b)
    } else {
        (&chars_b, &chars_a)
    };
    if short.is_empty() {
        return 0.0;
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let short_str: String = short.iter().collect();
    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        let window_str: String = window.iter().collect();
        let r = ratio(&short_str, &window_str);
        if r > best {
            best = r;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (false, false) => format!("{a} {b}"),
        (false, true) => a.to_string(),
        (true, false) => b.to_string(),
        (true, true) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(ratio("tokyo quake", "tokyo quake"), 100.0);
        assert_eq!(token_set_ratio("a b c", "a b c"), 100.0);
    }

    #[test]
    fn token_set_ignores_order() {
        let a = "earthquake magnitude tokyo";
        let b = "tokyo earthquake magnitude";
        assert_eq!(token_set_ratio(a, b), 100.0);
        assert!(ratio(a, b) < 100.0, "plain ratio is order-sensitive");
    }

    #[test]
    fn token_set_tolerates_extra_tokens() {
        // One side is a superset: the intersection-vs-superset comparison
        // keeps the score high.
        let a = "alerts earthquake jma magnitude tokyo";
        let b = "alerts earthquake jma magnitude tokyo tsunami warning";
        assert!(token_set_ratio(a, b) >= 85.0, "{}", token_set_ratio(a, b));
    }

    #[test]
    fn partial_finds_embedded_match() {
        let needle = "magnitude 62 tokyo";
        let hay = "breaking magnitude 62 tokyo quake reported by agencies";
        assert!(partial_ratio(needle, hay) >= 95.0, "{}", partial_ratio(needle, hay));
    }

    #[test]
    fn unrelated_strings_score_low() {
        assert!(token_set_ratio("apples pears plums", "volcano ashfall iceland") < 40.0);
        assert!(partial_ratio("apples", "volcano ashfall") < 50.0);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(token_set_ratio("", "a b"), 0.0);
        assert_eq!(partial_ratio("", "abc"), 0.0);
        assert_eq!(ratio("", ""), 100.0);
    }
}
