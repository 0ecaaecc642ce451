use config::MatchConfig;
use std::collections::HashMap;

/// Lower-case and whitespace-fold free text before n-gram comparison.
pub fn normalize_text(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn bigram_counts(text: &str) -> HashMap<(char, char), u32> {
    let chars: Vec<char> = text.chars().collect();
    let mut counts = HashMap::new();
    for window in chars.windows(2) {
        *counts.entry((window[0], window[1])).or_insert(0) += 1;
    }
    counts
}

/// Bigram Dice coefficient between two normalized strings in [0, 1].
///
/// Multiset intersection, so repeated bigrams count as often as they
/// appear on both sides. Empty strings score zero against everything,
/// including each other: absence of text is not evidence of identity.
pub fn dice(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a_counts = bigram_counts(a);
    let b_counts = bigram_counts(b);
    let a_total: u32 = a_counts.values().sum();
    let b_total: u32 = b_counts.values().sum();
    if a_total == 0 || b_total == 0 {
        return 0.0;
    }

    let overlap: u32 = a_counts
        .iter()
        .map(|(bigram, count)| count.min(b_counts.get(bigram).unwrap_or(&0)))
        .sum();

    f64::from(2 * overlap) / f64::from(a_total + b_total)
}

/// Weighted title/company similarity used by the dedup engine.
pub fn combined_score(
    title_a: &str,
    company_a: &str,
    title_b: &str,
    company_b: &str,
    config: &MatchConfig
) -> f64 {
    let title_score = dice(&normalize_text(title_a), &normalize_text(title_b));
    let company_score = dice(&normalize_text(company_a), &normalize_text(company_b));
    config.title_weight * title_score + config.company_weight * company_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings() {
        assert!((dice("software engineer", "software engineer") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_strings() {
        assert!(dice("abc", "xyz") < f64::EPSILON);
    }

    #[test]
    fn test_near_duplicate_titles_pass_threshold() {
        let config = MatchConfig::default();
        let score = combined_score(
            "Software Engineer Intern",
            "Acme",
            "Software Engineer Internship",
            "Acme",
            &config
        );
        assert!(score >= config.threshold, "{score}");
    }

    #[test]
    fn test_different_roles_fail_threshold() {
        let config = MatchConfig::default();
        let score = combined_score(
            "Software Engineer Intern",
            "Acme",
            "Data Analyst Intern",
            "Acme",
            &config
        );
        assert!(score < config.threshold, "{score}");
    }

    #[test]
    fn test_short_strings() {
        assert!(dice("a", "a") > 0.99);
        assert!(dice("a", "b") < f64::EPSILON);
        assert!(dice("", "") < f64::EPSILON);
        assert!(dice("", "x") < f64::EPSILON);
    }
}
