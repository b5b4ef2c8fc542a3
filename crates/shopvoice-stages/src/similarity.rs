//! Token-set title similarity on a 0..=100 scale.
//!
//! Titles are lower-cased and split into alphanumeric tokens. The sorted
//! intersection is compared against the intersection extended with each
//! side's remainder, and the best indel ratio wins. Word order and repeated
//! words therefore do not matter, and a title whose tokens are a subset of
//! the other's scores 100.

use std::collections::BTreeSet;

/// Similarity of two titles, 0.0 (disjoint) to 100.0 (same token set). Not rounded.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = left.intersection(&right).map(String::as_str).collect();
    let only_left: Vec<&str> = left.difference(&right).map(String::as_str).collect();
    let only_right: Vec<&str> = right.difference(&left).map(String::as_str).collect();

    if !common.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 100.0;
    }

    let base = common.join(" ");
    let with_left = join_parts(&base, &only_left);
    let with_right = join_parts(&base, &only_right);

    [
        ratio(&base, &with_left),
        ratio(&base, &with_right),
        ratio(&with_left, &with_right),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max)
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
}

fn join_parts(base: &str, rest: &[&str]) -> String {
    let rest = rest.join(" ");
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest,
        (_, true) => base.to_string(),
        _ => format!("{} {}", base, rest),
    }
}

/// Indel similarity: `200 * lcs / (len_a + len_b)`.
fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_case_do_not_matter() {
        assert_eq!(token_set_ratio("Lemon Dish Soap", "soap DISH lemon"), 100.0);
    }

    #[test]
    fn test_subset_scores_full() {
        assert_eq!(token_set_ratio("Dish Soap", "Acme Lemon Dish Soap 16oz"), 100.0);
    }

    #[test]
    fn test_disjoint_and_empty() {
        assert_eq!(token_set_ratio("kettle", "vacuum"), 0.0);
        assert_eq!(token_set_ratio("", "vacuum"), 0.0);
        assert_eq!(token_set_ratio("!!", "vacuum"), 0.0);
    }

    #[test]
    fn test_partial_overlap_is_between_bounds() {
        let score = token_set_ratio("Acme Lemon Dish Soap", "Acme Lime Dish Soap");
        assert!(score > 80.0, "score was {score}");
        let score = token_set_ratio("Acme Glass Cleaner", "Zenith Floor Mop");
        assert!(score < 50.0, "score was {score}");
    }

    #[test]
    fn test_score_keeps_fraction() {
        let shared = "alpha bravo charlie delta echo foxtrot golf hotel india juliet zulu";
        let score = token_set_ratio(
            &format!("{shared} xxxxxxxxxxxxxxx yyyyyyyyyyyyyyyy"),
            &format!("{shared} {}", "q".repeat(200)),
        );
        assert!((score - 80.2395).abs() < 1e-3, "score was {score}");
    }

    #[test]
    fn test_lcs() {
        let a: Vec<char> = "abcde".chars().collect();
        let b: Vec<char> = "ace".chars().collect();
        assert_eq!(lcs_len(&a, &b), 3);
    }
}
