/// Length of the longest common subsequence of two character sequences.
fn lcs(a: &[char], b: &[char]) -> usize {
    // Two rolling rows over the shorter string.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut previous = vec![0usize; short.len() + 1];
    let mut current = vec![0usize; short.len() + 1];
    for &l in long {
        for (j, &s) in short.iter().enumerate() {
            current[j + 1] = match l == s {
                true => previous[j] + 1,
                false => current[j].max(previous[j + 1]),
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[short.len()]
}

/// Fuzzy similarity of two keys in `[0, 1]`.
///
/// The longest common subsequence of characters, normalised by each string's
/// score against itself: `2·lcs(a, b) / (lcs(a, a) + lcs(b, b))`. Symmetric,
/// `1.0` for identical input and `0.0` when either side is empty.
///
/// ```
/// use bindery_naming::similarity;
/// assert!(similarity("project-hail-mary", "project hail mary") > 0.85);
/// assert_eq!(similarity("", "dune"), 0.0);
/// ```
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    // A string's LCS with itself is its own length.
    (2 * lcs(&a, &b)) as f64 / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("abcde", "ace", 3)]
    #[case("silo", "silo", 4)]
    #[case("abc", "xyz", 0)]
    #[case("", "abc", 0)]
    fn test_lcs(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        assert_eq!(lcs(&a, &b), expected);
        assert_eq!(lcs(&b, &a), expected);
    }

    #[rstest]
    #[case("silo", "silo", 1.0)]
    #[case("", "", 0.0)]
    #[case("silo", "", 0.0)]
    #[case("abc", "xyz", 0.0)]
    // 15 shared characters out of 17 + 17.
    #[case("project-hail-mary", "project hail mary", 30.0 / 34.0)]
    #[case("silo", "silo book 2", 8.0 / 15.0)]
    fn test_similarity(#[case] a: &str, #[case] b: &str, #[case] expected: f64) {
        assert!((similarity(a, b) - expected).abs() < 1e-9, "{a} vs {b}");
        assert!((similarity(b, a) - expected).abs() < 1e-9, "{b} vs {a}");
    }

    #[test]
    fn test_multibyte_characters() {
        assert_eq!(similarity("café", "café"), 1.0);
        assert!((similarity("café", "cafe") - 0.75).abs() < 1e-9);
    }
}
