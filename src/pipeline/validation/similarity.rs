/// Similarity of two document codes in [0, 1].
///
/// `1 - edit_distance / max_len` over trimmed, uppercased characters. Two
/// empty codes are identical (1.0); empty against non-empty scores 0.0.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_uppercase().chars().collect();
    let b: Vec<char> = b.trim().to_uppercase().chars().collect();

    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = edit_distance(&a, &b) as f64;
    (1.0 - distance / max_len as f64).clamp(0.0, 1.0)
}

/// Levenshtein edit distance between two character sequences.
pub fn edit_distance(a: &[char], b: &[char]) -> usize {
    let m = a.len();
    let n = b.len();

    if m == 0 { return n; }
    if n == 0 { return m; }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &a_ch) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &b_ch) in b.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
