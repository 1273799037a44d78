//! Sequence-matching similarity between short labels.
//!
//! [`ratio`] is the Ratcliff/Obershelp measure: find the longest common
//! block, recurse on both sides of it, and score `2·M / T` where `M` is the
//! total size of the matched blocks and `T` the combined length. Scores are
//! over `char`s, so CJK labels compare character by character. No junk
//! heuristic is applied; labels are far shorter than where one would matter.

use std::collections::HashMap;

/// Similarity in `[0, 1]`; two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Total size of the matching blocks between `a` and `b`.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate() {
        b2j.entry(c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+k] == b[j..j+k]` inside the given ranges. Ties go
/// to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // Length of the match ending at a[i-1], b[j], keyed by j.
    let mut run: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run = HashMap::new();
        for &j in b2j.get(c).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }
            let k = j
                .checked_sub(1)
                .and_then(|prev| run.get(&prev))
                .copied()
                .unwrap_or(0)
                + 1;
            next_run.insert(j, k);
            if k > best_k {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_k = k;
            }
        }
        run = next_run;
    }
    (best_i, best_j, best_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_labels_score_one() {
        for name in ["资产负债表", "现金流", "保证人基本情况", ""] {
            assert!(close(ratio(name, name), 1.0), "{name}");
        }
    }

    #[test]
    fn unrelated_labels_stay_below_threshold() {
        assert!(ratio("现金流", "其他表") < 0.8);
        assert!(ratio("资产负债表", "授信情况") < 0.8);
        assert!(close(ratio("资产负债表", ""), 0.0));
    }

    #[test]
    fn partial_overlap() {
        // 5 common chars over 12.
        assert!(close(ratio("资产负债表", "合并资产负债表"), 10.0 / 12.0));
        // 3 common chars over 8.
        assert!(close(ratio("现金流", "现金流量表"), 0.75));
        assert!(close(ratio("abcd", "bcde"), 0.75));
    }

    #[test]
    fn blocks_on_both_sides_count() {
        // "ab" first, then "cd" to its right.
        assert!(close(ratio("abxcd", "abycd"), 8.0 / 10.0));
        assert!(close(ratio("其他应收款", "应收账款"), 2.0 * 3.0 / 9.0));
    }

    #[test]
    fn symmetric_on_simple_cases() {
        assert!(close(ratio("利润表", "合并利润表"), ratio("合并利润表", "利润表")));
    }
}
