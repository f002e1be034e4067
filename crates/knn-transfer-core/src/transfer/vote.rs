use std::collections::BTreeMap;

/// The winning label of a weighted vote and its share of the total weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote<'a> {
    pub label: &'a str,
    pub prob: f64,
}

/// Sums neighbor weights per distinct label and picks the heaviest label.
///
/// Candidates are enumerated in ascending byte order of the label and the
/// scan only replaces the leader on a strictly greater sum, so among labels
/// with equal weight the smallest one wins.
///
/// Returns `None` when there are no neighbors.
pub fn weighted_vote<'a, I>(labels: I, weights: &[f64]) -> Option<Vote<'a>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut totals: BTreeMap<&'a str, f64> = BTreeMap::new();
    for (label, &w) in labels.into_iter().zip(weights) {
        *totals.entry(label).or_insert(0.0) += w;
    }

    // Normalised weights of a unanimous neighborhood sum to exactly one.
    if totals.len() == 1 {
        return totals.into_keys().next().map(|label| Vote { label, prob: 1.0 });
    }

    let mut best: Option<Vote<'a>> = None;
    for (label, prob) in totals {
        if best.is_none_or(|b| prob > b.prob) {
            best = Some(Vote { label, prob });
        }
    }
    best
}

/// Uncertainty of a prediction whose label received `prob` of the weight.
///
/// Clamped at zero so that rounding in the weight sum cannot make it negative.
#[inline]
pub fn uncertainty(prob: f64) -> f64 {
    (1.0 - prob).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanimous_vote() {
        let vote = weighted_vote(["A", "A", "A"], &[0.5, 0.25, 0.25]).unwrap();
        assert_eq!(vote.label, "A");
        assert_eq!(vote.prob, 1.0);
        assert_eq!(uncertainty(vote.prob), 0.0);

        let vote = weighted_vote(["A", "A", "A"], &[0.1, 0.2, 0.7]).unwrap();
        assert_eq!(vote.prob, 1.0);
    }

    #[test]
    fn heaviest_label_wins_over_majority() {
        let vote = weighted_vote(["B", "A", "A"], &[0.6, 0.2, 0.2]).unwrap();
        assert_eq!(vote.label, "B");
        assert!((vote.prob - 0.6).abs() < 1e-12);
    }

    #[test]
    fn ties_resolve_to_smallest_label() {
        let vote = weighted_vote(["beta", "alpha"], &[0.5, 0.5]).unwrap();
        assert_eq!(vote.label, "alpha");

        // Ordering is by bytes, so uppercase sorts before lowercase.
        let vote = weighted_vote(["b", "B"], &[0.5, 0.5]).unwrap();
        assert_eq!(vote.label, "B");
    }

    #[test]
    fn empty_vote() {
        assert!(weighted_vote(std::iter::empty(), &[]).is_none());
    }

    #[test]
    fn uncertainty_is_clamped() {
        assert_eq!(uncertainty(1.0 + 1e-15), 0.0);
        assert!((uncertainty(0.25) - 0.75).abs() < 1e-12);
    }
}
