//! Majority vote across bands.

use tracing::debug;

use crate::types::ColorClass;

/// Vote counts per class, in order of each class's first vote.
///
/// Absent votes are ignored; classes with no votes are omitted.
#[must_use]
pub fn tally(votes: &[Option<ColorClass>]) -> Vec<(ColorClass, usize)> {
    let mut counts: Vec<(ColorClass, usize)> = Vec::new();
    for &class in votes.iter().flatten() {
        match counts.iter_mut().find(|(c, _)| *c == class) {
            Some((_, n)) => *n += 1,
            None => counts.push((class, 1)),
        }
    }
    counts
}

/// The most frequent class among the present votes.
///
/// Ties go to the class that reaches the winning count first when the
/// votes are scanned in band order. Returns `None` when every vote is
/// absent (including an empty slice).
#[must_use]
pub fn aggregate(votes: &[Option<ColorClass>]) -> Option<ColorClass> {
    let max = tally(votes).into_iter().map(|(_, n)| n).max()?;

    let mut running = [0usize; ColorClass::ALL.len()];
    let winner = votes.iter().flatten().copied().find(|class| {
        let n = &mut running[class.index()];
        *n += 1;
        *n == max
    });
    debug!(?votes, ?winner, "aggregated band votes");
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColorClass::{Blue, Green, Magenta, Red, Yellow};

    #[test]
    fn plain_majority() {
        let votes = [Some(Green), Some(Blue), Some(Green)];
        assert_eq!(aggregate(&votes), Some(Green));
    }

    #[test]
    fn absent_votes_are_ignored() {
        let votes = [None, Some(Red), None, None, Some(Red)];
        assert_eq!(aggregate(&votes), Some(Red));
    }

    #[test]
    fn all_absent_is_none() {
        assert_eq!(aggregate(&[None, None, None]), None);
        assert_eq!(aggregate(&[]), None);
    }

    #[test]
    fn single_vote_wins() {
        assert_eq!(aggregate(&[None, None, Some(Yellow), None, None]), Some(Yellow));
    }

    #[test]
    fn tie_goes_to_first_to_reach_max() {
        // Blue reaches 2 at index 2, green only at index 3.
        let votes = [Some(Green), Some(Blue), Some(Blue), Some(Green)];
        assert_eq!(aggregate(&votes), Some(Blue));

        // Single-vote tie: first vote wins.
        let votes = [Some(Magenta), Some(Yellow)];
        assert_eq!(aggregate(&votes), Some(Magenta));
    }

    #[test]
    fn tally_in_first_vote_order() {
        let votes = [None, Some(Yellow), Some(Red), Some(Yellow)];
        assert_eq!(tally(&votes), vec![(Yellow, 2), (Red, 1)]);
    }

    #[test]
    fn winner_is_the_mode() {
        let votes = [Some(Red), Some(Blue), Some(Blue), None, Some(Red), Some(Blue)];
        let winner = aggregate(&votes).map(|c| {
            votes.iter().filter(|v| **v == Some(c)).count()
        });
        let best = tally(&votes).into_iter().map(|(_, n)| n).max();
        assert_eq!(winner, best);
    }
}
