// The authoritative set of accepted matches.
//
// Invariants (checked on every insert):
//   - every match has len > 0
//   - matches are ordered by target position, strictly increasing
//   - no two matches overlap in the target
//   - while the set is monotone: source positions follow the target order
//     and no two matches overlap in the source
//
// Local passes only ever insert monotone matches.  A global pass may insert
// matches that cross or share source bytes; the set then stops being
// monotone and gaps keep only the target bounds that still make sense.
//
// Matches are keyed by target position in a BTreeMap, so insertion and
// neighbour lookup are O(log n) regardless of the order passes discover them.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::ops::Range;

use crate::hash::matching::{Gap, Match};

/// Sorted, target-disjoint collection of matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    by_target: BTreeMap<usize, Match>,
    unordered: bool,
}

#[inline]
fn entirely_before(x: &Match, m: &Match) -> bool {
    x.source_end() <= m.source_pos && x.target_end() <= m.target_pos
}

#[inline]
fn entirely_after(x: &Match, m: &Match) -> bool {
    x.source_pos >= m.source_end() && x.target_pos >= m.target_end()
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Matches in target order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Match> + '_ {
        self.by_target.values()
    }

    pub fn to_vec(&self) -> Vec<Match> {
        self.iter().copied().collect()
    }

    /// Total number of target bytes covered.
    pub fn coverage(&self) -> usize {
        self.iter().map(|m| m.len).sum()
    }

    /// Whether every match follows the previous one in both buffers.
    pub fn is_monotone(&self) -> bool {
        !self.unordered
    }

    fn neighbours(&self, m: &Match) -> (Option<&Match>, Option<&Match>) {
        let prev = self.by_target.range(..=m.target_pos).next_back().map(|(_, p)| p);
        let next = self
            .by_target
            .range((Excluded(m.target_pos), Unbounded))
            .next()
            .map(|(_, n)| n);
        (prev, next)
    }

    /// Insert a match that neither overlaps nor crosses any accepted match.
    ///
    /// # Panics
    ///
    /// Panics if `m` is empty or violates the ordering invariants; callers
    /// clip candidates first, so a violation is an engine bug.
    pub fn insert(&mut self, m: Match) {
        assert!(m.len > 0, "empty match {m} inserted into match set");
        let (prev, next) = self.neighbours(&m);
        if let Some(prev) = prev {
            assert!(
                entirely_before(prev, &m),
                "match {m} overlaps or crosses preceding match {prev}"
            );
        }
        if let Some(next) = next {
            assert!(
                entirely_after(next, &m),
                "match {m} overlaps or crosses following match {next}"
            );
        }
        self.by_target.insert(m.target_pos, m);
    }

    /// Insert a match that only has to be disjoint from the accepted matches
    /// in the target.  Clears the monotone flag when `m` crosses or shares
    /// source bytes with a neighbour.
    ///
    /// # Panics
    ///
    /// Panics if `m` is empty or overlaps an accepted match in the target.
    pub fn insert_unordered(&mut self, m: Match) {
        assert!(m.len > 0, "empty match {m} inserted into match set");
        let (prev, next) = self.neighbours(&m);
        let mut ordered = true;
        if let Some(prev) = prev {
            assert!(
                prev.target_end() <= m.target_pos,
                "match {m} overlaps preceding match {prev} in the target"
            );
            ordered &= entirely_before(prev, &m);
        }
        if let Some(next) = next {
            assert!(
                m.target_end() <= next.target_pos,
                "match {m} overlaps following match {next} in the target"
            );
            ordered &= entirely_after(next, &m);
        }
        if !ordered && !self.unordered {
            log::debug!("match {m} breaks source order; match set is no longer monotone");
            self.unordered = true;
        }
        self.by_target.insert(m.target_pos, m);
    }

    /// Accepted matches that are neither entirely before nor entirely after
    /// `m` in both buffers, in target order.
    pub fn conflicts(&self, m: &Match) -> Vec<Match> {
        let mut before: Vec<Match> = self
            .by_target
            .range(..m.target_pos)
            .rev()
            .map(|(_, x)| *x)
            .take_while(|x| !entirely_before(x, m))
            .collect();
        before.reverse();
        before.extend(
            self.by_target
                .range(m.target_pos..)
                .map(|(_, x)| *x)
                .take_while(|x| !entirely_after(x, m)),
        );
        before
    }

    /// Longest sub-range of `m` that can be inserted without overlapping or
    /// crossing an accepted match.  The earliest one wins a length tie.
    pub fn clip(&self, m: &Match) -> Option<Match> {
        if m.len == 0 {
            return None;
        }
        let conflicts = self.conflicts(m);
        if conflicts.is_empty() {
            return Some(*m);
        }

        let len = m.len as i64;
        let (sp, tp) = (m.source_pos as i64, m.target_pos as i64);
        let mut cursor = 0i64;
        let mut best = (0i64, 0i64);
        let mut last_lo = i64::MIN;

        // Offsets t in [lo, hi) would put m's t-th byte inside, or on the
        // wrong side of, the conflicting match.
        for x in &conflicts {
            let lo = (x.source_pos as i64 - sp).min(x.target_pos as i64 - tp);
            let hi = (x.source_end() as i64 - sp).max(x.target_end() as i64 - tp);
            debug_assert!(lo >= last_lo, "conflicts out of order");
            last_lo = lo;

            let lo = lo.clamp(0, len);
            if lo - cursor > best.1 - best.0 {
                best = (cursor, lo);
            }
            cursor = cursor.max(hi.clamp(0, len));
        }
        if len - cursor > best.1 - best.0 {
            best = (cursor, len);
        }

        let (start, end) = best;
        log::trace!("clip {m} against {} conflicts -> [{start}, {end})", conflicts.len());
        (end > start).then(|| {
            Match::new(
                m.source_pos + start as usize,
                m.target_pos + start as usize,
                (end - start) as usize,
            )
        })
    }

    /// Longest sub-range of `m` that does not overlap an accepted match in
    /// the target.  The earliest one wins a length tie.
    pub fn clip_target(&self, m: &Match) -> Option<Match> {
        if m.len == 0 {
            return None;
        }
        let tp = m.target_pos;
        let first = self
            .by_target
            .range(..tp)
            .next_back()
            .filter(|(_, x)| x.target_end() > tp)
            .map_or(tp, |(&k, _)| k);

        let mut cursor = 0usize;
        let mut best = (0usize, 0usize);
        for x in self.by_target.range(first..m.target_end()).map(|(_, x)| x) {
            let lo = x.target_pos.saturating_sub(tp);
            if lo > cursor && lo - cursor > best.1 - best.0 {
                best = (cursor, lo);
            }
            cursor = cursor.max((x.target_end() - tp).min(m.len));
        }
        if m.len > cursor && m.len - cursor > best.1 - best.0 {
            best = (cursor, m.len);
        }

        let (start, end) = best;
        (end > start).then(|| Match::new(m.source_pos + start, m.target_pos + start, end - start))
    }

    /// Unmatched regions between neighbouring matches, including the two
    /// boundary gaps.  Always `len() + 1` entries; some may be empty.
    ///
    /// When the neighbours are out of order in the source, the gap's source
    /// range is empty.
    pub fn gaps(&self, source_len: usize, target_len: usize) -> Vec<Gap> {
        let mut gaps = Vec::with_capacity(self.len() + 1);
        let (mut source_start, mut target_start) = (0, 0);
        for m in self.iter() {
            gaps.push(Gap::new(
                source_start,
                m.source_pos.max(source_start),
                target_start,
                m.target_pos,
            ));
            source_start = m.source_end();
            target_start = m.target_end();
        }
        gaps.push(Gap::new(
            source_start,
            source_len.max(source_start),
            target_start,
            target_len,
        ));
        gaps
    }

    /// Source ranges no accepted match uses, ascending.
    pub fn unused_source(&self, source_len: usize) -> Vec<Range<usize>> {
        let mut used: Vec<(usize, usize)> = self.iter().map(|m| (m.source_pos, m.source_end())).collect();
        used.sort_unstable();
        let mut unused = Vec::with_capacity(used.len() + 1);
        let mut last = 0;
        for (start, end) in used {
            if start > last {
                unused.push(last..start);
            }
            last = last.max(end);
        }
        if source_len > last {
            unused.push(last..source_len);
        }
        unused
    }

    /// Trim matches so that no two share source bytes.
    ///
    /// Walks the matches in source order (target order on ties); a match
    /// that starts inside source already claimed loses its front, or is
    /// dropped when nothing remains.  Returns the number of target bytes
    /// uncovered.  A monotone set is left untouched.
    pub fn clean(&mut self) -> usize {
        if !self.unordered {
            return 0;
        }
        let mut by_source = self.to_vec();
        by_source.sort_unstable_by_key(|m| (m.source_pos, m.target_pos));

        let before = self.coverage();
        let mut claimed = 0usize;
        self.by_target.clear();
        for m in by_source {
            let cut = claimed.saturating_sub(m.source_pos);
            if cut < m.len {
                let kept = Match::new(m.source_pos + cut, m.target_pos + cut, m.len - cut);
                self.by_target.insert(kept.target_pos, kept);
            }
            claimed = claimed.max(m.source_end());
        }
        self.unordered = self
            .to_vec()
            .windows(2)
            .any(|w| !entirely_before(&w[0], &w[1]));
        before - self.coverage()
    }

    /// The same matches with source and target exchanged.
    ///
    /// The matches must not share source bytes (see `clean`).
    pub fn mirrored(&self) -> Self {
        let by_target: BTreeMap<usize, Match> = self
            .iter()
            .map(|m| (m.source_pos, m.mirrored()))
            .collect();
        debug_assert_eq!(by_target.len(), self.len(), "mirrored matches share source bytes");
        Self {
            by_target,
            unordered: self.unordered,
        }
    }

    /// Full invariant check, including byte equality against the buffers.
    pub fn is_consistent(&self, source: &[u8], target: &[u8]) -> bool {
        let mut prev: Option<&Match> = None;
        for (&key, m) in &self.by_target {
            if key != m.target_pos || !m.verify(source, target) {
                return false;
            }
            if let Some(p) = prev {
                let ordered = if self.unordered {
                    p.target_end() <= m.target_pos
                } else {
                    entirely_before(p, m)
                };
                if !ordered {
                    return false;
                }
            }
            prev = Some(m);
        }
        true
    }
}

impl<'a> IntoIterator for &'a MatchSet {
    type Item = &'a Match;
    type IntoIter = std::collections::btree_map::Values<'a, usize, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_target.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ms: &[(usize, usize, usize)]) -> MatchSet {
        let mut s = MatchSet::new();
        for &m in ms {
            s.insert(m.into());
        }
        s
    }

    #[test]
    fn insert_keeps_target_order() {
        let s = set(&[(15, 17, 29), (0, 0, 10), (11, 11, 4)]);
        let tuples: Vec<_> = s.iter().map(Match::as_tuple).collect();
        assert_eq!(tuples, vec![(0, 0, 10), (11, 11, 4), (15, 17, 29)]);
        assert_eq!(s.coverage(), 43);
    }

    #[test]
    #[should_panic(expected = "overlaps or crosses")]
    fn insert_rejects_overlap() {
        set(&[(0, 0, 10), (5, 20, 3), (9, 30, 2)]);
    }

    #[test]
    #[should_panic(expected = "overlaps or crosses")]
    fn insert_rejects_crossing() {
        set(&[(50, 0, 10), (0, 20, 10)]);
    }

    #[test]
    #[should_panic(expected = "empty match")]
    fn insert_rejects_empty() {
        set(&[(0, 0, 0)]);
    }

    #[test]
    fn clip_without_conflict_is_identity() {
        let s = set(&[(0, 0, 10)]);
        let m = Match::new(20, 20, 5);
        assert_eq!(s.clip(&m), Some(m));
    }

    #[test]
    fn clip_trims_target_overlap() {
        let s = set(&[(100, 10, 10)]);
        // Offsets 0..15 sit inside the accepted match or before it in one
        // buffer; the tail [15, 25) follows it in both.
        let clipped = s.clip(&Match::new(105, 5, 25));
        assert_eq!(clipped, Some(Match::new(120, 20, 10)));
    }

    #[test]
    fn clip_prefers_longest_then_earliest() {
        let s = set(&[(10, 10, 2)]);
        let clipped = s.clip(&Match::new(0, 0, 20));
        assert_eq!(clipped, Some(Match::new(0, 0, 10)));
        let s = set(&[(2, 2, 2)]);
        assert_eq!(s.clip(&Match::new(0, 0, 20)), Some(Match::new(4, 4, 16)));
        let s = set(&[(9, 9, 2)]);
        let clipped = s.clip(&Match::new(0, 0, 20));
        assert_eq!(clipped, Some(Match::new(0, 0, 9)));
        let s = set(&[(5, 5, 10)]);
        assert_eq!(s.clip(&Match::new(0, 0, 20)), Some(Match::new(0, 0, 5)));
    }

    #[test]
    fn clip_rejects_crossing_entirely() {
        let s = set(&[(0, 50, 10)]);
        // Source before, target after: every offset crosses.
        assert_eq!(s.clip(&Match::new(20, 0, 10)), None);
    }

    #[test]
    fn clipped_matches_insert_cleanly() {
        let mut s = set(&[(0, 0, 10), (40, 40, 10)]);
        let clipped = s.clip(&Match::new(5, 5, 40)).unwrap();
        assert_eq!(clipped, Match::new(10, 10, 30));
        s.insert(clipped);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn gaps_cover_unmatched_regions() {
        let s = set(&[(0, 0, 10), (11, 11, 4), (15, 17, 29)]);
        let gaps = s.gaps(44, 46);
        assert_eq!(
            gaps,
            vec![
                Gap::new(0, 0, 0, 0),
                Gap::new(10, 11, 10, 11),
                Gap::new(15, 15, 15, 17),
                Gap::new(44, 44, 46, 46),
            ]
        );
        assert_eq!(MatchSet::new().gaps(3, 4), vec![Gap::whole(3, 4)]);
    }

    #[test]
    fn clip_target_ignores_source_order() {
        let s = set(&[(50, 10, 10)]);
        // Crossing in the source does not matter, only target overlap.
        assert_eq!(s.clip_target(&Match::new(0, 20, 10)), Some(Match::new(0, 20, 10)));
        assert_eq!(s.clip_target(&Match::new(0, 5, 20)), Some(Match::new(0, 5, 5)));
        assert_eq!(s.clip_target(&Match::new(0, 0, 14)), Some(Match::new(0, 0, 10)));
        assert_eq!(s.clip_target(&Match::new(0, 12, 4)), None);
    }

    #[test]
    fn unordered_insert_tracks_monotonicity() {
        let mut s = set(&[(0, 0, 10)]);
        s.insert_unordered(Match::new(20, 20, 5));
        assert!(s.is_monotone());
        s.insert_unordered(Match::new(0, 30, 10));
        assert!(!s.is_monotone());
        assert_eq!(s.len(), 3);
    }

    #[test]
    #[should_panic(expected = "in the target")]
    fn unordered_insert_rejects_target_overlap() {
        let mut s = set(&[(0, 0, 10)]);
        s.insert_unordered(Match::new(40, 5, 10));
    }

    #[test]
    fn gaps_of_crossing_neighbours_have_no_source() {
        let mut s = MatchSet::new();
        s.insert_unordered(Match::new(30, 0, 10));
        s.insert_unordered(Match::new(0, 20, 10));
        let gaps = s.gaps(40, 40);
        assert_eq!(gaps[1], Gap::new(40, 40, 10, 20));
        assert!(!gaps[1].can_hold(1));
        assert_eq!(gaps[2], Gap::new(10, 40, 30, 40));
    }

    #[test]
    fn unused_source_is_the_complement() {
        let mut s = MatchSet::new();
        s.insert_unordered(Match::new(30, 0, 10));
        s.insert_unordered(Match::new(5, 20, 10));
        s.insert_unordered(Match::new(8, 40, 4));
        assert_eq!(s.unused_source(50), vec![0..5, 15..30, 40..50]);
        assert_eq!(MatchSet::new().unused_source(3), vec![0..3]);
    }

    #[test]
    fn clean_removes_shared_source() {
        let mut s = MatchSet::new();
        s.insert_unordered(Match::new(0, 0, 10));
        s.insert_unordered(Match::new(5, 20, 10));
        s.insert_unordered(Match::new(2, 40, 4));
        let uncovered = s.clean();
        let tuples: Vec<_> = s.iter().map(Match::as_tuple).collect();
        // (2, 40, 4) lies inside claimed source and is dropped.
        assert_eq!(tuples, vec![(0, 0, 10), (10, 25, 5)]);
        assert_eq!(uncovered, 9);
        assert!(s.is_monotone());
    }

    #[test]
    fn clean_leaves_crossing_disjoint_matches() {
        let mut s = MatchSet::new();
        s.insert_unordered(Match::new(20, 0, 10));
        s.insert_unordered(Match::new(0, 10, 10));
        assert_eq!(s.clean(), 0);
        assert_eq!(s.len(), 2);
        assert!(!s.is_monotone());
        let m = s.mirrored();
        let tuples: Vec<_> = m.iter().map(Match::as_tuple).collect();
        assert_eq!(tuples, vec![(10, 0, 10), (0, 20, 10)]);
    }

    #[test]
    fn mirrored_swaps_coordinates() {
        let s = set(&[(0, 2, 3), (10, 20, 5)]);
        let m = s.mirrored();
        let tuples: Vec<_> = m.iter().map(Match::as_tuple).collect();
        assert_eq!(tuples, vec![(2, 0, 3), (20, 10, 5)]);
    }

    #[test]
    fn consistency_check_verifies_bytes() {
        let a = b"hello world";
        let b = b"hello there world";
        let s = set(&[(0, 0, 6), (6, 12, 5)]);
        assert!(s.is_consistent(a, b));
        let bad = set(&[(0, 0, 7)]);
        assert!(!bad.is_consistent(a, b));
    }
}
