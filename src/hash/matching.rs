// Candidate search for one pass inside one gap.
//
//   1. Index the gap's source range (MatchIndex, strided tokens).
//   2. Roll a token checksum across the gap's target range.
//   3. Extend candidates forward and backward, bounded by the gap.
//   4. Keep the longest extension per section, skip past it.
//
// Candidates may overlap one another; resolving them against the match set
// happens in the engine.

use std::collections::HashMap;
use std::fmt;

use super::config::PassParams;
use super::rolling::{self, TokenHash};
use super::table::MatchIndex;

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// A verified equal byte range: `source[source_pos..][..len] == target[target_pos..][..len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Match {
    /// Start in the source (old) buffer.
    pub source_pos: usize,
    /// Start in the target (new) buffer.
    pub target_pos: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Match {
    pub const fn new(source_pos: usize, target_pos: usize, len: usize) -> Self {
        Self {
            source_pos,
            target_pos,
            len,
        }
    }

    #[inline]
    pub fn source_end(&self) -> usize {
        self.source_pos + self.len
    }

    #[inline]
    pub fn target_end(&self) -> usize {
        self.target_pos + self.len
    }

    /// `(posA, posB, length)`.
    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.source_pos, self.target_pos, self.len)
    }

    /// Same match with source and target exchanged.
    pub fn mirrored(&self) -> Self {
        Self::new(self.target_pos, self.source_pos, self.len)
    }

    /// Whether the claimed ranges really are equal.
    pub fn verify(&self, source: &[u8], target: &[u8]) -> bool {
        self.len > 0
            && self.source_end() <= source.len()
            && self.target_end() <= target.len()
            && source[self.source_pos..self.source_end()]
                == target[self.target_pos..self.target_end()]
    }

    /// Offset along the match's diagonal, `source_pos - target_pos`.
    #[inline]
    fn diagonal(source_pos: usize, target_pos: usize) -> i64 {
        source_pos as i64 - target_pos as i64
    }
}

impl From<(usize, usize, usize)> for Match {
    fn from((source_pos, target_pos, len): (usize, usize, usize)) -> Self {
        Self::new(source_pos, target_pos, len)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.source_pos, self.target_pos, self.len)
    }
}

// ---------------------------------------------------------------------------
// Gap
// ---------------------------------------------------------------------------

/// Unmatched region between two neighbouring matches (or a buffer edge),
/// restricted in both buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub source_start: usize,
    pub source_end: usize,
    pub target_start: usize,
    pub target_end: usize,
}

impl Gap {
    pub const fn new(
        source_start: usize,
        source_end: usize,
        target_start: usize,
        target_end: usize,
    ) -> Self {
        Self {
            source_start,
            source_end,
            target_start,
            target_end,
        }
    }

    /// The whole of both buffers.
    pub fn whole(source_len: usize, target_len: usize) -> Self {
        Self::new(0, source_len, 0, target_len)
    }

    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_end - self.source_start
    }

    #[inline]
    pub fn target_len(&self) -> usize {
        self.target_end - self.target_start
    }

    /// Whether a match of `len` bytes could fit in both ranges.
    #[inline]
    pub fn can_hold(&self, len: usize) -> bool {
        self.source_len() >= len && self.target_len() >= len
    }

    #[inline]
    fn contains(&self, m: &Match) -> bool {
        m.source_pos >= self.source_start
            && m.source_end() <= self.source_end
            && m.target_pos >= self.target_start
            && m.target_end() <= self.target_end
    }
}

// ---------------------------------------------------------------------------
// Match extension
// ---------------------------------------------------------------------------

/// Grow the pair `(source_pos, target_pos)` into its maximal equal run,
/// never leaving `gap`.
///
/// Returns a zero-length match when the bytes at the pair differ (a hash
/// collision).
pub fn extend(
    source: &[u8],
    target: &[u8],
    source_pos: usize,
    target_pos: usize,
    gap: &Gap,
) -> Match {
    debug_assert!(source_pos >= gap.source_start && source_pos <= gap.source_end);
    debug_assert!(target_pos >= gap.target_start && target_pos <= gap.target_end);

    let fwd_max = (gap.source_end - source_pos).min(gap.target_end - target_pos);
    let fwd = rolling::forward_match(&source[source_pos..], &target[target_pos..], fwd_max);
    if fwd == 0 {
        return Match::new(source_pos, target_pos, 0);
    }

    let back_max = (source_pos - gap.source_start).min(target_pos - gap.target_start);
    let back = rolling::backward_match(&source[..source_pos], &target[..target_pos], back_max);

    let m = Match::new(source_pos - back, target_pos - back, back + fwd);
    debug_assert!(gap.contains(&m));
    m
}

// ---------------------------------------------------------------------------
// Candidate scan
// ---------------------------------------------------------------------------

/// Find candidate matches of at least `params.min_match_len` bytes inside `gap`.
///
/// Indexes the gap's source range and scans its target range.  Candidates
/// are returned in scan order (ascending target position of the section
/// that found them).  They are verified but may overlap each other.
pub fn find_candidates(source: &[u8], target: &[u8], gap: &Gap, params: &PassParams) -> Vec<Match> {
    if !gap.can_hold(params.min_match_len) {
        return Vec::new();
    }
    let hasher = TokenHash::new(params.token_size);
    let index = MatchIndex::build(
        source,
        gap.source_start..gap.source_end,
        &hasher,
        params.index_step(),
    );
    scan_gap(source, target, gap, &index, &hasher, params)
}

/// Scan `gap`'s target range against a prebuilt source index.
///
/// Target positions are visited in ascending order.  At each one the token
/// is looked up and its source candidates are tried starting at the end of
/// the previously recorded candidate, wrapping around, so runs of similar
/// data line up behind each other.  Each candidate is extended inside
/// `gap`; a diagonal already extended past the current position is skipped.
///
/// Positions are grouped in sections of `token_size`, starting at the first
/// position that tries a candidate.  A section tries at most
/// `max_candidates` candidates; once that is spent, the rest of the section
/// is skipped.  The longest extension of a section (first on ties) is
/// recorded when it reaches `min_match_len`, and the scan resumes after its
/// target end.
pub fn scan_gap(
    source: &[u8],
    target: &[u8],
    gap: &Gap,
    index: &MatchIndex,
    hasher: &TokenHash,
    params: &PassParams,
) -> Vec<Match> {
    let look = params.token_size;
    let min_len = params.min_match_len;
    let mut found = Vec::new();
    if index.is_empty() || gap.target_len() < min_len.max(look) {
        return found;
    }

    let limit = params.candidate_limit();
    // Furthest target position already reached on each diagonal.
    let mut reached: HashMap<i64, usize> = HashMap::new();
    let mut source_from = gap.source_start;

    let mut best: Option<Match> = None;
    let mut budget = limit;
    let mut section_end: Option<usize> = None;

    let mut pos = gap.target_start;
    let mut cksum = hasher.checksum(&target[pos..pos + look]);

    loop {
        for cand in index.candidates_from(cksum, source_from) {
            if budget == 0 {
                break;
            }
            let diagonal = Match::diagonal(cand, pos);
            if reached.get(&diagonal).is_some_and(|&end| pos < end) {
                continue;
            }
            budget -= 1;
            section_end.get_or_insert(pos + look);

            let m = extend(source, target, cand, pos, gap);
            if m.len == 0 {
                continue;
            }
            reached.insert(diagonal, m.target_end());
            if m.len >= min_len && best.is_none_or(|b| m.len > b.len) {
                best = Some(m);
            }
        }

        let mut next = pos + 1;
        if let Some(end) = section_end
            && (budget == 0 || next >= end)
        {
            next = next.max(end);
            if let Some(m) = best.take() {
                found.push(m);
                source_from = m.source_end();
                next = next.max(m.target_end());
            }
            budget = limit;
            section_end = None;
        }

        if next + look > gap.target_end {
            found.extend(best);
            break;
        }
        cksum = if next == pos + 1 {
            hasher.update(cksum, target[pos], target[pos + look])
        } else {
            hasher.checksum(&target[next..next + look])
        };
        pos = next;
    }

    found
}
