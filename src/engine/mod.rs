// Delta engine: ties the hash/matching primitives to the match set and the
// patch codec.
//
// A `Session` owns the running match set for one (source, target) pair and
// runs caller-chosen passes over it:
//   - Gap Recursor: derive the unmatched gaps from the match set
//   - Pass Controller: search each gap, resolve candidates, insert
//   - Patch encoding of the final set (patch module)
//
// `diff` / `diff_with` drive a whole schedule; `apply` replays a patch.

pub mod match_set;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::hash::config::{PassParams, PassSchedule, PassScope};
use crate::hash::matching::{self, Gap, Match};
use crate::hash::rolling::{self, TokenHash};
use crate::hash::table::MatchIndex;
use crate::patch::decoder::{self, MalformedPatch};
use crate::patch::encoder::{self, EncodeOptions, Op};

pub use match_set::MatchSet;

// ---------------------------------------------------------------------------
// Diff options
// ---------------------------------------------------------------------------

/// Configuration for a whole-buffer diff.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Passes to run, in order.
    pub schedule: PassSchedule,
    /// Record the common prefix and suffix before the first pass.
    pub anchor_ends: bool,
    /// Patch serialization options.
    pub encode: EncodeOptions,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            schedule: PassSchedule::default(),
            anchor_ends: true,
            encode: EncodeOptions::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Incremental matching state for one source/target pair.
///
/// Buffers are borrowed for the lifetime of the session and never mutated.
/// The match set only grows; every pass searches what earlier passes left
/// unmatched.
#[derive(Debug, Clone)]
pub struct Session<'a> {
    source: &'a [u8],
    target: &'a [u8],
    matches: MatchSet,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Session<'a> {
    pub fn new(source: &'a [u8], target: &'a [u8]) -> Self {
        Self {
            source,
            target,
            matches: MatchSet::new(),
            cancel: None,
        }
    }

    /// Attach a cooperative cancellation flag, checked before each pass and
    /// between gaps.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn source(&self) -> &'a [u8] {
        self.source
    }

    pub fn target(&self) -> &'a [u8] {
        self.target
    }

    /// Accepted matches, sorted by target position.
    pub fn matches(&self) -> Vec<Match> {
        self.matches.to_vec()
    }

    pub fn match_set(&self) -> &MatchSet {
        &self.matches
    }

    /// Current unmatched regions, in position order, including both boundary
    /// gaps (which may be empty).
    pub fn gaps(&self) -> Vec<Gap> {
        self.matches.gaps(self.source.len(), self.target.len())
    }

    /// Target bytes covered by accepted matches.
    pub fn coverage(&self) -> usize {
        self.matches.coverage()
    }

    pub fn num_matches(&self) -> usize {
        self.matches.len()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            debug!("session cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Run one pass over every current gap and return the newly accepted
    /// matches, sorted by target position.
    ///
    /// A pass whose token is wider than its minimum match length is rejected
    /// before any work is done.  If the cancellation flag is raised mid-pass,
    /// matches already inserted for earlier gaps are kept.
    pub fn run_pass(&mut self, params: PassParams) -> Result<Vec<Match>> {
        params.validate()?;
        self.check_cancelled()?;

        let gaps = self.search_regions(&params);
        let index = (params.scope == PassScope::Global).then(|| {
            let unused = self.matches.unused_source(self.source.len());
            MatchIndex::build_ranges(
                self.source,
                &unused,
                &TokenHash::new(params.token_size),
                params.index_step(),
            )
        });
        let found = self.search_gaps(&gaps, &params, index.as_ref());

        let mut accepted = Vec::new();
        for (i, (gap, candidates)) in gaps.iter().zip(found).enumerate() {
            let Some(candidates) = candidates else {
                debug!("pass {params}: cancelled before gap {i}");
                return Err(Error::Cancelled);
            };
            let (before, searched) = (accepted.len(), candidates.len());
            self.resolve(candidates, &params, &mut accepted);
            debug!(
                "pass {params}: gap {i} source {}..{} target {}..{}: {} candidates, {} accepted",
                gap.source_start,
                gap.source_end,
                gap.target_start,
                gap.target_end,
                searched,
                accepted.len() - before,
            );
        }

        debug_assert!(self.matches.is_consistent(self.source, self.target));
        accepted.sort_by_key(|m| m.target_pos);
        info!(
            "pass {params}: searched {} gaps, accepted {} matches, coverage {}/{}",
            gaps.len(),
            accepted.len(),
            self.coverage(),
            self.target.len(),
        );
        Ok(accepted)
    }

    /// Regions a pass searches.  A local pass uses the gaps as they are; a
    /// global pass keeps each gap's target range and lets extension reach
    /// the whole source.
    fn search_regions(&self, params: &PassParams) -> Vec<Gap> {
        let gaps = self.gaps().into_iter();
        match params.scope {
            PassScope::Local => gaps.filter(|g| g.can_hold(params.min_match_len)).collect(),
            PassScope::Global => gaps
                .map(|g| Gap::new(0, self.source.len(), g.target_start, g.target_end))
                .filter(|g| g.can_hold(params.min_match_len))
                .collect(),
        }
    }

    fn search_gap(&self, gap: &Gap, params: &PassParams, index: Option<&MatchIndex>) -> Vec<Match> {
        match index {
            Some(index) => {
                let hasher = TokenHash::new(params.token_size);
                matching::scan_gap(self.source, self.target, gap, index, &hasher, params)
            }
            None => matching::find_candidates(self.source, self.target, gap, params),
        }
    }

    /// Candidate search for every gap, in order; `None` marks gaps skipped
    /// after cancellation.
    fn search_gaps_sequential(
        &self,
        gaps: &[Gap],
        params: &PassParams,
        index: Option<&MatchIndex>,
    ) -> Vec<Option<Vec<Match>>> {
        let mut cancelled = false;
        gaps.iter()
            .map(|gap| {
                cancelled = cancelled || self.is_cancelled();
                (!cancelled).then(|| self.search_gap(gap, params, index))
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn search_gaps(&self, gaps: &[Gap], params: &PassParams, index: Option<&MatchIndex>) -> Vec<Option<Vec<Match>>> {
        self.search_gaps_sequential(gaps, params, index)
    }

    /// Candidate search for every gap on the rayon pool; `None` marks gaps
    /// skipped after cancellation.
    #[cfg(feature = "parallel")]
    fn search_gaps(&self, gaps: &[Gap], params: &PassParams, index: Option<&MatchIndex>) -> Vec<Option<Vec<Match>>> {
        use rayon::prelude::*;

        if gaps.len() < 2 {
            return self.search_gaps_sequential(gaps, params, index);
        }
        let mut found: Vec<Option<Vec<Match>>> = gaps
            .par_iter()
            .map(|gap| (!self.is_cancelled()).then(|| self.search_gap(gap, params, index)))
            .collect();
        // Gaps after the first skipped one are treated as skipped too.
        if let Some(first_skipped) = found.iter().position(Option::is_none) {
            found.truncate(first_skipped);
            found.resize(gaps.len(), None);
        }
        found
    }

    /// Longest candidates first (stable, so ties keep scan order), each
    /// clipped against the match set and kept if still long enough.
    fn resolve(&mut self, mut candidates: Vec<Match>, params: &PassParams, accepted: &mut Vec<Match>) {
        candidates.sort_by(|a, b| b.len.cmp(&a.len));
        for cand in &candidates {
            let clipped = match params.scope {
                PassScope::Local => self.matches.clip(cand),
                PassScope::Global => self.matches.clip_target(cand),
            };
            let Some(m) = clipped.filter(|m| m.len >= params.min_match_len) else {
                continue;
            };
            match params.scope {
                PassScope::Local => self.matches.insert(m),
                PassScope::Global => self.matches.insert_unordered(m),
            }
            accepted.push(m);
        }
    }

    /// Run every pass of `schedule` in order; returns the total number of
    /// matches accepted.
    pub fn run_schedule(&mut self, schedule: &PassSchedule) -> Result<usize> {
        let mut total = 0;
        for &params in schedule.passes() {
            total += self.run_pass(params)?.len();
        }
        Ok(total)
    }

    /// Record the common prefix of the first gap and the common suffix of
    /// the last gap as matches.
    ///
    /// Each is kept when it is at least `min_len` bytes long or spans its
    /// whole target gap.  Returns the matches added.
    pub fn anchor_ends(&mut self, min_len: usize) -> Vec<Match> {
        let mut added = Vec::new();
        let keep = |len: usize, gap: &Gap| len > 0 && (len >= min_len || len == gap.target_len());

        if let Some(first) = self.gaps().first().copied() {
            let len = rolling::forward_match(
                &self.source[first.source_start..first.source_end],
                &self.target[first.target_start..first.target_end],
                usize::MAX,
            );
            if keep(len, &first) {
                let m = Match::new(first.source_start, first.target_start, len);
                self.matches.insert(m);
                added.push(m);
            }
        }

        if let Some(last) = self.gaps().last().copied() {
            let len = rolling::backward_match(
                &self.source[last.source_start..last.source_end],
                &self.target[last.target_start..last.target_end],
                usize::MAX,
            );
            if keep(len, &last) {
                let m = Match::new(last.source_end - len, last.target_end - len, len);
                self.matches.insert(m);
                added.push(m);
            }
        }

        if !added.is_empty() {
            debug!("anchored {} end matches, coverage {}", added.len(), self.coverage());
        }
        added
    }

    /// Trim accepted matches so that no two copy the same source bytes.
    ///
    /// Only global passes can produce such matches; after local passes this
    /// does nothing.  Returns the number of target bytes left uncovered.
    pub fn clean_matches(&mut self) -> usize {
        let uncovered = self.matches.clean();
        if uncovered > 0 {
            debug!("cleaned shared source, {uncovered} target bytes uncovered");
        }
        debug_assert!(self.matches.is_consistent(self.source, self.target));
        uncovered
    }

    /// Exchange source and target, mirroring every accepted match.
    ///
    /// Matches that share source bytes are cleaned first, since they cannot
    /// be mirrored.  Encoding afterwards yields the reverse patch.
    pub fn swap_inputs(&mut self) {
        self.clean_matches();
        std::mem::swap(&mut self.source, &mut self.target);
        self.matches = self.matches.mirrored();
        debug_assert!(self.matches.is_consistent(self.source, self.target));
    }

    /// Edit script covering the whole target.
    pub fn operations(&self) -> Vec<Op<'a>> {
        encoder::operations(&self.matches.to_vec(), self.target)
    }

    /// Serialize the current match set with default options.
    pub fn encode_patch(&self) -> Vec<u8> {
        self.encode_patch_with(&EncodeOptions::default())
    }

    pub fn encode_patch_with(&self, opts: &EncodeOptions) -> Vec<u8> {
        encoder::encode(self.source, self.target, &self.matches.to_vec(), opts)
    }
}

// ---------------------------------------------------------------------------
// High-level diff / apply
// ---------------------------------------------------------------------------

/// Diff `source` against `target` with the default schedule.
pub fn diff(source: &[u8], target: &[u8]) -> Result<Vec<u8>> {
    diff_with(source, target, &DiffOptions::default())
}

/// Diff with custom options.
pub fn diff_with(source: &[u8], target: &[u8], opts: &DiffOptions) -> Result<Vec<u8>> {
    let session = matched_session(source, target, opts)?;
    Ok(session.encode_patch_with(&opts.encode))
}

/// Run anchoring (if enabled) and the whole schedule, returning the session
/// for inspection before encoding.
pub fn matched_session<'a>(
    source: &'a [u8],
    target: &'a [u8],
    opts: &DiffOptions,
) -> Result<Session<'a>> {
    let mut session = Session::new(source, target);
    if opts.anchor_ends {
        session.anchor_ends(opts.schedule.finest_min_match());
    }
    session.run_schedule(&opts.schedule)?;
    Ok(session)
}

/// Reconstruct the target from `source` and a serialized patch.
pub fn apply(source: &[u8], patch: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
    decoder::apply(source, patch)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
