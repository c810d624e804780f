// Pass parameters and pass schedules for the block-matching engine.
//
// A pass is described by a minimum accepted match length, the token width
// used as the hash key, a cap on candidates tried per scan section, and a
// scope (local to each gap, or global over all unused source).  A schedule
// is an ordered list of passes, normally coarse to fine.

use std::fmt;
use std::str::FromStr;

/// Candidate cap used by the default schedule.
pub const DEFAULT_MAX_CANDIDATES: usize = 128;

/// Largest token width of the default schedule.
pub const DEFAULT_MAX_TOKEN: usize = 256;

/// Smallest token width of the default schedule.
pub const DEFAULT_MIN_TOKEN: usize = 8;

/// Configuration errors, reported before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("token size must be at least 1")]
    ZeroTokenSize,
    #[error("minimum match length must be at least 1")]
    ZeroMinMatch,
    #[error("token size {token_size} exceeds minimum match length {min_match_len}")]
    TokenLargerThanMinMatch {
        token_size: usize,
        min_match_len: usize,
    },
    #[error("pass schedule is empty")]
    EmptySchedule,
    #[error("invalid pass description '{0}': expected MIN:TOKEN[:CAP][:g]")]
    Parse(String),
}

/// Which part of the source a pass may match against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PassScope {
    /// Each target gap is matched against the source range between the
    /// same neighbouring matches.  Accepted matches stay monotone in both
    /// buffers.
    #[default]
    Local,
    /// Each target gap is matched against every source byte not yet used by
    /// an accepted match, so moved and duplicated blocks are found.
    Global,
}

/// Parameters of a single matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassParams {
    /// Shortest match the pass accepts.
    pub min_match_len: usize,
    /// Width in bytes of the token used as hash key.
    pub token_size: usize,
    /// Candidates tried per scan section (0 = unlimited).  A section is the
    /// run of `token_size` target positions starting at the first lookup
    /// with a candidate.
    pub max_candidates: usize,
    pub scope: PassScope,
}

impl PassParams {
    /// Local pass with the default candidate cap.
    pub fn new(min_match_len: usize, token_size: usize) -> Self {
        Self {
            min_match_len,
            token_size,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            scope: PassScope::Local,
        }
    }

    /// Set the candidate cap (0 = unlimited).
    pub fn max_candidates(mut self, cap: usize) -> Self {
        self.max_candidates = cap;
        self
    }

    pub fn scope(mut self, scope: PassScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn global(self) -> Self {
        self.scope(PassScope::Global)
    }

    /// Reject parameter combinations that can never accept a match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_size == 0 {
            return Err(ConfigError::ZeroTokenSize);
        }
        if self.min_match_len == 0 {
            return Err(ConfigError::ZeroMinMatch);
        }
        if self.token_size > self.min_match_len {
            return Err(ConfigError::TokenLargerThanMinMatch {
                token_size: self.token_size,
                min_match_len: self.min_match_len,
            });
        }
        Ok(())
    }

    /// Distance between indexed source positions.
    ///
    /// Any match of at least `min_match_len` bytes fully contains one token
    /// starting at a multiple of this stride from the range start.
    #[inline]
    pub fn index_step(&self) -> usize {
        self.min_match_len - self.token_size + 1
    }

    /// Effective cap, with 0 mapped to "no limit".
    #[inline]
    pub fn candidate_limit(&self) -> usize {
        if self.max_candidates == 0 {
            usize::MAX
        } else {
            self.max_candidates
        }
    }
}

impl fmt::Display for PassParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.min_match_len, self.token_size)?;
        if self.max_candidates != DEFAULT_MAX_CANDIDATES {
            write!(f, ":{}", self.max_candidates)?;
        }
        if self.scope == PassScope::Global {
            f.write_str(":g")?;
        }
        Ok(())
    }
}

impl FromStr for PassParams {
    type Err = ConfigError;

    /// Parse `MIN:TOKEN`, optionally followed by `:CAP` and a `:g` suffix
    /// for a global pass.  The cap defaults to `DEFAULT_MAX_CANDIDATES`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || ConfigError::Parse(s.to_string());
        let mut fields: Vec<&str> = s.trim().split(':').map(str::trim).collect();
        let global = fields.last() == Some(&"g");
        if global {
            fields.pop();
        }
        if !(2..=3).contains(&fields.len()) {
            return Err(parse_err());
        }
        let num = |f: &str| f.parse::<usize>().map_err(|_| parse_err());
        let mut params = PassParams::new(num(fields[0])?, num(fields[1])?);
        if let Some(cap) = fields.get(2) {
            params.max_candidates = num(cap)?;
        }
        if global {
            params = params.global();
        }
        params.validate()?;
        Ok(params)
    }
}

/// Ordered list of passes run by `diff_with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSchedule {
    passes: Vec<PassParams>,
}

impl PassSchedule {
    /// Schedule from explicit passes; every pass is validated.
    pub fn new(passes: Vec<PassParams>) -> Result<Self, ConfigError> {
        if passes.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for p in &passes {
            p.validate()?;
        }
        Ok(Self { passes })
    }

    /// Halve the token width from `max_token` down to `min_token`, each pass
    /// accepting matches of at least twice its token width.
    pub fn halving(max_token: usize, min_token: usize) -> Result<Self, ConfigError> {
        if min_token == 0 {
            return Err(ConfigError::ZeroTokenSize);
        }
        let mut passes = Vec::new();
        let mut token = max_token;
        while token >= min_token {
            passes.push(PassParams::new(token * 2, token));
            token /= 2;
        }
        Self::new(passes)
    }

    /// The same schedule with every pass set to `scope`.
    pub fn with_scope(mut self, scope: PassScope) -> Self {
        for p in &mut self.passes {
            p.scope = scope;
        }
        self
    }

    pub fn passes(&self) -> &[PassParams] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Minimum match length of the last (finest) pass.
    pub fn finest_min_match(&self) -> usize {
        self.passes
            .iter()
            .map(|p| p.min_match_len)
            .min()
            .unwrap_or(1)
    }
}

impl Default for PassSchedule {
    /// `(512,256) (256,128) (128,64) (64,32) (32,16) (16,8)`, 128 candidates each.
    fn default() -> Self {
        let passes = (0..)
            .map(|shift| DEFAULT_MAX_TOKEN >> shift)
            .take_while(|&t| t >= DEFAULT_MIN_TOKEN)
            .map(|t| PassParams::new(t * 2, t))
            .collect();
        Self { passes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_shape() {
        let s = PassSchedule::default();
        let pairs: Vec<(usize, usize)> = s
            .passes()
            .iter()
            .map(|p| (p.min_match_len, p.token_size))
            .collect();
        assert_eq!(
            pairs,
            vec![(512, 256), (256, 128), (128, 64), (64, 32), (32, 16), (16, 8)]
        );
        assert!(s.passes().iter().all(|p| p.max_candidates == 128));
        assert_eq!(s.finest_min_match(), 16);
    }

    #[test]
    fn halving_matches_default() {
        assert_eq!(PassSchedule::halving(256, 8).unwrap(), PassSchedule::default());
    }

    #[test]
    fn token_larger_than_min_is_rejected() {
        let err = PassParams::new(3, 4).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::TokenLargerThanMinMatch {
                token_size: 4,
                min_match_len: 3
            }
        );
    }

    #[test]
    fn zero_values_are_rejected() {
        assert_eq!(PassParams::new(4, 0).validate(), Err(ConfigError::ZeroTokenSize));
        assert_eq!(PassParams::new(0, 0).validate(), Err(ConfigError::ZeroTokenSize));
        assert!(PassSchedule::new(Vec::new()).is_err());
        assert!(PassSchedule::halving(8, 0).is_err());
    }

    #[test]
    fn index_step_and_limit() {
        let p = PassParams::new(27, 13);
        assert_eq!(p.index_step(), 15);
        assert_eq!(p.candidate_limit(), DEFAULT_MAX_CANDIDATES);
        assert_eq!(p.max_candidates(0).candidate_limit(), usize::MAX);
        assert_eq!(p.max_candidates(4).candidate_limit(), 4);
        assert_eq!(PassParams::new(5, 5).index_step(), 1);
    }

    #[test]
    fn parse_pass_descriptions() {
        let p = "27:13".parse::<PassParams>().unwrap();
        assert_eq!(p, PassParams::new(27, 13));
        assert_eq!(p.max_candidates, DEFAULT_MAX_CANDIDATES);
        assert_eq!(
            "16:8:32".parse::<PassParams>().unwrap(),
            PassParams::new(16, 8).max_candidates(32)
        );
        assert_eq!(
            "16:8:0:g".parse::<PassParams>().unwrap(),
            PassParams::new(16, 8).max_candidates(0).global()
        );
        assert_eq!("64:32:g".parse::<PassParams>().unwrap(), PassParams::new(64, 32).global());
        assert!("16".parse::<PassParams>().is_err());
        assert!("g".parse::<PassParams>().is_err());
        assert!("a:b".parse::<PassParams>().is_err());
        assert!("2:3".parse::<PassParams>().is_err());
        assert!("16:8:x".parse::<PassParams>().is_err());
        assert_eq!(PassParams::new(16, 8).max_candidates(32).to_string(), "16:8:32");
        assert_eq!(PassParams::new(5, 3).to_string(), "5:3");
        assert_eq!(PassParams::new(5, 3).max_candidates(0).global().to_string(), "5:3:0:g");
    }

    #[test]
    fn schedule_scope_applies_to_every_pass() {
        let s = PassSchedule::default().with_scope(PassScope::Global);
        assert!(s.passes().iter().all(|p| p.scope == PassScope::Global));
        assert_eq!(s.len(), PassSchedule::default().len());
    }
}
