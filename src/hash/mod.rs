// Tokenizer, match index and match extension for the block-matching engine.
//
// This module provides:
// - Pass parameters and schedules (`config`)
// - Polynomial rolling token hash and byte comparators (`rolling`)
// - Bucketed token index over source ranges (`table`)
// - Match extension and the per-gap candidate scan (`matching`)

pub mod config;
pub mod matching;
pub mod rolling;
pub mod table;

pub use config::{ConfigError, PassParams, PassSchedule, PassScope};
pub use matching::{Gap, Match};
