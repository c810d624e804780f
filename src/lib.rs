//! bdelta: multi-pass block-matching binary delta encoding in Rust.
//!
//! The crate provides:
//! - Rolling token hash, match index and match extension (`hash`)
//! - Incremental matching sessions and whole-buffer diff/apply (`engine`)
//! - The self-validating patch format (`patch`)
//! - Optional compression of serialized patches (`compress`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! let source = b"hello old world, hello old world";
//! let target = b"hello new world, hello old world";
//!
//! let patch = bdelta::diff(source, target).unwrap();
//! let rebuilt = bdelta::apply(source, &patch).unwrap();
//! assert_eq!(rebuilt, target);
//! ```
//!
//! # Running passes by hand
//!
//! ```
//! use bdelta::{PassParams, Session};
//!
//! let a = b"The quick brown fox jumped over the lazy dog";
//! let b = b"The quick drowned fox jumped over the lazy dog";
//!
//! let mut session = Session::new(a, b);
//! session.run_pass(PassParams::new(27, 13)).unwrap();
//! session.run_pass(PassParams::new(5, 3)).unwrap();
//! session.run_pass(PassParams::new(3, 2)).unwrap();
//! let found: Vec<_> = session.matches().iter().map(|m| m.as_tuple()).collect();
//! assert_eq!(found, [(0, 0, 10), (11, 11, 4), (15, 17, 29)]);
//! ```

pub mod compress;
pub mod engine;
pub mod error;
pub mod hash;
pub mod io;
pub mod patch;

#[cfg(feature = "cli")]
pub mod cli;

pub use engine::{DiffOptions, Session, apply, diff, diff_with};
pub use error::{Error, Result};
pub use hash::{Match, PassParams, PassSchedule, PassScope};
pub use patch::MalformedPatch;
