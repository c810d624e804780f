// Command-line front end for bdelta.
//
// Subcommands wrap the file helpers (`diff`, `apply`), the incremental pass
// API (`matches`) and the patch parser (`inspect`).

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::compress::{self, SecondaryCompression};
use crate::engine::{DiffOptions, Session};
use crate::hash::config::{ConfigError, PassParams, PassSchedule, PassScope};
use crate::io::{self, hex};
use crate::patch::{EncodeOptions, Op, Patch, PatchFlags};

/// Zlib level used when `--secondary zlib` is given without `--level`.
const DEFAULT_ZLIB_LEVEL: u32 = 9;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Multi-pass block-matching binary diff and patch.
#[derive(Parser, Debug)]
#[command(
    name = "bdelta",
    version,
    about = "Binary delta encoder and patcher",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compute a patch that turns SOURCE into TARGET.
    Diff(DiffArgs),
    /// Rebuild the target from SOURCE and PATCH.
    Apply(ApplyArgs),
    /// Run passes one by one and print the accepted matches after each.
    Matches(MatchesArgs),
    /// Print a patch's header and operations.
    Inspect(InspectArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SecondaryArg {
    None,
    Zlib,
    Lzma,
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    /// Pass to run, as MIN:TOKEN[:CAP][:g]; repeat for a custom schedule.
    #[arg(long = "pass", value_name = "MIN:TOKEN[:CAP][:g]")]
    passes: Vec<PassParams>,

    /// Run every pass globally, allowing moved blocks and reordered copies.
    #[arg(long = "global")]
    global: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Old file.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// New file.
    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    /// Patch file to write.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    #[command(flatten)]
    schedule: ScheduleArgs,

    /// Compress the written patch.
    #[arg(long, value_enum, default_value_t = SecondaryArg::None)]
    secondary: SecondaryArg,

    /// Zlib compression level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_ZLIB_LEVEL)]
    level: u32,

    /// Do not embed a checksum of the source.
    #[arg(long = "no-source-checksum")]
    no_source_checksum: bool,

    /// Do not anchor the common prefix and suffix before the passes.
    #[arg(long = "no-anchor")]
    no_anchor: bool,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Old file the patch was made against.
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    /// Patch file (bare or compressed).
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Reconstructed file to write.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct MatchesArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    source: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    target: PathBuf,

    #[command(flatten)]
    schedule: ScheduleArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Patch file (bare or compressed).
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,

    /// Print the header only.
    #[arg(long)]
    summary: bool,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Diff,
    Apply,
    Matches,
    Inspect,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    source_file: Option<PathBuf>,
    target_file: Option<PathBuf>,
    patch_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    passes: Vec<PassParams>,
    global: bool,
    secondary: SecondaryArg,
    level: u32,
    source_checksum: bool,
    anchor_ends: bool,
    summary: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            source_file: None,
            target_file: None,
            patch_file: None,
            output_file: None,
            passes: Vec::new(),
            global: false,
            secondary: SecondaryArg::None,
            level: DEFAULT_ZLIB_LEVEL,
            source_checksum: true,
            anchor_ends: true,
            summary: false,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            json_output: cli.json_output,
        }
    }
}

fn resolve_options(cli: Cli) -> Options {
    match &cli.command {
        Cmd::Diff(args) => Options {
            source_file: Some(args.source.clone()),
            target_file: Some(args.target.clone()),
            patch_file: Some(args.patch.clone()),
            passes: args.schedule.passes.clone(),
            global: args.schedule.global,
            secondary: args.secondary,
            level: args.level,
            source_checksum: !args.no_source_checksum,
            anchor_ends: !args.no_anchor,
            ..Options::new(Command::Diff, &cli)
        },
        Cmd::Apply(args) => Options {
            source_file: Some(args.source.clone()),
            patch_file: Some(args.patch.clone()),
            output_file: Some(args.output.clone()),
            ..Options::new(Command::Apply, &cli)
        },
        Cmd::Matches(args) => Options {
            source_file: Some(args.source.clone()),
            target_file: Some(args.target.clone()),
            passes: args.schedule.passes.clone(),
            global: args.schedule.global,
            ..Options::new(Command::Matches, &cli)
        },
        Cmd::Inspect(args) => Options {
            patch_file: Some(args.patch.clone()),
            summary: args.summary,
            ..Options::new(Command::Inspect, &cli)
        },
        Cmd::Config => Options::new(Command::Config, &cli),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("bdelta".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = build_diff_options(&opts);
        let _ = build_secondary(&opts);
    }
}

// ---------------------------------------------------------------------------
// Option mapping
// ---------------------------------------------------------------------------

fn build_schedule(passes: &[PassParams], global: bool) -> Result<PassSchedule, ConfigError> {
    let schedule = if passes.is_empty() {
        PassSchedule::default()
    } else {
        PassSchedule::new(passes.to_vec())?
    };
    Ok(if global {
        schedule.with_scope(PassScope::Global)
    } else {
        schedule
    })
}

fn build_diff_options(opts: &Options) -> Result<DiffOptions, ConfigError> {
    Ok(DiffOptions {
        schedule: build_schedule(&opts.passes, opts.global)?,
        anchor_ends: opts.anchor_ends,
        encode: EncodeOptions {
            source_checksum: opts.source_checksum,
        },
    })
}

fn build_secondary(opts: &Options) -> SecondaryCompression {
    match opts.secondary {
        SecondaryArg::None => SecondaryCompression::None,
        #[cfg(feature = "zlib-secondary")]
        SecondaryArg::Zlib => SecondaryCompression::Zlib { level: opts.level },
        #[cfg(feature = "lzma-secondary")]
        SecondaryArg::Lzma => SecondaryCompression::Lzma,
        #[allow(unreachable_patterns)]
        other => {
            eprintln!("bdelta: warning: {other:?} compression not built in, writing a bare patch");
            SecondaryCompression::None
        }
    }
}

/// Refuse to clobber an existing output unless forced.
fn check_output(path: &Path, force: bool) -> bool {
    if path.exists() && !force {
        eprintln!(
            "bdelta: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return false;
    }
    true
}

fn read_input(label: &str, path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Some(data),
        Err(e) => {
            eprintln!("bdelta: {label} file: {}: {e}", path.display());
            None
        }
    }
}

fn digest(d: &Option<[u8; 32]>) -> serde_json::Value {
    d.as_ref()
        .map_or(serde_json::Value::Null, |d| serde_json::Value::String(hex(d)))
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("bdelta version {version}");

    let lzma = cfg!(feature = "lzma-secondary") as u8;
    let zlib = cfg!(feature = "zlib-secondary") as u8;
    let file_io = cfg!(feature = "file-io") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("SECONDARY_LZMA={lzma}");
    eprintln!("SECONDARY_ZLIB={zlib}");
    eprintln!("FILE_IO={file_io}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("PATCH_FORMAT_VERSION={}", crate::patch::header::VERSION);
    let schedule: Vec<String> = PassSchedule::default()
        .passes()
        .iter()
        .map(|p| format!("{}:{}:{}", p.min_match_len, p.token_size, p.max_candidates))
        .collect();
    eprintln!("DEFAULT_SCHEDULE={}", schedule.join(" "));
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Diff command
// ---------------------------------------------------------------------------

fn cmd_diff(opts: &Options) -> i32 {
    let (Some(source), Some(target), Some(patch)) =
        (&opts.source_file, &opts.target_file, &opts.patch_file)
    else {
        eprintln!("bdelta: diff needs SOURCE, TARGET and PATCH");
        return 1;
    };
    if !check_output(patch, opts.force) {
        return 1;
    }
    let diff_opts = match build_diff_options(opts) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("bdelta: {e}");
            return 1;
        }
    };

    let stats = match io::diff_files(source, target, patch, &diff_opts, &build_secondary(opts)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("bdelta: diff error: {e}");
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "bdelta: diff: source size: {}, target size: {}, patch size: {}, matches: {}, \
             copied: {}, inserted: {}",
            stats.source_size,
            stats.target_size,
            stats.patch_size,
            stats.matches,
            stats.copied_bytes,
            stats.inserted_bytes
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "diff",
            "source_size": stats.source_size,
            "target_size": stats.target_size,
            "patch_size": stats.patch_size,
            "matches": stats.matches,
            "copy_ops": stats.copy_ops,
            "insert_ops": stats.insert_ops,
            "copied_bytes": stats.copied_bytes,
            "inserted_bytes": stats.inserted_bytes,
            "packed": stats.packed,
            "source_sha256": digest(&stats.source_sha256),
            "target_sha256": digest(&stats.target_sha256),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn cmd_apply(opts: &Options) -> i32 {
    let (Some(source), Some(patch), Some(output)) =
        (&opts.source_file, &opts.patch_file, &opts.output_file)
    else {
        eprintln!("bdelta: apply needs SOURCE, PATCH and OUTPUT");
        return 1;
    };
    if !check_output(output, opts.force) {
        return 1;
    }

    let stats = match io::apply_files(source, patch, output) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("bdelta: apply error: {e}");
            return 1;
        }
    };

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "bdelta: apply: source size: {}, patch size: {}, output size: {}, ops: {}",
            stats.source_size, stats.patch_size, stats.output_size, stats.ops
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "apply",
            "source_size": stats.source_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "ops": stats.ops,
            "output_sha256": digest(&stats.output_sha256),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Matches command
// ---------------------------------------------------------------------------

fn format_matches(session: &Session<'_>) -> String {
    let items: Vec<String> = session.matches().iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn cmd_matches(opts: &Options) -> i32 {
    let (Some(source_path), Some(target_path)) = (&opts.source_file, &opts.target_file) else {
        eprintln!("bdelta: matches needs SOURCE and TARGET");
        return 1;
    };
    let schedule = match build_schedule(&opts.passes, opts.global) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("bdelta: {e}");
            return 1;
        }
    };
    let Some(source) = read_input("source", source_path) else {
        return 1;
    };
    let Some(target) = read_input("target", target_path) else {
        return 1;
    };

    let mut session = Session::new(&source, &target);
    let mut report = Vec::with_capacity(schedule.len());
    for &params in schedule.passes() {
        let accepted = match session.run_pass(params) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("bdelta: pass {params}: {e}");
                return 1;
            }
        };
        if !opts.quiet {
            println!("{params} {}", format_matches(&session));
        }
        report.push(serde_json::json!({
            "pass": params.to_string(),
            "accepted": accepted.len(),
            "coverage": session.coverage(),
        }));
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "matches",
            "source_size": source.len(),
            "target_size": target.len(),
            "passes": report,
            "matches": session.matches().iter().map(|m| m.as_tuple()).collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }

    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options) -> i32 {
    let Some(path) = &opts.patch_file else {
        eprintln!("bdelta: inspect needs PATCH");
        return 1;
    };
    let Some(stored) = read_input("patch", path) else {
        return 1;
    };
    let data = match compress::unpack(&stored) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("bdelta: {}: {e}", path.display());
            return 1;
        }
    };
    let patch = match Patch::parse(&data) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("bdelta: {}: {e}", path.display());
            return 1;
        }
    };
    let hdr = &patch.header;

    if opts.json_output {
        let json = serde_json::json!({
            "command": "inspect",
            "stored_size": stored.len(),
            "patch_size": data.len(),
            "packed": compress::is_packed(&stored),
            "source_len": hdr.source_len,
            "target_len": hdr.target_len,
            "op_count": hdr.op_count,
            "source_checksum": hdr.source_checksum,
            "target_checksum": patch.target_checksum,
            "copied_bytes": patch.copied_bytes(),
            "inserted_bytes": patch.inserted_bytes(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap());
    }
    if opts.quiet {
        return 0;
    }

    println!("bdelta patch file:          {}", path.display());
    println!("Patch format version:       {}", crate::patch::header::VERSION);
    if compress::is_packed(&stored) {
        println!("Compressed envelope:        codec {} ({} bytes stored)", stored[4], stored.len());
    }
    let flags: Vec<&str> = hdr.flags.iter_names().map(|(name, _)| name).collect();
    println!(
        "Flags:                      {}",
        if flags.is_empty() { "none".to_string() } else { flags.join(" | ") }
    );
    println!("Source length:              {}", hdr.source_len);
    println!("Target length:              {}", hdr.target_len);
    println!("Operations:                 {}", hdr.op_count);
    if let Some(cksum) = hdr.source_checksum.filter(|_| hdr.flags.contains(PatchFlags::SOURCE_CHECKSUM)) {
        println!("Source adler32:             {cksum:08X}");
    }
    println!("Target adler32:             {:08X}", patch.target_checksum);
    println!("Copied bytes:               {}", patch.copied_bytes());
    println!("Inserted bytes:             {}", patch.inserted_bytes());

    if !opts.summary {
        println!("  Offset  Op      Source    Length");
        let mut out_pos = 0usize;
        for op in &patch.ops {
            match op {
                Op::Copy { offset, len } => println!("  {out_pos:06}  COPY    {offset:<9} {len}"),
                Op::Insert(bytes) => println!("  {out_pos:06}  INSERT  {:<9} {}", "-", bytes.len()),
            }
            out_pos += op.output_len();
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    let default_filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opts = resolve_options(cli);
    let exit_code = match opts.command {
        Command::Diff => cmd_diff(&opts),
        Command::Apply => cmd_apply(&opts),
        Command::Matches => cmd_matches(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
