/*
 * Copyright (c) 2024 Jonathan Perkin <jonathan@perkin.org.uk>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

//! The `digup` command line tool: reconciles a directory tree against a
//! sidecar digest file and either reports the result non-interactively
//! (`--batch`) or drops into a read-only review prompt.

use std::io::{IsTerminal, Write as _};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use digup::digest::Digest;
use digup::error::{DigupError, DigupResult};
use digup::record::RecordTable;
use digup::{config::Config, digestfile, reconcile::Reconciler, review, walker::Walker};

/// Incremental directory-integrity maintenance tool.
#[derive(Parser, Debug)]
#[command(
    name = "digup",
    version,
    about = "Incremental directory-integrity maintenance tool",
    disable_version_flag = true
)]
struct Cli {
    /// Print version and exit.
    #[arg(short = 'V', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Run non-interactively; exit code signals clean (0) or dirty (1).
    #[arg(short = 'b', long = "batch")]
    batch: bool,

    /// Recompute every digest regardless of mtime/size agreement.
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// Change to this directory before any operation.
    #[arg(short = 'd', long = "directory", value_name = "PATH")]
    directory: Option<PathBuf>,

    /// Explicit digest-file path, overriding default-name probing.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Follow symlinks instead of recording their target.
    #[arg(short = 'l', long = "links")]
    links: bool,

    /// Suppress unchanged entries in verbose output.
    #[arg(short = 'm', long = "modified")]
    modified: bool,

    /// mtime slack in seconds for the unchanged comparison.
    #[arg(long = "modify-window", value_name = "N")]
    modify_window: Option<u32>,

    /// Decrease verbosity to errors and diagnostics only.
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    quiet: bool,

    /// Increase verbosity; may be repeated up to twice.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only consider paths containing this substring.
    #[arg(short = 'r', long = "restrict", value_name = "PAT")]
    restrict: Option<String>,

    /// Digest algorithm for newly discovered files: md5, sha1, sha256 or sha512.
    #[arg(short = 't', long = "type", value_name = "ALGO")]
    digest_type: Option<String>,

    /// Auto-write the digest file before exiting in batch mode.
    #[arg(short = 'u', long = "update")]
    update: bool,

    /// Skip any directory containing an entry with this name.
    #[arg(long = "exclude-marker", value_name = "NAME")]
    exclude_marker: Option<String>,

    /// Equivalent to `--modify-window=1`, for FAT-filesystem clients.
    #[arg(short = 'w', long = "windows")]
    windows: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("digup: {err}");
            255
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> DigupResult<i32> {
    if cli.update && !cli.batch {
        return Err(DigupError::UpdateWithoutBatch);
    }

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)?;
    }

    let digest_type = cli
        .digest_type
        .as_deref()
        .map(parse_cli_digest_type)
        .transpose()?;

    let (digest_file, probed_algorithm) = resolve_digest_file(cli.file.clone(), digest_type)?;

    let verbose = if cli.quiet { -1 } else { cli.verbose.min(2) as i32 };
    init_tracing(verbose);

    let mut config = Config::new(digest_file.clone(), digest_type.or(probed_algorithm));
    config.batch = cli.batch;
    config.full_check = cli.check;
    config.follow_symlinks = cli.links;
    config.only_modified = cli.modified;
    config.update = cli.update;
    config.modify_window = if cli.windows { 1 } else { cli.modify_window.unwrap_or(0) };
    config.verbose = verbose;
    config.restrict = cli.restrict.clone();
    config.root = PathBuf::from(".");

    let data = if digest_file.is_file() {
        std::fs::read(&digest_file)?
    } else {
        Vec::new()
    };

    let mut confirm_crc_mismatch = crc_mismatch_prompt(cli.batch);
    let parsed = digestfile::parse(
        &digest_file,
        &data,
        config.restrict.as_deref(),
        &mut *confirm_crc_mismatch,
    )?;

    config.exclude_marker = cli.exclude_marker.or(parsed.exclude_marker);
    if config.digest_type.is_none() {
        config.digest_type = parsed.algorithm;
    }

    let mut records = parsed.records;
    let digest_index = digup::record::DigestIndex::from_table(&records);
    let reconciler = Reconciler::new(&config, digest_index);
    let mut walker = Walker::new(&config);
    walker.run(Path::new("."), &mut records, &reconciler)?;

    log_scan_results(&records, config.verbose);

    if config.batch {
        run_batch(&config, &records)
    } else {
        run_interactive(&config, &records)
    }
}

fn parse_cli_digest_type(s: &str) -> DigupResult<Digest> {
    let d = Digest::from_str(s).map_err(|_| DigupError::Argument(format!("unknown digest type: {s}")))?;
    if d == Digest::Crc32 {
        return Err(DigupError::Argument("crc32 is not a selectable file digest type".to_string()));
    }
    Ok(d)
}

fn default_name_for(d: Digest) -> &'static str {
    match d {
        Digest::Md5 => "md5sum.txt",
        Digest::Sha1 => "sha1sum.txt",
        Digest::Sha256 => "sha256sum.txt",
        Digest::Sha512 => "sha512sum.txt",
        Digest::Crc32 => unreachable!("crc32 is never used as a digest-file algorithm"),
    }
}

/// Resolve the digest-file path and, where known in advance, its algorithm.
/// An explicit `--file` wins outright. Otherwise probe the current directory
/// for one of the default names (spec.md §6); finding none falls back to
/// `--type` to name a brand new file, and finding none of either is fatal.
fn resolve_digest_file(explicit: Option<PathBuf>, digest_type: Option<Digest>) -> DigupResult<(PathBuf, Option<Digest>)> {
    if let Some(path) = explicit {
        return Ok((path, None));
    }
    if let Some((path, algo)) = digestfile::probe_default_digest_file(Path::new("."))? {
        return Ok((path, Some(algo)));
    }
    match digest_type {
        Some(d) => Ok((PathBuf::from(default_name_for(d)), Some(d))),
        None => Err(DigupError::NoDigestFileType),
    }
}

fn init_tracing(verbose: i32) {
    use tracing_subscriber::filter::LevelFilter;
    let level = match verbose {
        i32::MIN..=-1 => LevelFilter::ERROR,
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .try_init();
}

/// Emit one tracing event per record touched this run, following the
/// settled verbosity levels (spec.md §9 Open Question (b)): level 1 = one
/// line per modified file, level 2 = one line per scanned file (adding
/// untouched/skipped entries to the level-1 set).
fn log_scan_results(records: &RecordTable, verbose: i32) {
    use digup::record::Status;
    for (path, info) in records.iter() {
        match info.status {
            Status::Seen => {
                if verbose >= 2 {
                    tracing::debug!(path = %path.display(), "untouched");
                }
            }
            Status::Skipped => {
                if verbose >= 2 {
                    tracing::debug!(path = %path.display(), "skipped");
                }
            }
            Status::Unseen => {
                if verbose >= 1 {
                    tracing::info!(path = %path.display(), "deleted");
                }
            }
            other => {
                if verbose >= 1 {
                    tracing::info!(path = %path.display(), status = ?other, "modified");
                }
            }
        }
    }
}

fn crc_mismatch_prompt(batch: bool) -> Box<dyn FnMut() -> bool> {
    if batch {
        Box::new(|| false)
    } else {
        Box::new(|| {
            eprint!("crc32 value saved in file does not match, continue despite change (y/n)? ");
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
        })
    }
}

fn run_batch(config: &Config, records: &RecordTable) -> DigupResult<i32> {
    print_summary(&review::summarize(records));

    if config.update {
        write_digest_file(config, records)?;
    }

    Ok(if review::is_clean(records) { 0 } else { 1 })
}

fn run_interactive(config: &Config, records: &RecordTable) -> DigupResult<i32> {
    print_summary(&review::summarize(records));
    println!("Type 'help' for a list of commands.");

    loop {
        print!("digup> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return Ok(0);
        }
        match line.trim() {
            "" => continue,
            "new" => print_review(&review::new_files(records)),
            "untouched" => print_review(&review::untouched(records)),
            "touched" => print_review(&review::touched(records)),
            "changed" => print_review(&review::changed(records)),
            "deleted" => print_review(&review::deleted(records)),
            "error" => print_review(&review::errors(records)),
            "copied" => print_review(&review::copied(records)),
            "renamed" => print_review(&review::renamed(records)),
            "skipped" => print_review(&review::skipped(records)),
            "summary" => print_summary(&review::summarize(records)),
            "write" => {
                write_digest_file(config, records)?;
                return Ok(0);
            }
            "quit" | "exit" => return Ok(0),
            "help" => print_help(),
            other => println!("unknown command: {other} (try 'help')"),
        }
    }
}

fn print_review(lines: &[review::ReviewLine]) {
    for line in lines {
        println!("{}", line.line);
        if let Some(old) = &line.oldpath_line {
            println!("{old}");
        }
    }
}

fn print_summary(summary: &review::Summary) {
    for (label, count) in &summary.counters {
        println!("{label}: {count}");
    }
    println!("Total: {}", summary.total);
}

fn print_help() {
    println!(
        "commands: new untouched touched changed deleted error copied renamed skipped summary write quit"
    );
}

fn write_digest_file(config: &Config, records: &RecordTable) -> DigupResult<()> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string();
    let bytes = digestfile::serialize("digup", &timestamp, config.exclude_marker.as_deref(), records);
    std::fs::write(&config.digest_file, bytes)?;
    Ok(())
}
