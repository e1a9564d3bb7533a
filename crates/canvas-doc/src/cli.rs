use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::codec::{load_archive, load_from_source, save_archive, save_to_source, SaveOptions};
use crate::error::{CanvasError, ErrorList};
use crate::merge::{merge_with, ConflictPolicy, MergeOptions};
use crate::model::Document;
use crate::verify::{compare_archives, self_merge_stress_test, stress_test, CompareOptions};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "CANVAS_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "canvas-tool",
    about = "Pack, unpack, compare and merge canvas app packages",
    version
)]
pub struct Cli {
    /// Log at debug level unless CANVAS_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract an archive into an editable source directory.
    Unpack(UnpackArgs),

    /// Build an archive from a source directory.
    Pack(PackArgs),

    /// Compare two archives, ignoring entropy unless --strict.
    Compare(CompareArgs),

    /// Three-way merge of archives derived from a common ancestor.
    Merge(MergeArgs),

    /// Round-trip stress test of one archive.
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
pub struct UnpackArgs {
    pub archive: PathBuf,
    pub dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct PackArgs {
    pub dir: PathBuf,
    pub archive: PathBuf,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    pub first: PathBuf,
    pub second: PathBuf,
    /// Also compare entropy entries.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    pub ancestor: PathBuf,
    pub local: PathBuf,
    pub remote: PathBuf,
    pub output: PathBuf,
    /// Resolve conflicts with the remote value.
    #[arg(long)]
    pub prefer_remote: bool,
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    pub archive: PathBuf,
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_from_env() -> Result<bool, CanvasError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

/// Run one command. `Ok(false)` means it completed but found differences,
/// conflicts, or a failed check.
pub fn run(cli: Cli) -> Result<bool, CanvasError> {
    match cli.command {
        Commands::Unpack(args) => unpack(&args),
        Commands::Pack(args) => pack(&args),
        Commands::Compare(args) => compare(&args),
        Commands::Merge(args) => merge(&args),
        Commands::Verify(args) => verify(&args),
    }
}

fn print_diagnostics(errors: &ErrorList) {
    for entry in errors {
        eprintln!("{entry}");
    }
}

/// Print diagnostics, then fail on errors or a missing document.
fn require(doc: Option<Document>, errors: ErrorList) -> Result<Document, CanvasError> {
    print_diagnostics(&errors);
    errors.ensure_ok()?;
    doc.ok_or(CanvasError::Errors(errors))
}

fn load(path: &Path) -> Result<Document, CanvasError> {
    let (doc, errors) = load_archive(path);
    require(doc, errors)
}

fn finish(errors: ErrorList) -> Result<bool, CanvasError> {
    print_diagnostics(&errors);
    errors.ensure_ok()?;
    Ok(true)
}

fn unpack(args: &UnpackArgs) -> Result<bool, CanvasError> {
    let doc = load(&args.archive)?;
    finish(save_to_source(&doc, &args.dir, &SaveOptions::default()))
}

fn pack(args: &PackArgs) -> Result<bool, CanvasError> {
    let (doc, errors) = load_from_source(&args.dir);
    let doc = require(doc, errors)?;
    finish(save_archive(&doc, &args.archive, &SaveOptions::default()))
}

fn compare(args: &CompareArgs) -> Result<bool, CanvasError> {
    let options = CompareOptions { strict: args.strict };
    let mut errors = ErrorList::new();
    let same = compare_archives(&args.first, &args.second, &options, &mut errors);
    print_diagnostics(&errors);
    println!("{}", if same { "equal" } else { "different" });
    Ok(same)
}

fn merge(args: &MergeArgs) -> Result<bool, CanvasError> {
    let ancestor = load(&args.ancestor)?;
    let local = load(&args.local)?;
    let remote = load(&args.remote)?;
    let options = MergeOptions {
        policy: if args.prefer_remote {
            ConflictPolicy::PreferRemote
        } else {
            ConflictPolicy::PreferLocal
        },
    };
    let outcome = merge_with(&ancestor, &local, &remote, &options);
    for conflict in &outcome.conflicts {
        println!("conflict: {conflict}");
    }
    let clean = outcome.is_clean();
    finish(save_archive(&outcome.document, &args.output, &SaveOptions::default()))?;
    Ok(clean)
}

fn verify(args: &VerifyArgs) -> Result<bool, CanvasError> {
    let ok = stress_test(&args.archive)? && self_merge_stress_test(&args.archive)?;
    println!("{}", if ok { "ok" } else { "failed" });
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Control, Screen};
    use canvas_address::Address;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("canvas-tool").chain(args.iter().copied())).unwrap()
    }

    fn write_sample(path: &Path) -> Document {
        let mut doc = Document::new();
        doc.add_screen(Screen::new("Main").with_control(Control::builtin("Title", "Label")))
            .unwrap();
        assert!(save_archive(&doc, path, &SaveOptions::default()).is_empty());
        doc
    }

    #[test]
    fn parses_global_verbose_and_flags() {
        let cli = parse(&["compare", "a.msapp", "b.msapp", "--strict", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Compare(CompareArgs { strict: true, .. })));

        let cli = parse(&["merge", "o", "l", "r", "out", "--prefer-remote"]);
        assert!(matches!(cli.command, Commands::Merge(MergeArgs { prefer_remote: true, .. })));
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(Cli::try_parse_from(["canvas-tool", "merge", "o", "l"]).is_err());
    }

    #[test]
    fn unpack_then_pack_then_compare() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("app.msapp");
        write_sample(&original);
        let src = dir.path().join("src");
        let repacked = dir.path().join("repacked.msapp");
        let path = |p: &Path| p.to_str().unwrap().to_string();

        assert!(run(parse(&["unpack", &path(&original), &path(&src)])).unwrap());
        assert!(run(parse(&["pack", &path(&src), &path(&repacked)])).unwrap());
        assert!(run(parse(&["compare", &path(&original), &path(&repacked)])).unwrap());
        assert!(!run(parse(&["compare", &path(&original), &path(&repacked), "--strict"])).unwrap());
    }

    #[test]
    fn merge_reports_conflicts_through_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_sample(&dir.path().join("base.msapp"));
        let title = Address::from_segments(["Main", "Title"]);
        for (name, text) in [("local.msapp", "\"L\""), ("remote.msapp", "\"R\"")] {
            let mut side = base.clone();
            side.set_property(&title, "Text", text.into()).unwrap();
            assert!(save_archive(&side, dir.path().join(name), &SaveOptions::default()).is_empty());
        }
        let arg = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
        let out = arg("out.msapp");
        let (base, local, remote) = (arg("base.msapp"), arg("local.msapp"), arg("remote.msapp"));
        let cli = parse(&["merge", &base, &local, &remote, &out]);
        assert!(!run(cli).unwrap());

        let (merged, _) = load_archive(&out);
        let merged = merged.unwrap();
        let node = merged.resolve(&title).unwrap();
        assert_eq!(node.properties()["Text"].text(), "\"L\"");
    }

    #[test]
    fn unpack_of_missing_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.msapp");
        let out = dir.path().join("out");
        let cli = parse(&["unpack", missing.to_str().unwrap(), out.to_str().unwrap()]);
        assert!(matches!(run(cli), Err(CanvasError::Errors(_))));
    }
}
