//! Command-line surface: `metasift query` and `metasift debug`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use metasift::query::{expand_env, parse_command_line};
use metasift::{
    assemble, search, AndSelector, Config, FfProber, ListingSource, RunContext, Selector, Source,
    Summary, TreeSource,
};

/// Root that means "read the listing (or index) from stdin".
const STDIN_MARK: &str = "-";

const QUERY_HELP: &str = "\
Each QUERY is a 'key=value' condition. 'key' names a metadata field and
'value' is a regular expression matched anywhere in that field's value.
Conditions are combined with AND. A literal 'or' or 'OR' argument splits them
into groups that are combined with OR, so

    name=NAME1 OR name=NAME2 artist=ARTIST

selects files matching name=NAME1, or both name=NAME2 and artist=ARTIST.

Fields always available: path, dir, name, ext, basename, basepath, size,
mode (octal), mod_time. The prober adds more (album, artist, genre, ...);
use 'metasift debug' or --verbose to see them. All values are strings.

The 'sh' key runs its value as a shell script with the record as one JSON
line on stdin; the file is selected when the script exits with 0:

    'sh=jq -e \"(.size|tonumber) > 8000000\" > /dev/null'

Environment variables ($VAR, ${VAR}) are expanded in queries, roots and
config files.

EXAMPLES:
    metasift query -r ~/Music 'artist=ARTIST' 'genre=GENRE'
    metasift query -r - name=NAME < paths.txt
    metasift query -r ~/Music --create-index > index
    metasift query -r index --read-index 'name=NAME'";

#[derive(Parser, Debug)]
#[command(
    name = "metasift",
    version,
    about = "Select files by the metadata ffprobe reports",
    long_about = "Select files by the metadata ffprobe reports.\n\n\
                  Requires ffprobe (https://ffmpeg.org/ffprobe.html) or a compatible prober."
)]
pub struct Cli {
    /// Enable debug logs
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Metadata prober command
    #[arg(short, long, global = true, default_value = "ffprobe", value_name = "CMD")]
    pub probe: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search for files and print the paths of the ones that match
    #[command(after_long_help = QUERY_HELP)]
    Query(QueryArgs),

    /// Walk directories and print every record as JSON
    Debug(DebugArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Conditions, 'key=value', optionally split into groups by 'or'/'OR'
    #[arg(value_name = "QUERY")]
    pub query: Vec<String>,

    /// Root directories; '-' reads a path listing from stdin
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = ".",
        allow_hyphen_values = true,
        value_name = "DIR"
    )]
    pub root: Vec<String>,

    /// Print whole records as JSON lines, and a summary on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Number of probe workers
    #[arg(short, long, default_value_t = 8, value_name = "NUM")]
    pub worker: usize,

    /// Read roots and query from a JSON or YAML file (overrides --root and QUERY)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dump every record as an index (implies --verbose, ignores QUERY)
    #[arg(long, conflicts_with = "read_index")]
    pub create_index: bool,

    /// Treat roots as index files and select from them without probing
    #[arg(long)]
    pub read_index: bool,
}

#[derive(Args, Debug)]
pub struct DebugArgs {
    /// Directories to walk
    #[arg(value_name = "DIR", default_value = ".")]
    pub dirs: Vec<PathBuf>,
}

pub fn run(cli: Cli, ctx: RunContext) -> Result<()> {
    match cli.command {
        Command::Query(args) => query(args, &cli.probe, ctx),
        Command::Debug(args) => debug(args, &cli.probe, ctx),
    }
}

fn query(args: QueryArgs, probe: &str, ctx: RunContext) -> Result<()> {
    let (selector, roots): (Box<dyn Selector>, Vec<PathBuf>) = match &args.config {
        Some(path) => {
            let config = Config::from_path(path)?;
            (Box::new(config.selector()?), config.roots())
        }
        None => {
            let roots = args.root.iter().map(|r| PathBuf::from(expand_env(r))).collect();
            (Box::new(parse_command_line(&args.query[..])?), roots)
        }
    };

    let from_stdin = roots.iter().any(|r| r.as_os_str() == STDIN_MARK);
    if from_stdin && roots.len() != 1 {
        bail!("no other roots can be specified when using - (stdin)");
    }

    if args.read_index {
        let input = index_reader(&roots, from_stdin)?;
        let summary = search()
            .selector(selector)
            .verbose(args.verbose)
            .context(ctx)
            .replay(input)?;
        return report(summary, args.verbose);
    }

    let (selector, verbose): (Box<dyn Selector>, bool) = if args.create_index {
        (Box::new(AndSelector::default()), true)
    } else {
        (selector, args.verbose)
    };

    let mut builder = search()
        .roots(roots)
        .prober(FfProber::new(probe))
        .selector(selector)
        .workers(args.worker)
        .verbose(verbose)
        .context(ctx);
    if from_stdin {
        builder = builder.source(ListingSource::new(BufReader::new(io::stdin())));
    }

    let summary = builder.run()?;
    report(summary, verbose)
}

/// Open every index file up front and read them back to back. Each file is
/// followed by a newline so a missing final newline cannot join two records.
fn index_reader(roots: &[PathBuf], from_stdin: bool) -> Result<Box<dyn BufRead>> {
    if from_stdin {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let mut input: Box<dyn Read> = Box::new(io::empty());
    for root in roots {
        let file = File::open(root)
            .with_context(|| format!("failed to open index {}", root.display()))?;
        input = Box::new(input.chain(file).chain(&b"\n"[..]));
    }
    Ok(Box::new(BufReader::new(input)))
}

fn report(summary: Summary, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("{}", summary.to_json());
    }
    match summary.errors.into_iter().next() {
        Some(e) => Err(e).context("walk did not complete"),
        None => Ok(()),
    }
}

fn debug(args: DebugArgs, probe: &str, ctx: RunContext) -> Result<()> {
    let prober = FfProber::new(probe);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for root in &args.dirs {
        let mut walk = TreeSource.walk(root, &ctx);
        for entry in walk.by_ref() {
            let record = assemble(&ctx, &prober, &entry);
            writeln!(out, "{}", record.to_json()?)?;
        }
        if let Err(e) = walk.finish() {
            eprintln!("{}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_flags() {
        let cli = Cli::try_parse_from([
            "metasift", "query", "-r", "a,b", "-r", "c", "-w", "2", "-v", "name=x", "OR", "name=y",
        ])
        .unwrap();

        let Command::Query(args) = cli.command else {
            panic!("expected query subcommand");
        };
        assert_eq!(args.root, vec!["a", "b", "c"]);
        assert_eq!(args.worker, 2);
        assert!(args.verbose);
        assert_eq!(args.query, vec!["name=x", "OR", "name=y"]);
        assert_eq!(cli.probe, "ffprobe");
    }

    #[test]
    fn root_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["metasift", "query", "name=x"]).unwrap();
        let Command::Query(args) = cli.command else {
            panic!("expected query subcommand");
        };
        assert_eq!(args.root, vec!["."]);
        assert_eq!(args.worker, 8);
    }

    #[test]
    fn index_flags_conflict() {
        assert!(Cli::try_parse_from(["metasift", "query", "--create-index", "--read-index"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["metasift", "debug", "--debug", "-p", "myprobe", "dir"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.probe, "myprobe");
        let Command::Debug(args) = cli.command else {
            panic!("expected debug subcommand");
        };
        assert_eq!(args.dirs, vec![PathBuf::from("dir")]);
    }

    #[test]
    fn index_files_without_final_newline_stay_separate() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::write(&first, "{\"path\":\"a.mp3\"}").unwrap();
        std::fs::write(&second, "{\"path\":\"b.mp3\"}\n").unwrap();

        let input = index_reader(&[first, second], false).unwrap();
        let summary = search()
            .collect_paths(true)
            .output(io::sink())
            .replay(input)
            .unwrap();

        assert_eq!(summary.paths, vec!["a.mp3", "b.mp3"]);
    }

    #[test]
    fn stdin_root_must_be_alone() {
        let cli = Cli::try_parse_from(["metasift", "query", "-r", "-,other", "name=x"]).unwrap();
        let Command::Query(args) = cli.command else {
            panic!("expected query subcommand");
        };
        let err = query(args, "ffprobe", RunContext::new()).unwrap_err();
        assert!(err.to_string().contains("stdin"));
    }
}
