pub mod codec;
pub mod config;
pub mod contract;
pub mod errors;
pub mod event;
pub mod logging;
pub mod memgraph;
pub mod parameter;
pub mod playback;
pub mod recording;
pub mod runtime;
pub mod value;
pub mod wire;

use clap::{error::ErrorKind, Parser, Subcommand, ValueEnum};
use config::{load_config, CliOverrides, TapeConfig};
use errors::TapeError;
use logging::{plain_line, JsonlLogger};
use memgraph::MemGraph;
use playback::{
    ContinueOnException, HaltOnException, LoggingListener, PlaybackDriver, PlaybackListener,
};
use runtime::ProductionRuntime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wire::WireFormat;

#[derive(Debug, Clone, Parser)]
#[command(name = "calltape")]
#[command(about = "Record, convert and replay call event logs")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Wire format for files whose extension does not name one.
    #[arg(long, global = true, value_enum)]
    pub format: Option<CliFormat>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Rewrite an event log in another wire format.
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum)]
        from: Option<CliFormat>,
        #[arg(long, value_enum)]
        to: Option<CliFormat>,
        /// Overwrite an existing output file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print every event of a log in the text format, then a summary.
    Inspect {
        input: PathBuf,
        #[arg(long, value_enum)]
        from: Option<CliFormat>,
    },
    /// Replay a log against a fresh in-memory graph.
    Replay {
        input: PathBuf,
        #[arg(long, value_enum)]
        from: Option<CliFormat>,
        #[arg(long, default_value_t = false)]
        continue_on_exception: bool,
        #[arg(long, default_value_t = false)]
        verify_results: bool,
        #[arg(long)]
        log: Option<PathBuf>,
        #[arg(long)]
        id_base: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFormat {
    Json,
    Text,
}

impl From<CliFormat> for WireFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Json => WireFormat::Json,
            CliFormat::Text => WireFormat::Text,
        }
    }
}

/// Exit code for a replay that completed with failed events.
pub const EXIT_PLAYBACK_FAILURES: i32 = 2;

pub fn run() -> Result<i32, TapeError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| TapeError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, TapeError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(TapeError::Cli(error.to_string())),
        },
    };

    let mut overrides = CliOverrides {
        config_path: cli.config.clone(),
        format: cli.format.map(WireFormat::from),
        ..CliOverrides::default()
    };
    if let Command::Replay {
        continue_on_exception,
        verify_results,
        log,
        id_base,
        ..
    } = &cli.command
    {
        overrides.continue_on_exception = *continue_on_exception;
        overrides.verify_results = *verify_results;
        overrides.log_path = log.clone();
        overrides.id_base = *id_base;
    }
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;

    match &cli.command {
        Command::Convert {
            input,
            output,
            from,
            to,
            force,
        } => {
            let input = cwd.join(input);
            let output = cwd.join(output);
            if !force && runtime.file_system.exists(&output) {
                return Err(TapeError::Io(format!(
                    "{} already exists; pass --force to overwrite",
                    output.display()
                )));
            }
            let from = resolve_format(*from, &input, &cfg);
            let to = resolve_format(*to, &output, &cfg);
            let events = read_events(runtime, &input, from)?;
            if let Some(parent) = output.parent() {
                runtime.file_system.create_dir_all(parent)?;
            }
            runtime
                .file_system
                .write_string(&output, &to.encode_all(&events)?)?;
            runtime.terminal.write_line(&format!(
                "converted {} events from {} to {}",
                events.len(),
                from.as_str(),
                to.as_str()
            ))?;
            Ok(0)
        }
        Command::Inspect { input, from } => {
            let input = cwd.join(input);
            let events = read_events(runtime, &input, resolve_format(*from, &input, &cfg))?;
            let mut methods = BTreeMap::<&str, usize>::new();
            for (index, event) in events.iter().enumerate() {
                *methods.entry(event.method()).or_default() += 1;
                runtime
                    .terminal
                    .write_line(&format!("{index}: {}", wire::text::encode(event)))?;
            }
            let counts = methods
                .iter()
                .map(|(method, count)| format!("{method}={count}"))
                .collect::<Vec<_>>();
            runtime
                .terminal
                .write_line(&format!("events={} {}", events.len(), counts.join(" ")))?;
            Ok(0)
        }
        Command::Replay { input, from, .. } => {
            let input = cwd.join(input);
            replay(runtime, &cfg, &input, resolve_format(*from, &input, &cfg))
        }
    }
}

fn resolve_format(explicit: Option<CliFormat>, path: &Path, cfg: &TapeConfig) -> WireFormat {
    explicit
        .map(WireFormat::from)
        .or_else(|| WireFormat::from_extension(path))
        .unwrap_or(cfg.recording.format)
}

fn read_events(
    runtime: &ProductionRuntime,
    path: &Path,
    format: WireFormat,
) -> Result<Vec<event::Event>, TapeError> {
    let input = runtime.file_system.read_to_string(path)?;
    format.decode_all(&memgraph::registry(), &input)
}

fn replay(
    runtime: &ProductionRuntime,
    cfg: &TapeConfig,
    input: &Path,
    format: WireFormat,
) -> Result<i32, TapeError> {
    let events = read_events(runtime, input, format)?;
    let graph = MemGraph::with_id_base(cfg.backend.id_base);
    let mut driver = PlaybackDriver::new(memgraph::contracts(), graph.service())
        .with_verify_results(cfg.playback.verify_results);

    let mut halt = HaltOnException;
    let mut tolerant = ContinueOnException::default();
    let base: &mut dyn PlaybackListener = if cfg.playback.halt_on_exception {
        &mut halt
    } else {
        &mut tolerant
    };
    let report = match &cfg.playback.log_path {
        Some(path) => {
            let mut listener = LoggingListener::new(JsonlLogger::new(path), base);
            driver.playback(&events, &mut listener)?
        }
        None => driver.playback(&events, base)?,
    };

    for (index, error) in &tolerant.failures {
        runtime
            .terminal
            .write_error_line(&plain_line("playback_exception", *index, &error.to_string()))?;
    }
    let snapshot = graph.snapshot();
    runtime.terminal.write_line(&format!(
        "played={} failed={} nodes={} relationships={}",
        report.played,
        report.failed,
        snapshot.nodes.len(),
        snapshot.relationships.len()
    ))?;
    Ok(if report.failed > 0 {
        EXIT_PLAYBACK_FAILURES
    } else {
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{FakeFileSystem, FakeTerminal, FileSystem};
    use std::ffi::OsString;
    use std::sync::Arc;

    const TEXT_LOG: &str = "GraphDatabaseService() createNode => Node(0)\n\
                            Node(7) delete\n\
                            GraphDatabaseService() createNode => Node(1)\n";

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("calltape")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn runtime_with(fs: &FakeFileSystem, terminal: &FakeTerminal) -> ProductionRuntime {
        ProductionRuntime {
            file_system: Arc::new(fs.clone()),
            terminal: Arc::new(terminal.clone()),
        }
    }

    #[test]
    fn convert_writes_output_and_refuses_to_overwrite() {
        let fs = FakeFileSystem::with_file("/work/in.txt", TEXT_LOG);
        let terminal = FakeTerminal::new();
        let runtime = runtime_with(&fs, &terminal);
        let cwd = Path::new("/work");

        let code = run_with_runtime(&args(&["convert", "in.txt", "out.jsonl"]), cwd, &runtime)
            .expect("convert");
        assert_eq!(code, 0);
        assert!(fs.exists(Path::new("/work/out.jsonl")));
        let json = fs.contents(Path::new("/work/out.jsonl")).expect("output");
        assert_eq!(json.lines().count(), 3);
        assert_eq!(
            terminal.written_lines(),
            vec!["converted 3 events from text to json".to_string()]
        );

        assert!(matches!(
            run_with_runtime(&args(&["convert", "in.txt", "out.jsonl"]), cwd, &runtime),
            Err(TapeError::Io(_))
        ));
        let forced = args(&["convert", "in.txt", "out.jsonl", "--force"]);
        assert_eq!(run_with_runtime(&forced, cwd, &runtime).expect("forced"), 0);
    }

    #[test]
    fn format_flag_applies_to_unrecognised_extensions() {
        let fs = FakeFileSystem::with_file("/work/session.log", TEXT_LOG);
        let terminal = FakeTerminal::new();
        let runtime = runtime_with(&fs, &terminal);
        let cwd = Path::new("/work");

        assert!(run_with_runtime(&args(&["inspect", "session.log"]), cwd, &runtime).is_err());
        let code = run_with_runtime(
            &args(&["inspect", "session.log", "--format", "text"]),
            cwd,
            &runtime,
        )
        .expect("inspect");
        assert_eq!(code, 0);
        let lines = terminal.written_lines();
        assert_eq!(lines[1], "1: Node(7) delete");
        assert_eq!(lines[3], "events=3 createNode=2 delete=1");
    }

    #[test]
    fn tolerant_replay_reports_failures_on_stderr() {
        let fs = FakeFileSystem::with_file("/work/in.txt", TEXT_LOG);
        let terminal = FakeTerminal::new();
        let runtime = runtime_with(&fs, &terminal);

        let code = run_with_runtime(
            &args(&["replay", "in.txt", "--continue-on-exception", "--id-base", "5"]),
            Path::new("/work"),
            &runtime,
        )
        .expect("replay");
        assert_eq!(code, EXIT_PLAYBACK_FAILURES);
        assert_eq!(
            terminal.written_lines(),
            vec!["played=2 failed=1 nodes=2 relationships=0".to_string()]
        );
        let errors = terminal.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("event=playback_exception index=1 "));
    }

    #[test]
    fn replay_rejects_id_base_beyond_the_limit() {
        let fs = FakeFileSystem::with_file("/work/in.txt", TEXT_LOG);
        let terminal = FakeTerminal::new();
        let runtime = runtime_with(&fs, &terminal);
        let huge = i64::MAX.to_string();
        assert!(matches!(
            run_with_runtime(
                &args(&["replay", "in.txt", "--id-base", &huge]),
                Path::new("/work"),
                &runtime
            ),
            Err(TapeError::InvalidConfig(_))
        ));
        assert!(terminal.written_lines().is_empty());
    }
}
