//! Purpose: `pdfapp` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, delegates to `command_dispatch`.
//! Invariants: Command results go to stdout (JSON or plain text); diagnostics go to stderr.
//! Invariants: Errors are emitted as JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod serve;
mod store_paths;

use pdfapp::api::{Error, ErrorKind, to_exit_code};
use store_paths::default_store_dir;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `pdfapp --help`."));
            }
        },
    };

    let default_level = if matches!(cli.command, Command::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_level);

    let store_dir = cli.store_dir.unwrap_or_else(default_store_dir);
    command_dispatch::dispatch_command(cli.command, store_dir)
}

#[derive(Parser)]
#[command(
    name = "pdfapp",
    version,
    about = "Typeset plain-text documents to PDF with cairo and pango",
    long_about = None,
    after_help = r#"EXAMPLES
  $ pdfapp fonts
  $ pdfapp default-document > doc.json
  $ pdfapp render doc.json -o doc.pdf
  $ pdfapp serve --bind 127.0.0.1:8080

NATIVE LIBRARIES
  cairo and pango are loaded at runtime. `fonts`, `render` and the /pdf/ and
  /fonts/ routes fail with kind Unavailable when they are not installed."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Document store directory (default: ~/.pdfapp/documents)",
        value_hint = ValueHint::DirPath
    )]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List the font families pango can use")]
    Fonts {
        #[arg(long, help = "Emit JSON with a monospace flag per family")]
        json: bool,
        #[arg(long, help = "Only list monospace families")]
        monospace: bool,
    },
    #[command(about = "Print the default document as JSON")]
    DefaultDocument,
    #[command(
        about = "Render a document to PDF",
        group(ArgGroup::new("source").required(true).args(["doc", "default", "id"]))
    )]
    Render {
        #[arg(help = "Document JSON file, or - for stdin", value_hint = ValueHint::FilePath)]
        doc: Option<PathBuf>,
        #[arg(long, help = "Render the default document")]
        default: bool,
        #[arg(long, help = "Render a stored document by id")]
        id: Option<u64>,
        #[arg(short, long, help = "Output file (default: stdout)", value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    #[command(about = "Run the HTTP document service")]
    Serve(ServeArgs),
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080", help = "Address to listen on")]
    bind: String,
    #[arg(long, help = "Permit binding to a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(long, help = "Serve files from this directory under /static/", value_hint = ValueHint::DirPath)]
    static_dir: Option<PathBuf>,
    #[arg(long, help = "Keep documents in memory instead of the store directory")]
    memory: bool,
    #[arg(long, default_value_t = 1024 * 1024, help = "Maximum request body size")]
    max_body_bytes: u64,
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    println!("{text}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Unavailable => "native libraries unavailable".to_string(),
        ErrorKind::Native => "native library error".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, error_json};
    use clap::{CommandFactory, Parser};
    use pdfapp::api::{Error, ErrorKind};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn render_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["pdfapp", "render"]).is_err());
        assert!(Cli::try_parse_from(["pdfapp", "render", "doc.json", "--default"]).is_err());
        let cli = Cli::try_parse_from(["pdfapp", "render", "--id", "4", "-o", "out.pdf"])
            .expect("parse");
        match cli.command {
            Command::Render { id, out, .. } => {
                assert_eq!(id, Some(4));
                assert_eq!(out.as_deref(), Some(std::path::Path::new("out.pdf")));
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn serve_defaults_to_loopback() {
        let cli = Cli::try_parse_from(["pdfapp", "serve"]).expect("parse");
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.bind, "127.0.0.1:8080");
                assert_eq!(args.max_body_bytes, 1024 * 1024);
                assert!(!args.memory);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn error_json_carries_hint_index_and_causes() {
        let err = Error::new(ErrorKind::Usage)
            .with_message("family index out of range")
            .with_hint("Use an index below the family count.")
            .with_index(9)
            .with_source(std::io::Error::other("inner"));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Usage");
        assert_eq!(value["error"]["index"], 9);
        assert_eq!(value["error"]["hint"], "Use an index below the family count.");
        assert_eq!(value["error"]["causes"][0], "inner");
    }
}
