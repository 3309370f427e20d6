//! Purpose: Hold top-level CLI command dispatch for `pdfapp`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `render` never leaves a partial output file behind on failure.
//! Invariants: `serve` owns its tokio runtime; other commands stay synchronous.

use std::fs::{self, File};
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use serde_json::json;

use super::{Cli, Command, RunOutcome, ServeArgs, emit_json};
use crate::serve::{self, ServeConfig, StoreConfig};
use crate::store_paths::{DocumentRef, resolve_document_ref};
use pdfapp::api::{Document, DocumentStore, Error, ErrorKind, FileStore, FontFamilies};

pub(super) fn dispatch_command(command: Command, store_dir: PathBuf) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "pdfapp", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Fonts { json, monospace } => {
            let families = FontFamilies::enumerate()?;
            let mut rows = Vec::with_capacity(families.len());
            for index in 0..families.len() {
                let index = i32::try_from(index).map_err(|_| {
                    Error::new(ErrorKind::Internal).with_message("font family count overflows i32")
                })?;
                let family = families.family_at(index)?;
                if monospace && !family.is_monospace() {
                    continue;
                }
                rows.push((family.name(), family.is_monospace()));
            }
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            rows.dedup_by(|a, b| a.0 == b.0);

            if json {
                let values = rows
                    .iter()
                    .map(|(name, mono)| json!({ "name": name, "monospace": mono }))
                    .collect::<Vec<_>>();
                emit_json(json!({ "families": values }));
            } else {
                for (name, _) in &rows {
                    println!("{name}");
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::DefaultDocument => {
            let value = serde_json::to_value(Document::default()).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode default document")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Render {
            doc,
            default,
            id,
            out,
        } => {
            let document = if default {
                Document::default()
            } else if let Some(id) = id {
                FileStore::open(&store_dir)?.fetch(id)?
            } else if let Some(path) = doc {
                read_document(&path)?
            } else {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("render requires a document source")
                    .with_hint("Pass a JSON file, `-`, --default, or --id <ID>."));
            };
            match out {
                Some(path) => render_to_file(&document, &path),
                None => render_to_stdout(&document),
            }
        }
        Command::Serve(args) => {
            let config = serve_config(args, store_dir)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn serve_config(args: ServeArgs, store_dir: PathBuf) -> Result<ServeConfig, Error> {
    let bind: SocketAddr = args.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:8080.")
    })?;
    let store = if args.memory {
        StoreConfig::Memory
    } else {
        StoreConfig::Dir(store_dir)
    };
    Ok(ServeConfig {
        bind,
        store,
        static_dir: args.static_dir,
        allow_non_loopback: args.allow_non_loopback,
        max_body_bytes: args.max_body_bytes,
    })
}

fn read_document(path: &Path) -> Result<Document, Error> {
    let (bytes, origin) = match resolve_document_ref(path) {
        DocumentRef::Stdin => {
            let mut bytes = Vec::new();
            io::stdin().read_to_end(&mut bytes).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read document from stdin")
                    .with_source(err)
            })?;
            (bytes, None)
        }
        DocumentRef::File(path) => {
            let bytes = fs::read(path).map_err(|err| {
                let kind = if err.kind() == io::ErrorKind::NotFound {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::Io
                };
                Error::new(kind)
                    .with_message("failed to read document")
                    .with_path(path)
                    .with_source(err)
            })?;
            (bytes, Some(path))
        }
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        let err = Error::new(ErrorKind::Usage)
            .with_message("document is not valid json")
            .with_hint("Start from `pdfapp default-document` and edit the fields you need.")
            .with_source(err);
        match origin {
            Some(path) => err.with_path(path),
            None => err,
        }
    })
}

fn render_to_stdout(document: &Document) -> Result<RunOutcome, Error> {
    let stdout = io::stdout();
    if stdout.is_terminal() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("refusing to write PDF bytes to a terminal")
            .with_hint("Redirect stdout or pass -o <FILE>."));
    }
    let mut writer = document.render_pdf(BufWriter::new(stdout.lock()))?;
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write PDF to stdout")
            .with_source(err)
    })?;
    Ok(RunOutcome::ok())
}

fn render_to_file(document: &Document, path: &Path) -> Result<RunOutcome, Error> {
    let file = File::create(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to create output file")
            .with_path(path)
            .with_source(err)
    })?;
    let written = document
        .render_pdf(BufWriter::new(file))
        .and_then(|writer| {
            writer.into_inner().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to flush output file")
                    .with_path(path)
                    .with_source(err.into_error())
            })
        })
        .and_then(|file| {
            let bytes = file.metadata().map(|meta| meta.len()).unwrap_or(0);
            file.sync_all().map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to sync output file")
                    .with_path(path)
                    .with_source(err)
            })?;
            Ok(bytes)
        });
    match written {
        Ok(bytes) => {
            emit_json(json!({
                "rendered": {
                    "path": path.display().to_string(),
                    "bytes": bytes,
                    "id": document.id,
                }
            }));
            Ok(RunOutcome::ok())
        }
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %remove_err, "failed to remove partial output");
            }
            Err(err)
        }
    }
}
