//! CLI for working with nuclei templates outside the browser editor.
//!
//! Usage:
//!   nuclei-forge fmt template.yaml [--write]
//!   nuclei-forge --store templates.json new "Admin Panel" --protocol HTTP
//!   nuclei-forge --store templates.json import *.yaml [--on-conflict rename]
//!   nuclei-forge --store templates.json export --all --out-dir out/
//!   nuclei-forge --store templates.json list [--query sql]

mod store;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use nuclei_forge::collection::Always;
use nuclei_forge::format;
use nuclei_forge::{Decision, ImportFile, Preset, TemplateManager};
use store::FileStore;

#[derive(Parser, Debug)]
#[command(
    name = "nuclei-forge",
    about = "Format, import and export nuclei templates",
    version
)]
struct Args {
    /// Template store file (a JSON object of storage keys)
    #[arg(short, long, env = "NUCLEI_FORGE_STORE", default_value = "nuclei-templates.json")]
    store: PathBuf,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print templates in canonical form
    Fmt {
        files: Vec<PathBuf>,

        /// Rewrite files in place instead of printing
        #[arg(short, long)]
        write: bool,
    },

    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that work on the template store.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Create a template from a protocol preset
    New {
        name: String,

        /// Preset label (HTTP, Headless, Network, DNS, File, JavaScript, Code, Flow, Multi-protocol)
        #[arg(short, long, default_value = "HTTP")]
        protocol: String,
    },

    /// Import template files into the store
    Import {
        files: Vec<PathBuf>,

        /// What to do when a template clashes with a stored one
        #[arg(long, value_enum, default_value_t = OnConflict::Rename)]
        on_conflict: OnConflict,
    },

    /// Export templates as YAML files
    Export {
        /// Internal ids to export
        ids: Vec<u64>,

        /// Export every stored template
        #[arg(long)]
        all: bool,

        /// Write a JSON backup of the whole store to this file instead
        #[arg(long)]
        backup: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// List stored templates
    List {
        /// Case-insensitive filter over name, id and author
        #[arg(short, long, default_value = "")]
        query: String,
    },

    /// Delete stored templates
    Delete { ids: Vec<u64> },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnConflict {
    Override,
    Rename,
    Skip,
}

impl From<OnConflict> for Decision {
    fn from(choice: OnConflict) -> Self {
        match choice {
            OnConflict::Override => Decision::Override,
            OnConflict::Rename => Decision::Rename,
            OnConflict::Skip => Decision::Skip,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Fmt { files, write } => format_files(&files, write),
        Command::Store(command) => {
            let store = FileStore::open(&args.store)?;
            let mut manager = TemplateManager::new(store);
            run(&mut manager, command)
        }
    }
}

fn format_files(files: &[PathBuf], write: bool) -> Result<()> {
    if files.is_empty() {
        bail!("No files given");
    }

    for path in files {
        // 1. Read and parse
        let text = read(path)?;
        let document = format::parse_document(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        // 2. Render canonical YAML
        let yaml = document.canonical_yaml()?;

        // 3. Write back or print
        if write {
            if yaml != text {
                fs::write(path, &yaml).with_context(|| format!("Failed to write {}", path.display()))?;
                println!("formatted {}", path.display());
            }
        } else {
            print!("{}", yaml);
        }
    }
    Ok(())
}

fn run(manager: &mut TemplateManager<FileStore>, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::New { name, protocol } => {
            let Some(preset) = Preset::from_label(&protocol) else {
                let known: Vec<_> = Preset::ALL.iter().map(|p| p.label()).collect();
                bail!("Unknown protocol '{}', expected one of: {}", protocol, known.join(", "));
            };
            let template = manager.create(&name, preset);
            println!("{}\t{}\t{}", template.internal_id, template.content.id, template.name);
        }

        StoreCommand::Import { files, on_conflict } => {
            let mut batch = Vec::with_capacity(files.len());
            for path in &files {
                batch.push(ImportFile::new(path.display().to_string(), read(path)?));
            }

            let mut resolver = Always(on_conflict.into());
            let report = manager.import(&batch, Some(&mut resolver));

            println!(
                "imported {} template(s), {} conflict(s), {} failure(s)",
                report.imported.len(),
                report.conflicts,
                report.failures.len()
            );
            for failure in &report.failures {
                eprintln!("  {}: {}", failure.filename, failure.error);
            }
        }

        StoreCommand::Export {
            ids,
            all,
            backup,
            out_dir,
        } => {
            if let Some(path) = backup {
                fs::write(&path, manager.export_backup()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("wrote {}", path.display());
                return Ok(());
            }

            let files = if all {
                manager.export_all()?
            } else if ids.is_empty() {
                bail!("Give template ids or --all");
            } else {
                ids.iter()
                    .map(|id| manager.export_template(*id))
                    .collect::<Result<Vec<_>, _>>()?
            };

            fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            for (filename, yaml) in files {
                let path = out_dir.join(filename);
                fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
                println!("wrote {}", path.display());
            }
        }

        StoreCommand::List { query } => {
            for template in manager.search(&query) {
                println!(
                    "{}\t{}\t{}\t{}",
                    template.internal_id,
                    template.protocol_label(),
                    template.content.id,
                    template.name
                );
            }
            let stats = manager.stats();
            eprintln!(
                "{} template(s), {} high or critical, {} modified recently",
                stats.total, stats.high, stats.recent
            );
        }

        StoreCommand::Delete { ids } => {
            for id in ids {
                if !manager.delete(id) {
                    bail!("No template with id {}", id);
                }
                println!("deleted {}", id);
            }
        }
    }

    tracing::debug!(store = %manager.store().path().display(), "done");
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
