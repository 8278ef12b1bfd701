use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use storybible_core::config::StorybibleConfig;
use storybible_core::ManualEdit;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "storybible")]
#[command(version, about = "Co-write a screenplay story bible from streamed assistant turns", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/storybible/config.toml)
    #[arg(long, global = true, env = "STORYBIBLE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one assistant turn read from FILE or stdin
    Turn {
        #[arg(long)]
        session: PathBuf,
        /// Replay the input in chunks of N characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Print the turn report as JSON instead of the text
        #[arg(long)]
        json: bool,
        file: Option<PathBuf>,
    },
    /// Run one turn streamed from a local provider command
    Chat {
        #[arg(long)]
        session: PathBuf,
        /// Provider program (default: [provider].command)
        #[arg(long)]
        provider: Option<String>,
        /// Provider argument; `{prompt}` marks where the prompt goes
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// Provider prints JSON lines with text deltas
        #[arg(long)]
        json_lines: bool,
        message: String,
    },
    /// Print the sidebar, or the full snapshot as JSON
    State {
        #[arg(long)]
        session: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Edit the story bible directly
    Edit {
        #[arg(long)]
        session: PathBuf,
        #[command(subcommand)]
        edit: EditCommand,
    },
    /// Rebuild state from the event log
    Replay {
        #[arg(long)]
        session: PathBuf,
    },
}

#[derive(Subcommand)]
enum EditCommand {
    Title { value: String },
    Logline { value: String },
    RenameCharacter { from: String, to: String },
    CharacterDescription { name: String, description: String },
    SceneTitle { number: i64, title: String },
}

impl From<EditCommand> for ManualEdit {
    fn from(edit: EditCommand) -> Self {
        match edit {
            EditCommand::Title { value } => ManualEdit::SetTitle { value },
            EditCommand::Logline { value } => ManualEdit::SetLogline { value },
            EditCommand::RenameCharacter { from, to } => ManualEdit::RenameCharacter { from, to },
            EditCommand::CharacterDescription { name, description } => {
                ManualEdit::SetCharacterDescription { name, description }
            }
            EditCommand::SceneTitle { number, title } => ManualEdit::SetSceneTitle { number, title },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the sanitized turn text.
    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in ["storybible", "storybible_core", "storybible_stream"] {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Turn {
            session,
            chunk_size,
            json,
            file,
        } => commands::turn(&config, &session, file.as_deref(), chunk_size, json),
        Commands::Chat {
            session,
            provider,
            args,
            json_lines,
            message,
        } => commands::chat(&config, &session, provider, args, json_lines, &message),
        Commands::State { session, json } => commands::state(&config, &session, json),
        Commands::Edit { session, edit } => commands::edit(&config, &session, edit.into()),
        Commands::Replay { session } => commands::replay(&session),
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<StorybibleConfig> {
    if let Some(path) = explicit {
        return StorybibleConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let Some(path) = dirs::config_dir().map(|dir| dir.join("storybible").join("config.toml"))
    else {
        return Ok(StorybibleConfig::default());
    };
    if !path.exists() {
        return Ok(StorybibleConfig::default());
    }
    StorybibleConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
}
