mod backend;
mod commands;
mod input;

use clap::{Parser, Subcommand};
use colored::Colorize;
use infragate_core::{CancellationToken, RequestContext};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "infragate")]
#[command(about = "One infrastructure model over OpenNebula, EC2 and a test double", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (skips discovery)
    #[arg(short, long, global = true, env = "INFRAGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend to serve (dummy, nebula, ec2); overrides the configuration
    #[arg(short, long, global = true, env = "INFRAGATE_BACKEND")]
    backend: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the kinds served by the backend
    Kinds,
    /// List catalog mixins
    Mixins {
        /// Only mixins related to this type identifier or term
        #[arg(short, long)]
        related_to: Option<String>,
    },
    /// List identifiers of a kind
    Ids {
        /// Kind term or type identifier
        kind: String,
        /// Only entities carrying this mixin (repeatable)
        #[arg(short, long = "mixin")]
        mixins: Vec<String>,
    },
    /// List entities of a kind
    List {
        kind: String,
        #[arg(short, long = "mixin")]
        mixins: Vec<String>,
    },
    /// Show one entity
    Show { kind: String, id: String },
    /// Create an entity from JSON and print its identifier
    Create {
        kind: String,
        /// File holding the entity JSON
        #[arg(short, long, conflicts_with = "json")]
        file: Option<PathBuf>,
        /// Entity JSON given inline
        #[arg(short, long)]
        json: Option<String>,
    },
    /// Delete one entity, or every entity of a kind with --all
    Delete {
        kind: String,
        #[arg(required_unless_present = "all")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
        #[arg(short, long = "mixin", requires = "all")]
        mixins: Vec<String>,
    },
    /// Replace an entity, or attach mixins to it
    Update {
        kind: String,
        id: String,
        /// Mixins to attach (partial update)
        #[arg(short, long = "mixin", conflicts_with_all = ["file", "json"])]
        mixins: Vec<String>,
        #[arg(short, long, conflicts_with = "json")]
        file: Option<PathBuf>,
        #[arg(short, long)]
        json: Option<String>,
    },
    /// Trigger an action on one entity, or on every entity with --all
    Trigger {
        kind: String,
        /// Action term (start, stop, ...) or type identifier
        action: String,
        #[arg(required_unless_present = "all")]
        id: Option<String>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
        #[arg(short, long = "mixin", requires = "all")]
        mixins: Vec<String>,
        /// Action parameter as key=value (repeatable)
        #[arg(short = 'a', long = "attr")]
        attributes: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancels `token` on Ctrl-C so that in-flight waits stop polling
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (mut config, path) = infragate_config::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &path {
        tracing::debug!("Using configuration {}", path.display());
    }
    if let Some(name) = &cli.backend {
        config.backend = name.parse()?;
    }

    let proxy = backend::build_proxy(&config).await?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let cx = RequestContext::new(command_label(&cli.command)).with_cancel(cancel);

    match cli.command {
        Commands::Kinds => commands::catalog::kinds(&proxy),
        Commands::Mixins { related_to } => commands::catalog::mixins(&proxy, related_to.as_deref()),
        Commands::Ids { kind, mixins } => commands::query::ids(&proxy, &kind, &mixins, &cx).await,
        Commands::List { kind, mixins } => commands::query::list(&proxy, &kind, &mixins, &cx).await,
        Commands::Show { kind, id } => commands::query::show(&proxy, &kind, &id, &cx).await,
        Commands::Create { kind, file, json } => {
            let entity = input::read_entity(file.as_deref(), json.as_deref())?;
            commands::mutate::create(&proxy, &kind, entity, &cx).await
        }
        Commands::Delete {
            kind, id, mixins, ..
        } => commands::mutate::delete(&proxy, &kind, id.as_deref(), &mixins, &cx).await,
        Commands::Update {
            kind,
            id,
            mixins,
            file,
            json,
        } => {
            if mixins.is_empty() {
                let entity = input::read_entity(file.as_deref(), json.as_deref())?;
                commands::mutate::replace(&proxy, &kind, &id, entity, &cx).await
            } else {
                commands::mutate::attach(&proxy, &kind, &id, &mixins, &cx).await
            }
        }
        Commands::Trigger {
            kind,
            action,
            id,
            mixins,
            attributes,
            ..
        } => {
            let request = commands::trigger::TriggerRequest {
                kind: &kind,
                action: &action,
                id: id.as_deref(),
                mixins: &mixins,
                attributes: &attributes,
            };
            commands::trigger::handle(&proxy, request, &cx).await
        }
    }
}

fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Kinds => "kinds",
        Commands::Mixins { .. } => "mixins",
        Commands::Ids { .. } => "ids",
        Commands::List { .. } => "list",
        Commands::Show { .. } => "show",
        Commands::Create { .. } => "create",
        Commands::Delete { .. } => "delete",
        Commands::Update { .. } => "update",
        Commands::Trigger { .. } => "trigger",
    }
}
