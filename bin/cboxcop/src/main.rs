//! cboxcop - CERNBox operations CLI
//!
//! Administrative commands over the project and share records of the
//! sharing database, cross-checked against the storage namespace.

mod config;
mod output;
mod prompt;

use anyhow::{Context, Result, bail};
use cboxcop_client::{
    CommandGroupDirectory, EosMetadataClient, EosNamespaceLister, PathResolver,
};
use cboxcop_common::{Config, Error, parse_share_id};
use cboxcop_reconcile::{
    ProjectFilter, ResolveOptions, ShareRow, ShareTransfer, TransferRequest, into_input_order,
    projects, reconcile, resolve_all,
};
use cboxcop_store::{MySqlStore, RecordStore, ShareQuery};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{DEFAULT_CONFIG_PATH, load_config};
use crate::output::{ProjectRow, print_json, project_table, share_table};
use crate::prompt::StdinConfirm;

/// Exit code after an operator interrupt
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "cboxcop")]
#[command(about = "CERNBox operations: project spaces and shares")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Sharing database DSN (overrides [database] url)
    #[arg(long, env = "CBOXCOP_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Project spaces
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },
    /// Sharing info
    Sharing {
        #[command(subcommand)]
        action: SharingCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    /// Add a new project (in the database only)
    Add {
        /// Project name
        name: String,
        /// Owning service account
        svc_account: String,
    },
    /// Delete a project (in the database only)
    Delete {
        /// Project name or path
        name: String,
    },
    /// List project spaces
    List {
        /// Filter by owner account
        #[arg(short, long, default_value = "")]
        owner: String,
        /// Print the storage path; probes every project
        #[arg(long)]
        printpath: bool,
    },
    /// List projects registered in the database but missing from storage
    Orphan {
        /// Only print project names
        #[arg(short, long)]
        quiet: bool,
        /// Print the storage path; probes every project
        #[arg(long)]
        printpath: bool,
    },
    /// Print the owner of a project space
    Getowner {
        /// Project name or path
        name: String,
    },
    /// Change the service account owning a project (in the database only)
    UpdateSvcAccount {
        /// Project name or path
        name: String,
        /// New owning service account
        svc_account: String,
    },
}

#[derive(Subcommand, Debug)]
enum SharingCommands {
    /// List shares; each filter given prints its own table
    List {
        /// Filter by owner account
        #[arg(short, long)]
        owner: Option<String>,
        /// Filter by share id
        #[arg(short, long)]
        id: Option<String>,
        /// Filter by grantee (account or e-group)
        #[arg(short = 's', long)]
        share_with: Option<String>,
        /// Filter by public link token
        #[arg(short, long)]
        token: Option<String>,
        /// Show all shares
        #[arg(short, long)]
        all: bool,
        /// Resolve the storage path of every share
        #[arg(long)]
        printpath: bool,
        /// Concurrent path lookups (default from [sharing] default_concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Transfer a project share to a new owner
    #[command(after_help = "Example: cboxcop sharing transfer 1345 gonzalhu cernbox")]
    Transfer {
        /// Share id
        share_id: String,
        /// New owning account; must administer the project
        new_owner: String,
        /// Project name or path
        project: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file if it exists
    let mut config = load_config(&args.config)?;

    // Initialize logging on stderr; stdout carries the listings
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Config file: {}", args.config.display());

    // CLI takes precedence over the config file
    if let Some(url) = args.database_url.clone() {
        config.database.url = url;
    }

    match run(args, config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let cause = e.downcast_ref::<Error>();
            let code = cause.map_or(1, Error::exit_code);
            if code == 2 {
                error!("{:#}", e);
            }
            match cause {
                Some(c) if c.is_denied() => eprintln!("Refused: {e:#}\nNo changes were made."),
                Some(c) if c.is_not_found() => eprintln!("Not found: {e:#}"),
                _ => eprintln!("Error: {e:#}"),
            }
            std::process::exit(code);
        }
    }
}

/// Run the selected command and return the process exit code
async fn run(args: Args, config: Config) -> Result<i32> {
    let store = connect(&config).await?;
    match args.command {
        Commands::Project { action } => run_project(action, &config, &store, args.json).await,
        Commands::Sharing { action } => run_sharing(action, &config, &store, args.json).await,
    }
}

async fn connect(config: &Config) -> Result<MySqlStore> {
    if config.database.url.is_empty() {
        bail!(Error::invalid_argument(
            "no database configured; set --database-url, CBOXCOP_DATABASE_URL or [database] url"
        ));
    }
    MySqlStore::connect(&config.database.url, config.database.max_connections)
        .await
        .map_err(Error::from)
        .context("connecting to the sharing database")
}

async fn run_project(
    action: ProjectCommands,
    config: &Config,
    store: &dyn RecordStore,
    json: bool,
) -> Result<i32> {
    match action {
        ProjectCommands::Add { name, svc_account } => {
            let project = projects::add_project(store, name.trim(), svc_account.trim()).await?;
            println!("Project {} added at {}", project.name, project.rel_path);
        }
        ProjectCommands::Delete { name } => {
            let project = projects::delete_project(store, name.trim()).await?;
            println!("Project {} deleted", project.name);
        }
        ProjectCommands::Getowner { name } => {
            println!("{}", projects::project_owner(store, name.trim()).await?);
        }
        ProjectCommands::UpdateSvcAccount { name, svc_account } => {
            let project =
                projects::update_project_owner(store, name.trim(), svc_account.trim()).await?;
            println!("Project {} now owned by {}", project.name, project.owner);
        }
        ProjectCommands::List { owner, printpath } => {
            let filter = ProjectFilter::owner(owner.trim());
            let outcome = reconcile(store, &lister(config), &filter).await?;
            print_projects(config, outcome.matched, printpath, json).await?;
        }
        ProjectCommands::Orphan { quiet, printpath } => {
            let outcome = reconcile(store, &lister(config), &ProjectFilter::Orphan).await?;
            if quiet {
                for project in &outcome.matched {
                    println!("{}", project.name);
                }
            } else {
                print_projects(config, outcome.matched, printpath, json).await?;
            }

            if !outcome.malformed.is_empty() {
                for (project, source) in outcome.malformed {
                    let e = Error::InvalidRelPath {
                        project: project.name,
                        source,
                    };
                    eprintln!("Error: {e}");
                }
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn lister(config: &Config) -> EosNamespaceLister {
    EosNamespaceLister::new(config.namespace.clone())
}

async fn print_projects(
    config: &Config,
    matched: Vec<cboxcop_common::ProjectSpace>,
    printpath: bool,
    json: bool,
) -> Result<()> {
    let resolver = if printpath {
        Some(EosMetadataClient::new(config.metadata.clone())?)
    } else {
        None
    };

    let mut rows = Vec::with_capacity(matched.len());
    for project in matched {
        let path = match &resolver {
            Some(resolver) => {
                Some(projects::probe_project_path(resolver, &config.namespace, &project).await)
            }
            None => None,
        };
        rows.push(ProjectRow::new(project, path));
    }

    if json {
        print_json(&rows)
    } else {
        print!("{}", project_table(&rows, printpath).render());
        Ok(())
    }
}

/// Share queries selected on the command line, in display order
fn share_queries(
    owner: Option<String>,
    id: Option<String>,
    share_with: Option<String>,
    token: Option<String>,
    all: bool,
) -> cboxcop_common::Result<Vec<ShareQuery>> {
    let given = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut queries = Vec::new();
    if let Some(owner) = given(owner) {
        queries.push(ShareQuery::Owner(owner));
    }
    if let Some(id) = given(id) {
        queries.push(ShareQuery::Id(parse_share_id(&id)?));
    }
    if let Some(with) = given(share_with) {
        queries.push(ShareQuery::ShareWith(with));
    }
    if let Some(token) = given(token) {
        queries.push(ShareQuery::Token(token));
    }
    if all {
        queries.push(ShareQuery::All);
    }
    Ok(queries)
}

/// Run each query and hand its rows, in input order, to `emit`. Stops
/// before the next query once `cancel` fires.
async fn list_shares(
    store: &dyn RecordStore,
    resolver: &dyn PathResolver,
    queries: Vec<ShareQuery>,
    options: &ResolveOptions,
    cancel: &CancellationToken,
    mut emit: impl FnMut(&[ShareRow]) -> Result<()>,
) -> Result<()> {
    for query in queries {
        if cancel.is_cancelled() {
            warn!("Interrupted, skipping {:?}", query);
            break;
        }
        let shares = tokio::select! {
            shares = store.find_shares(&query) => shares.map_err(Error::from)?,
            () = cancel.cancelled() => {
                warn!("Interrupted while querying {:?}", query);
                break;
            }
        };
        debug!("{:?} matched {} shares", query, shares.len());
        let rows = into_input_order(resolve_all(resolver, &shares, options, cancel).await);
        emit(&rows)?;
    }
    Ok(())
}

/// The first Ctrl-C degrades outstanding lookups and stops the listing
/// after the current query; a second one exits.
async fn handle_interrupts(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupted, cancelling outstanding path lookups (Ctrl-C again to exit)");
    cancel.cancel();
    if tokio::signal::ctrl_c().await.is_ok() {
        error!("Interrupted again, exiting");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    }
}

async fn run_sharing(
    action: SharingCommands,
    config: &Config,
    store: &dyn RecordStore,
    json: bool,
) -> Result<i32> {
    match action {
        SharingCommands::List {
            owner,
            id,
            share_with,
            token,
            all,
            printpath,
            concurrency,
        } => {
            let queries = share_queries(owner, id, share_with, token, all)?;
            if queries.is_empty() {
                bail!(Error::invalid_argument(
                    "pass at least one of --owner, --id, --share-with, --token or --all"
                ));
            }

            let concurrency = concurrency.unwrap_or(config.sharing.default_concurrency);
            if concurrency == 0 {
                bail!(Error::invalid_argument("--concurrency must be at least 1"));
            }
            let options = ResolveOptions {
                concurrency,
                print_paths: printpath,
                task_timeout: config.sharing.task_timeout_secs.map(Duration::from_secs),
                batch_timeout: config.sharing.batch_timeout_secs.map(Duration::from_secs),
                public_link_base: config.sharing.public_link_base.clone(),
            };
            let resolver = EosMetadataClient::new(config.metadata.clone())?;

            let cancel = CancellationToken::new();
            let interrupt = tokio::spawn(handle_interrupts(cancel.clone()));
            let listed = list_shares(store, &resolver, queries, &options, &cancel, |rows| {
                if json {
                    print_json(rows)
                } else {
                    print!("{}", share_table(rows, printpath).render());
                    Ok(())
                }
            })
            .await;
            interrupt.abort();
            listed?;
            if cancel.is_cancelled() {
                return Ok(INTERRUPTED_EXIT_CODE);
            }
        }
        SharingCommands::Transfer {
            share_id,
            new_owner,
            project,
            yes,
        } => {
            let request = TransferRequest {
                share_id: parse_share_id(&share_id)?,
                new_owner: new_owner.trim().to_string(),
                project: project.trim().to_string(),
                confirmed: yes,
            };
            let groups = CommandGroupDirectory::new(config.groups.clone());
            let confirm = StdinConfirm::new(config.sharing.public_link_base.as_str());
            let transfer = ShareTransfer::new(store, &groups, &confirm, &config.sharing);
            let share = transfer.transfer(&request).await?;
            println!("Share {} transferred to {}", share.id, share.owner);
        }
    }
    Ok(0)
}
