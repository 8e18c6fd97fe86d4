mod cli;
mod config;
mod diff;
mod error;
mod exec;
mod printer;
mod project;
mod remote;
mod spinner;
mod sync;

use std::collections::HashMap;
use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use is_terminal::IsTerminal;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::Config;
use error::{ClientError, EXIT_LOCAL};
use exec::{Execution, ExecutionClient};
use printer::TextPrinter;
use project::{ProjectStore, Removal};
use remote::http::SmarthomeClient;
use remote::{ExecutionRequest, Mode, Target};
use spinner::Progress;
use sync::Synchronizer;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_logging(args.verbose);

    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            err.downcast_ref::<ClientError>().map_or(EXIT_LOCAL, ClientError::exit_code)
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "hms=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Cli) -> Result<i32> {
    let mut cfg = Config::load();
    cfg.set_override("SMARTHOME_URL", args.url.as_deref());
    cfg.set_override("SMARTHOME_USERNAME", args.username.as_deref());
    cfg.set_override("SMARTHOME_PASSWORD", args.password.as_deref());
    debug!(config = %cfg.config_path.display(), url = %cfg.server_url(), "loaded configuration");

    let styled = io::stdout().is_terminal() && !args.no_color;
    let printer = TextPrinter { styled };

    // Script arguments are validated before anything touches the network.
    let script_args = match &args.command {
        Command::Run { args, .. } | Command::Lint { args, .. } | Command::RunFile { args, .. } => {
            exec::parse_args(args).map_err(ClientError::from)?
        }
        _ => HashMap::new(),
    };

    let cwd = std::env::current_dir().context("failed to determine the working directory")?;
    let store = ProjectStore::new(cwd);
    debug!(root = %store.root().display(), "using project store");

    let client = SmarthomeClient::from_config(&cfg)?;
    if needs_session(&args.command) {
        client
            .login(&cfg.password())
            .await
            .map_err(ClientError::remote("Failed to log in"))?;
    }
    let sync = Synchronizer::new(&store, &client);
    let progress = Progress::stderr();
    let executor = ExecutionClient::new(&client, client.username()).with_progress(progress.clone());

    match args.command {
        Command::New { id, name } => {
            sync.create(&id, name.as_deref().unwrap_or_default()).await?;
            printer.success(&format!("Successfully created new remote project: '{id}' at './{id}'."));
        }
        Command::Push { no_lint } => {
            if !no_lint && cfg.lint_on_push() {
                let local = store.read_local_project().map_err(ClientError::from)?;
                let request = ExecutionRequest {
                    target: Target::ByCode {
                        filename: local.descriptor.script_file_name(),
                        code: local.source,
                    },
                    args: HashMap::new(),
                    mode: Mode::Lint,
                };
                let execution = executor.submit(&request).await?;
                if execution.is_failure() {
                    execution.print(&printer);
                    return Ok(execution.exit_code());
                }
            }
            let outcome = progress.decorate("Pushing to remote", sync.push()).await?;
            print!("{}", outcome.render(styled));
        }
        Command::Pull => {
            let outcome = progress.decorate("Pulling from remote", sync.pull()).await?;
            print!("{}", outcome.render(styled));
        }
        Command::Ls => {
            let descriptors = sync.list().await?;
            print!("{}", printer::project_table(&descriptors, styled));
        }
        Command::Run { local, .. } => {
            return submit(&executor, &store, &printer, Mode::Execute, local, script_args).await;
        }
        Command::Lint { remote, .. } => {
            return submit(&executor, &store, &printer, Mode::Lint, !remote, script_args).await;
        }
        Command::RunFile { path, .. } => {
            let request = exec::file_request(&path, script_args).map_err(ClientError::from)?;
            let start = Instant::now();
            let execution = executor.submit(&request).await?;
            return Ok(finish(&execution, &printer, start));
        }
        Command::Pipe { code } => {
            let execution = executor.submit(&exec::pipe_request(&code)).await?;
            execution.print(&printer);
            return Ok(execution.exit_code());
        }
        Command::Rm { id, purge } => {
            let outcome = sync.remove(&id, purge).await?;
            match outcome.local {
                Removal::Removed => println!("Removed project root at ./{id}"),
                Removal::Absent => println!("Project does not exist locally, therefore skipping local removal."),
            }
            if outcome.purged {
                printer.success(&format!("Deleted project `{id}` from remote."));
            }
        }
        Command::Clone { all: true, .. } => {
            println!("Cloning all available Homescripts from `{}`...\n", client.base_url());
            let summary = sync.clone_all().await?;
            for outcome in &summary.cloned {
                println!("Cloned `{}` into `{}` (size: {}B).", outcome.id, outcome.dir.display(), outcome.bytes);
            }
            for (id, err) in &summary.failures {
                let chain: Vec<String> = anyhow::Chain::new(err).map(|e| e.to_string()).collect();
                printer.failure(&format!("Could not clone `{id}`: {}", chain.join(": ")));
            }
            if !summary.cloned.is_empty() || !summary.failures.is_empty() {
                println!("\n{}", summary.render());
            }
            summary.into_result()?;
        }
        Command::Clone { id: Some(id), .. } => {
            println!("Cloning into `{id}`...");
            let outcome = sync.clone_project(&id).await?;
            println!("Downloaded remote project (size: {}B) into `{}`.", outcome.bytes, outcome.dir.display());
        }
        Command::Clone { id: None, .. } => {
            anyhow::bail!("either a project id or --all is required");
        }
    }
    Ok(0)
}

/// Local-only removal works without a server round-trip.
fn needs_session(command: &Command) -> bool {
    !matches!(command, Command::Rm { purge: false, .. })
}

async fn submit(
    executor: &ExecutionClient<'_, SmarthomeClient>,
    store: &ProjectStore,
    printer: &TextPrinter,
    mode: Mode,
    by_code: bool,
    args: HashMap<String, String>,
) -> Result<i32> {
    let local = store.read_local_project().map_err(ClientError::from)?;
    let target = if by_code {
        Target::ByCode { filename: local.descriptor.script_file_name(), code: local.source }
    } else {
        Target::ById(local.descriptor.id)
    };

    let start = Instant::now();
    let execution = executor.submit(&ExecutionRequest { target, args, mode }).await?;
    Ok(finish(&execution, printer, start))
}

fn finish(execution: &Execution, printer: &TextPrinter, start: Instant) -> i32 {
    execution.print(printer);
    println!("{}", exec::timing_line(execution.mode, start.elapsed(), printer.styled));
    execution.exit_code()
}
