use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "hms", about = "Homescript workspace client for Smarthome", version)]
pub struct Cli {
    /// Smarthome server URL (overrides SMARTHOME_URL).
    #[arg(short = 'i', long = "url", global = true)]
    pub url: Option<String>,

    /// Username used to log in (overrides SMARTHOME_USERNAME).
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Password used to log in (overrides SMARTHOME_PASSWORD).
    #[arg(short = 'p', long, global = true)]
    pub password: Option<String>,

    /// Log requests and synchronization steps to stderr.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new project locally and on the remote.
    New {
        /// Id of the new Homescript.
        id: String,
        /// Display name; defaults to the title-cased id.
        name: Option<String>,
    },

    /// Upload the project in the current directory.
    Push {
        /// Skip linting the code before it is uploaded.
        #[arg(long = "no-lint")]
        no_lint: bool,
    },

    /// Download the remote state of the project in the current directory.
    Pull,

    /// List all Homescripts on the remote.
    Ls,

    /// Execute the project in the current directory.
    ///
    /// Arguments are passed as `key:value` pairs.
    Run {
        /// Send the local code instead of running the stored remote version.
        #[arg(short = 'l', long)]
        local: bool,
        #[arg(value_name = "KEY:VALUE")]
        args: Vec<String>,
    },

    /// Lint the project in the current directory.
    Lint {
        /// Lint the stored remote version instead of the local code.
        #[arg(short = 'r', long)]
        remote: bool,
        #[arg(value_name = "KEY:VALUE")]
        args: Vec<String>,
    },

    /// Execute a standalone Homescript file outside of any project.
    RunFile {
        /// Path of the file to run.
        path: PathBuf,
        #[arg(value_name = "KEY:VALUE")]
        args: Vec<String>,
    },

    /// Execute code given on the command line, one argument per line.
    Pipe {
        #[arg(required = true, value_name = "CODE")]
        code: Vec<String>,
    },

    /// Remove a local project.
    Rm {
        id: String,
        /// Also delete the Homescript on the remote.
        #[arg(short = 'P', long)]
        purge: bool,
    },

    /// Clone a remote project into a new directory.
    Clone {
        /// Id of the Homescript to clone.
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<String>,
        /// Clone every Homescript visible to the user.
        #[arg(short = 'a', long)]
        all: bool,
    },
}
