//! Grove CLI - Command-line interface for Grove
//!
//! Feeds fact files produced by an analyzer into the branch-aware code
//! graph and inspects the result.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grove")]
#[command(author = "Grove Contributors")]
#[command(version)]
#[command(about = "Branch-aware incremental code graph synchronization", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding .grove/config.json
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Grove in the root directory
    Init {
        /// Branch used as the fallback for edge targets
        #[arg(long)]
        main: Option<String>,
    },

    /// Import a fact file into its branch
    Import {
        /// JSON fact file
        file: PathBuf,

        /// Rebuild without preserving edges of replaced nodes
        #[arg(long)]
        simple: bool,

        /// Main branch (defaults to the configured one)
        #[arg(long)]
        main: Option<String>,

        /// Branch the facts are compared against
        #[arg(long)]
        base: Option<String>,

        /// Pull request the new nodes belong to
        #[arg(long)]
        pr: Option<String>,

        /// Version recorded on created nodes
        #[arg(long = "fact-version")]
        fact_version: Option<String>,

        /// Version of the base branch
        #[arg(long)]
        base_version: Option<String>,

        /// Facts per batch
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Fork a branch into a new one
    Clone {
        project: String,
        source: String,
        target: String,

        /// Fact file whose classes and methods are left out of the copy
        #[arg(long)]
        exclude_facts: Option<PathBuf>,

        /// Nodes per page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Delete all nodes of a branch
    DeleteBranch {
        project: String,
        branch: String,

        /// Only delete nodes of this pull request
        #[arg(long)]
        pr: Option<String>,
    },

    /// List nodes of a branch
    Nodes {
        project: String,
        branch: String,

        #[arg(long)]
        class: Option<String>,

        #[arg(long)]
        method: Option<String>,

        /// Only configuration nodes
        #[arg(long)]
        config: bool,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Walk the graph from one node
    Traverse {
        project: String,
        branch: String,
        class: String,

        #[arg(long)]
        method: Option<String>,

        /// Relationship filter, e.g. "CALL>|<IMPLEMENT|USE"
        #[arg(short, long, default_value = "")]
        filter: String,

        #[arg(long, default_value = "1")]
        min_level: usize,

        #[arg(long, default_value = "5")]
        max_level: usize,

        /// Keep overlay nodes even when the branch has its own copy
        #[arg(long)]
        keep_shadowed: bool,
    },

    /// Show store statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let root = cli.root;
    let result = match cli.command {
        Commands::Init { main } => commands::init(&root, main),
        Commands::Import {
            file,
            simple,
            main,
            base,
            pr,
            fact_version,
            base_version,
            batch_size,
        } => commands::import(
            &root,
            &file,
            commands::ImportOptions {
                simple,
                main,
                base,
                pr,
                version: fact_version,
                base_version,
                batch_size,
            },
        ),
        Commands::Clone {
            project,
            source,
            target,
            exclude_facts,
            page_size,
        } => commands::clone(
            &root,
            &project,
            &source,
            &target,
            exclude_facts.as_deref(),
            page_size,
        ),
        Commands::DeleteBranch {
            project,
            branch,
            pr,
        } => commands::delete_branch(&root, &project, &branch, pr.as_deref()),
        Commands::Nodes {
            project,
            branch,
            class,
            method,
            config,
            json,
        } => commands::nodes(&root, &project, &branch, class, method, config, json),
        Commands::Traverse {
            project,
            branch,
            class,
            method,
            filter,
            min_level,
            max_level,
            keep_shadowed,
        } => commands::traverse(
            &root,
            &project,
            &branch,
            &class,
            method,
            &filter,
            min_level,
            max_level,
            keep_shadowed,
        ),
        Commands::Stats => commands::stats(&root),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
