use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod facts;

#[derive(Parser)]
#[command(name = "rsv")]
#[command(about = "Humanitarian fact resolver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one canonical figure per (country, hazard, month, metric)
    Resolve {
        /// Normalized facts CSV
        #[arg(long)]
        facts: String,

        /// Layered config paths in merge order (base -> overrides)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Review overrides CSV
        #[arg(long)]
        overrides: Option<String>,

        /// Level history snapshot (read at start, saved after a successful run)
        #[arg(long)]
        levels: Option<String>,

        /// Output directory for resolved.json and diagnostics.jsonl
        #[arg(long = "out-dir")]
        out_dir: String,

        /// Run id (defaults to a fresh UUID)
        #[arg(long = "run-id")]
        run_id: Option<String>,

        /// What to do with config keys nothing reads
        #[arg(long = "unused-keys", value_enum, default_value_t = UnusedKeys::Warn)]
        unused_keys: UnusedKeys,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Diagnostics log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a diagnostics log
    Verify {
        #[arg(long)]
        path: String,
    },

    /// Compare the decisions of two runs
    Diff {
        #[arg(long)]
        path: String,

        /// Earlier run id
        #[arg(long)]
        before: String,

        /// Later run id
        #[arg(long)]
        after: String,

        /// Read the later run from another log
        #[arg(long = "after-path")]
        after_path: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnusedKeys {
    Warn,
    Fail,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Resolve {
            facts,
            config_paths,
            overrides,
            levels,
            out_dir,
            run_id,
            unused_keys,
        } => commands::resolve::resolve(commands::resolve::ResolveArgs {
            facts_path: facts,
            config_paths,
            overrides_path: overrides,
            levels_path: levels,
            out_dir,
            run_id,
            unused_keys: match unused_keys {
                UnusedKeys::Warn => rsv_config::UnusedKeyPolicy::Warn,
                UnusedKeys::Fail => rsv_config::UnusedKeyPolicy::Fail,
            },
        }),

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => commands::audit::verify(&path),
            AuditCmd::Diff {
                path,
                before,
                after,
                after_path,
            } => commands::audit::diff(&path, &before, &after, after_path.as_deref()),
        },
    }
}
