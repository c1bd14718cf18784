//! rebasebot command-line tool.
//!
//! `rebasebot merge` merges an upstream reference into a downstream fork,
//! resolves the known-safe conflicts, pushes the result to the rebase branch
//! and opens or updates a pull request. `rebasebot validate` checks a
//! configuration file without touching any repository.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use rebasebot_core::config::AppConfig;
use rebasebot_core::models::{GitHubBranch, GitRef};
use rebasebot_core::{bot, Notifier};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Automated upstream merges for downstream forks.
#[derive(Parser, Debug)]
#[command(name = "rebasebot", version, about = "Merge upstream changes into a fork")]
struct Cli {
    /// Path to the TOML configuration file. Flags override its values.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the source reference into the destination and open a PR.
    Merge(MergeArgs),

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug, Default)]
struct MergeArgs {
    /// Upstream repository and reference: <git url>:<branch|tag|sha>.
    #[arg(short, long)]
    source: Option<GitRef>,

    /// Downstream repository: <user or organisation>/<repo>:<branch>.
    #[arg(short, long)]
    dest: Option<GitHubBranch>,

    /// Repository the PR is opened from: <user or organisation>/<repo>:<branch>.
    #[arg(long)]
    rebase: Option<GitHubBranch>,

    /// Path or glob resolved with `git checkout --ours` (repeatable).
    #[arg(long)]
    ours: Vec<String>,

    /// Path or glob resolved with `git checkout --theirs` (repeatable).
    #[arg(long)]
    theirs: Vec<String>,

    /// Where the working copy is kept.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Author name for merge commits.
    #[arg(long)]
    git_username: Option<String>,

    /// Author email for merge commits.
    #[arg(long)]
    git_email: Option<String>,

    /// Title of a newly created PR.
    #[arg(long)]
    pr_title: Option<String>,

    /// Merge locally but push nothing and open no PR.
    #[arg(long)]
    dry_run: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// How long leftover blocking work may delay exit once a result is out.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", style::error(&format!("failed to start runtime: {e}")));
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(expand_tilde(path))
            .context("failed to load configuration file")?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Merge(args) => cmd_merge(config, args).await,
        Commands::Validate => cmd_validate(config),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.run.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_merge(mut config: AppConfig, args: MergeArgs) -> Result<()> {
    apply_overrides(&mut config, args);
    init_tracing(&config);
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;

    let notifier = Notifier::new(&config.notifications).context("failed to set up notifier")?;

    match bot::run(&config).await {
        Ok(report) => {
            let message = report.to_string();
            println!("{}", style::success(&message));
            if let Err(e) = notifier.notify_result(&message).await {
                warn!(error = %e, "failed to post result notification");
            }
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            error!("{message}");
            if let Err(notify_err) = notifier.notify_escalation(&message).await {
                warn!(error = %notify_err, "failed to post escalation notification");
            }
            Err(e.into())
        }
    }
}

fn cmd_validate(mut config: AppConfig) -> Result<()> {
    let _ = config.resolve_env_vars();

    match config.validate() {
        Ok(()) => println!("{}", style::success("All required fields are valid")),
        Err(e) => {
            println!("{}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    let show = |v: Option<String>| v.unwrap_or_else(|| "NOT SET".into());
    println!();
    println!("{}", style::header("Configuration summary:"));
    println!(
        "  Source        : {}",
        show(config.source.reference.as_ref().map(|r| r.to_string()))
    );
    println!(
        "  Destination   : {}",
        show(config.dest.branch.as_ref().map(|b| b.to_string()))
    );
    println!(
        "  Rebase        : {}",
        show(config.rebase.branch.as_ref().map(|b| b.to_string()))
    );
    println!("  Working dir   : {}", config.git.working_dir.display());
    println!(
        "  GitHub token  : {}",
        if config.github.token.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!(
        "  Slack webhook : {}",
        if config.notifications.slack_webhook_url.is_some() {
            "set"
        } else {
            "not configured"
        }
    );
    println!("  Ours          : {:?}", config.merge.ours);
    println!("  Theirs        : {:?}", config.merge.theirs);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flags win over the config file; repeatable lists replace the file's list
/// when given.
fn apply_overrides(config: &mut AppConfig, args: MergeArgs) {
    if let Some(source) = args.source {
        config.source.reference = Some(source);
    }
    if let Some(dest) = args.dest {
        config.dest.branch = Some(dest);
    }
    if let Some(rebase) = args.rebase {
        config.rebase.branch = Some(rebase);
    }
    if !args.ours.is_empty() {
        config.merge.ours = args.ours;
    }
    if !args.theirs.is_empty() {
        config.merge.theirs = args.theirs;
    }
    if let Some(dir) = args.working_dir {
        config.git.working_dir = dir;
    }
    if let Some(name) = args.git_username {
        config.git.username = name;
    }
    if let Some(email) = args.git_email {
        config.git.email = email;
    }
    if let Some(title) = args.pr_title {
        config.merge.pr_title = Some(title);
    }
    if args.dry_run {
        config.run.dry_run = true;
    }
}

/// Expand a leading `~/` in a path.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge_flags() {
        let cli = Cli::try_parse_from([
            "rebasebot",
            "merge",
            "--source",
            "https://github.com/kubernetes/autoscaler:master",
            "--dest",
            "openshift/kubernetes-autoscaler:master",
            "--rebase",
            "rebasebot/kubernetes-autoscaler:rebase-bot-master",
            "--theirs",
            "vendor/**",
            "--theirs",
            "go.sum",
            "--ours",
            "OWNERS",
            "--dry-run",
        ])
        .unwrap();
        let Commands::Merge(args) = cli.command else {
            panic!("expected merge subcommand");
        };
        assert_eq!(args.source.as_ref().unwrap().reference, "master");
        assert_eq!(args.theirs, vec!["vendor/**", "go.sum"]);
        assert!(args.dry_run);
    }

    #[test]
    fn test_bad_coordinates_rejected_by_parser() {
        let result = Cli::try_parse_from(["rebasebot", "merge", "--dest", "not-a-branch"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config: AppConfig = AppConfig::default();
        config.merge.ours = vec!["from-file".into()];
        config.git.username = "file-user".into();

        let args = MergeArgs {
            ours: vec!["from-flag".into()],
            git_username: Some("flag-user".into()),
            dry_run: true,
            ..MergeArgs::default()
        };
        apply_overrides(&mut config, args);

        assert_eq!(config.merge.ours, vec!["from-flag"]);
        assert!(config.merge.theirs.is_empty());
        assert_eq!(config.git.username, "flag-user");
        assert!(config.run.dry_run);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/etc/rebasebot.toml"), PathBuf::from("/etc/rebasebot.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/rebasebot.toml"), home.join("rebasebot.toml"));
        }
    }
}
