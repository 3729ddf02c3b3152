//! revchain Migration CLI Tool
//!
//! Command-line interface for applying, reverting and inspecting the revision
//! chain shipped with `revchain`. Suitable for CI/CD deployment steps: exit code
//! 0 on success, 1 on any error.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use revchain::config::MigrateConfig;
use revchain::connection::redact_connection_string;
use revchain::migration::{MigrationHistory, Migrator, TableHistory, Target};
use revchain::{connect, PgExecutor};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "revchain-migrate")]
#[command(about = "Revision-chained schema migrations for PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL (else REVCHAIN_DATABASE_URL, DATABASE_URL, config file)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// History table name (default: revchain_history)
    #[arg(long, global = true)]
    history_table: Option<String>,

    /// Seconds to wait for another runner's migration lock
    #[arg(long, global = true)]
    lock_timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show applied and pending revisions
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending revisions
    Up {
        /// Revision to upgrade to, `head` (default) or `+N`
        #[arg(long, conflicts_with = "steps", allow_hyphen_values = true)]
        target: Option<String>,

        /// Number of revisions to apply
        #[arg(long)]
        steps: Option<usize>,

        /// Show what would be applied without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert applied revisions
    Down {
        /// Revision to downgrade to, which stays applied, `base` or `-N`
        #[arg(long, conflicts_with = "steps", allow_hyphen_values = true)]
        target: Option<String>,

        /// Number of revisions to revert (default: 1)
        #[arg(long)]
        steps: Option<usize>,

        /// Show what would be reverted without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Record a revision (and its predecessors) as applied without running it
    Stamp {
        /// Revision id, or the chain's baseline
        revision: String,
    },

    /// List the recorded history
    History,

    /// Show the head of the revision chain
    Heads,

    /// Validate checksums of applied revisions
    Validate,

    /// Print an offline upgrade script
    Sql {
        /// Revision the target database is at; required when the chain has a
        /// baseline
        #[arg(long)]
        from: Option<String>,

        /// Revision to upgrade to (default: head)
        #[arg(long)]
        target: Option<String>,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = MigrateConfig::load().context("failed to load configuration")?;
    let migrator = build_migrator(cli, &config)?;

    match &cli.command {
        Commands::Heads => return handle_heads(&migrator),
        Commands::Sql { from, target } => return handle_sql(&migrator, from.as_deref(), target.as_deref()),
        _ => {}
    }

    let database_url = resolve_database_url(cli.database_url.clone(), &config)?;
    log::debug!("connecting to {}", redact_connection_string(&database_url));
    let executor = PgExecutor::new(connect(&database_url).context("error connecting to database")?);
    if !executor.check_health().context("database health check failed")? {
        anyhow::bail!("database health check returned an unexpected value");
    }

    match &cli.command {
        Commands::Status { json } => handle_status(&migrator, &executor, *json),
        Commands::Up { target, steps, dry_run } => {
            let target = upgrade_target(target.as_deref(), *steps);
            handle_up(&migrator, &executor, &target, *dry_run)
        }
        Commands::Down { target, steps, dry_run } => {
            let target = downgrade_target(target.as_deref(), *steps);
            handle_down(&migrator, &executor, &target, *dry_run)
        }
        Commands::Stamp { revision } => handle_stamp(&migrator, &executor, revision),
        Commands::History => handle_history(&migrator, &executor),
        Commands::Validate => handle_validate(&migrator, &executor),
        Commands::Heads | Commands::Sql { .. } => Ok(()),
    }
}

fn build_migrator(cli: &Cli, config: &MigrateConfig) -> Result<Migrator> {
    let table = cli
        .history_table
        .clone()
        .unwrap_or_else(|| config.history_table.clone());
    let history = TableHistory::new(table)?;
    let chain = revchain::versions::chain()?;
    Ok(Migrator::new(chain, history).with_lock_timeout(cli.lock_timeout.unwrap_or(config.lock_timeout_seconds)))
}

fn resolve_database_url(flag: Option<String>, config: &MigrateConfig) -> Result<String> {
    flag.or_else(|| std::env::var("REVCHAIN_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| config.url.clone())
        .context(
            "Database URL not provided. Use --database-url, set REVCHAIN_DATABASE_URL or DATABASE_URL, \
             or add `url` under [migrations] in config/config.toml.",
        )
}

fn upgrade_target(target: Option<&str>, steps: Option<usize>) -> Target {
    match (target, steps) {
        (_, Some(n)) => Target::Steps(n),
        (Some(rev), None) => Target::parse(rev),
        (None, None) => Target::Head,
    }
}

fn downgrade_target(target: Option<&str>, steps: Option<usize>) -> Target {
    match (target, steps) {
        (_, Some(n)) => Target::Steps(n),
        (Some(rev), None) => Target::parse(rev),
        (None, None) => Target::Steps(1),
    }
}

fn handle_status(migrator: &Migrator, executor: &PgExecutor, json: bool) -> Result<()> {
    let status = migrator.status(executor)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n📊 Migration Status\n");
    println!("Current: {}", status.current.as_deref().unwrap_or("<base>").bold());
    println!("Head:    {}\n", status.head.bold());

    if status.applied.is_empty() {
        println!("✅ Applied Revisions: None");
    } else {
        println!("✅ Applied Revisions ({}):", status.applied_count());
        for record in &status.applied {
            let time_str = match record.execution_time_ms {
                Some(ms) => format!("{ms}ms"),
                None if record.is_stamped() => "stamped".to_string(),
                None => "N/A".to_string(),
            };
            println!(
                "  {} {} {} ({}, {})",
                "✓".green(),
                record.revision,
                record.description,
                record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Revisions: None");
    } else {
        println!("⏳ Pending Revisions ({}):", status.pending_count());
        for pending in &status.pending {
            println!("  {} {} {}", "⏳".yellow(), pending.revision, pending.description);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied_count(),
        status.pending_count()
    );
    Ok(())
}

fn handle_up(migrator: &Migrator, executor: &PgExecutor, target: &Target, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = migrator.plan_upgrade(executor, target)?;
        if plan.is_empty() {
            println!("No pending revisions to apply");
        } else {
            println!("Would apply {} revision(s):", plan.len());
            for (i, change) in plan.iter().enumerate() {
                println!("  {}. {}", i + 1, change);
            }
        }
        return Ok(());
    }

    println!("Upgrading to {target}...");
    let applied = migrator.upgrade(executor, target)?;
    if applied > 0 {
        println!("✅ Successfully applied {applied} revision(s)");
    } else {
        println!("✅ No revisions to apply");
    }
    Ok(())
}

fn handle_down(migrator: &Migrator, executor: &PgExecutor, target: &Target, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = migrator.plan_downgrade(executor, target)?;
        if plan.is_empty() {
            println!("No applied revisions to revert");
        } else {
            println!("Would revert {} revision(s):", plan.len());
            for (i, change) in plan.iter().enumerate() {
                println!("  {}. {}", i + 1, change);
            }
        }
        return Ok(());
    }

    println!("Downgrading to {target}...");
    let reverted = migrator.downgrade(executor, target)?;
    if reverted > 0 {
        println!("✅ Successfully reverted {reverted} revision(s)");
    } else {
        println!("✅ No revisions to revert");
    }
    Ok(())
}

fn handle_stamp(migrator: &Migrator, executor: &PgExecutor, revision: &str) -> Result<()> {
    let written = migrator.stamp(executor, revision)?;
    println!("✅ Stamped {revision} ({written} record(s) written)");
    Ok(())
}

fn handle_history(migrator: &Migrator, executor: &PgExecutor) -> Result<()> {
    let history = migrator.history();
    history.ensure(executor)?;
    let records = history.applied(executor)?;

    if records.is_empty() {
        println!("No revisions recorded");
        return Ok(());
    }
    for record in records.iter().rev() {
        println!(
            "{} {} {} [{}]",
            record.applied_at.format("%Y-%m-%d %H:%M:%S"),
            record.revision.bold(),
            record.description,
            short_checksum(&record.checksum)
        );
    }
    Ok(())
}

/// First 12 characters of a checksum; rows written by other tools may hold anything
fn short_checksum(checksum: &str) -> String {
    checksum.chars().take(12).collect()
}

fn handle_heads(migrator: &Migrator) -> Result<()> {
    let chain = migrator.chain();
    println!("{} (head)", chain.head());
    if let Some(baseline) = chain.baseline() {
        println!("baseline: {baseline} (stamp it before the first upgrade)");
    }
    Ok(())
}

fn handle_validate(migrator: &Migrator, executor: &PgExecutor) -> Result<()> {
    println!("Validating checksums...");
    migrator.validate_checksums(executor)?;
    println!("✅ All checksums valid");
    Ok(())
}

fn handle_sql(migrator: &Migrator, from: Option<&str>, target: Option<&str>) -> Result<()> {
    let target = target.map_or(Target::Head, Target::parse);
    print!("{}", migrator.upgrade_sql(from, &target)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up_with_steps() {
        let cli = Cli::try_parse_from(["revchain-migrate", "up", "--steps", "2", "--dry-run"]).unwrap();
        match cli.command {
            Commands::Up { target, steps, dry_run } => {
                assert_eq!(target, None);
                assert_eq!(steps, Some(2));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_target_and_steps_conflict() {
        assert!(Cli::try_parse_from(["revchain-migrate", "down", "--target", "base", "--steps", "1"]).is_err());
        assert!(Cli::try_parse_from(["revchain-migrate", "-v", "-q", "status"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "revchain-migrate",
            "status",
            "--json",
            "--database-url",
            "postgres://u:p@localhost/games",
            "--history-table",
            "schema_history",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("postgres://u:p@localhost/games"));
        assert_eq!(cli.history_table.as_deref(), Some("schema_history"));
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }

    #[test]
    fn test_default_targets() {
        assert_eq!(upgrade_target(None, None), Target::Head);
        assert_eq!(upgrade_target(Some("i4d5e6f7g8h9"), None), Target::Revision("i4d5e6f7g8h9".to_string()));
        assert_eq!(downgrade_target(None, None), Target::Steps(1));
        assert_eq!(downgrade_target(Some("base"), None), Target::Base);
        assert_eq!(downgrade_target(None, Some(3)), Target::Steps(3));
    }

    #[test]
    fn test_database_url_flag_wins() {
        let config = MigrateConfig {
            url: Some("postgres://cfg@localhost/games".to_string()),
            ..MigrateConfig::default()
        };
        let url = resolve_database_url(Some("postgres://flag@localhost/games".to_string()), &config).unwrap();
        assert_eq!(url, "postgres://flag@localhost/games");
    }

    #[test]
    fn test_signed_targets_parse_from_command_line() {
        let cli = Cli::try_parse_from(["revchain-migrate", "down", "--target", "-1"]).unwrap();
        match cli.command {
            Commands::Down { target, steps, .. } => {
                assert_eq!(downgrade_target(target.as_deref(), steps), Target::Relative(-1));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(upgrade_target(Some("+2"), None), Target::Relative(2));
    }

    #[test]
    fn test_short_checksum_handles_multibyte_text() {
        assert_eq!(short_checksum(&"a".repeat(64)), "a".repeat(12));
        assert_eq!(short_checksum("stamped"), "stamped");
        assert_eq!(short_checksum("ééééééééééééé"), "éééééééééééé");
    }

    #[test]
    fn test_offline_script_needs_from_for_shipped_chain() {
        let cli = Cli::try_parse_from(["revchain-migrate", "sql"]).unwrap();
        let migrator = build_migrator(&cli, &MigrateConfig::default()).unwrap();
        assert!(handle_sql(&migrator, None, None).is_err());
    }

    #[test]
    fn test_offline_script_for_shipped_chain() {
        let cli = Cli::try_parse_from(["revchain-migrate", "sql"]).unwrap();
        let migrator = build_migrator(&cli, &MigrateConfig::default()).unwrap();
        let script = migrator.upgrade_sql(Some("h3c4d5e6f7g8"), &Target::Head).unwrap();
        assert!(script.contains(r#"CREATE TABLE "folder_rule""#));
        assert!(script.contains("INSERT INTO revchain_history"));
    }
}
