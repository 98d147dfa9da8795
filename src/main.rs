use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use conn_rewriter::{
    database_helper_rules, RewriteOutcome, RewriteReport, Rewriter, RuleReport, DEFAULT_TARGET,
};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conn-rewriter")]
#[command(
    about = "Migrate a route module from MongoClient.connect to getDatabase()",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the target file in place
    Apply {
        /// File to migrate
        #[arg(default_value = DEFAULT_TARGET)]
        file: PathBuf,

        /// Dry run - show what would be changed without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print the rewrite report as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show how many matches of each rule remain in the file
    Status {
        /// File to inspect
        #[arg(default_value = DEFAULT_TARGET)]
        file: PathBuf,
    },

    /// Exit non-zero unless the file is fully migrated
    Verify {
        /// File to inspect
        #[arg(default_value = DEFAULT_TARGET)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            file,
            dry_run,
            diff,
            json,
        } => cmd_apply(&file, dry_run, diff, json),

        Commands::Status { file } => cmd_status(&file),

        Commands::Verify { file } => cmd_verify(&file),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print only the changed hunks. The `+++` header names the rules that fired.
fn display_diff(report: &RewriteReport) {
    let fired: Vec<String> = report
        .rules
        .iter()
        .filter(|r| r.replacements > 0)
        .map(|r| format!("{} x{}", r.id, r.replacements))
        .collect();

    println!(
        "\n{}",
        format!("--- {} [{:016x}]", report.file.display(), report.before_hash).dimmed()
    );
    println!(
        "{}",
        format!(
            "+++ {} [{:016x}] {}",
            report.file.display(),
            report.after_hash,
            fired.join(", ")
        )
        .dimmed()
    );

    let diff = TextDiff::from_lines(report.before.as_str(), report.after.as_str());
    let mut unified = diff.unified_diff();
    unified.context_radius(2);

    for hunk in unified.iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn print_rule_counts(reports: &[RuleReport], verb: &str) {
    for report in reports {
        let marker = if report.replacements > 0 {
            "✓".green()
        } else {
            "⊙".yellow()
        };
        println!(
            "  {} {}: {} {}",
            marker, report.id, report.replacements, verb
        );
    }
}

fn cmd_apply(file: &Path, dry_run: bool, show_diff: bool, json: bool) -> Result<()> {
    let report: RewriteReport = Rewriter::new(file, database_helper_rules())
        .dry_run(dry_run)
        .run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
    }

    print_rule_counts(&report.rules, "replaced");

    if show_diff && report.changed() {
        display_diff(&report);
    }

    println!();
    match report.outcome {
        RewriteOutcome::Rewritten { .. } => {
            println!(
                "{} Migrated {} to getDatabase() helper",
                "✓".green(),
                file.display()
            );
        }
        RewriteOutcome::WouldRewrite { .. } => {
            println!(
                "{} Would migrate {} to getDatabase() helper",
                "✓".green(),
                file.display()
            );
        }
        RewriteOutcome::Unchanged => {
            println!(
                "{} {} already uses getDatabase() helper",
                "⊙".yellow(),
                file.display()
            );
        }
    }

    Ok(())
}

fn cmd_status(file: &Path) -> Result<()> {
    let counts = Rewriter::new(file, database_helper_rules()).scan()?;

    println!("{}", "Migration Status Report".bold());
    println!("File: {}", file.display());
    println!();

    let remaining: usize = counts.iter().map(|r| r.replacements).sum();
    for report in &counts {
        let marker = if report.replacements == 0 {
            "✓".green()
        } else {
            "⊙".yellow()
        };
        println!("  {} {}: {} remaining", marker, report.id, report.replacements);
    }

    println!();
    if remaining == 0 {
        println!("{}", "MIGRATED".green().bold());
    } else {
        println!(
            "{} ({} matches remaining)",
            "NOT MIGRATED".yellow().bold(),
            remaining
        );
    }

    Ok(())
}

fn cmd_verify(file: &Path) -> Result<()> {
    let counts = Rewriter::new(file, database_helper_rules()).scan()?;

    println!("{}", "Verifying migration...".bold());
    println!("File: {}", file.display());
    println!();

    let mut mismatch = 0;
    for report in &counts {
        if report.replacements == 0 {
            println!("{} {}: Verified", "✓".green(), report.id);
        } else {
            eprintln!(
                "{} {}: MISMATCH ({} matches remaining)",
                "✗".red(),
                report.id,
                report.replacements
            );
            mismatch += 1;
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} verified",
        format!("{}", counts.len() - mismatch).green()
    );
    println!("  {} mismatch", format!("{}", mismatch).red());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}
