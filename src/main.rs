//! Backlog - task state management, health scoring, and auto-remediation.
//!
//! Thin presentation layer over the library: parse arguments, call the
//! core, print results, map typed errors to exit codes.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use backlog::health::monitor::TaskHealth;
use backlog::{
    BacklogConfig, BacklogError, CommandTestProbe, Complexity, DependencyResolver, Estimates,
    GitCli, HealthMonitor, HealthScorer, Priority, ProgressTracker, RemediationEngine, Task,
    TaskFilter, TaskPatch, TaskStatus, TaskStore,
};

#[derive(Parser)]
#[command(name = "backlog")]
#[command(version = "0.1.0")]
#[command(about = "Task backlog with health scoring and auto-remediation", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Store root directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tasks directory and an empty backlog
    Init,

    /// Add a new task
    Add {
        /// Unique task id (e.g. TASK-042)
        id: String,
        /// Task title
        title: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, value_enum)]
        complexity: Option<Complexity>,
        /// Estimated effort in hours
        #[arg(long)]
        effort_hours: Option<f64>,
        /// Task ids this task is blocked by (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,
    },

    /// Print one task as JSON
    Show { id: String },

    /// Update fields on a task
    Update {
        id: String,
        #[arg(long, value_enum)]
        status: Option<TaskStatus>,
        /// Progress percentage (0-100)
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
    },

    /// Aggregate counts plus stuck/blocked/completed listings
    Status,

    /// Composite health score for one task
    Score { id: String },

    /// Detect anomalies across the backlog
    Health {
        /// Apply automatic remediations for detected issues
        #[arg(long)]
        fix: bool,
        /// Report intended remediations without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute automatic progress (all tasks, or report one)
    Progress {
        /// Report signal breakdown for this task instead of updating
        task: Option<String>,
    },

    /// Remove satisfied blockers and promote unblocked tasks
    Resolve,

    /// Show recent event records
    Events {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "backlog=debug" } else { "backlog=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> backlog::Result<()> {
    let config = BacklogConfig::load(&cli.root)?;
    let store = TaskStore::new(&cli.root).with_cache_ttl(config.cache_ttl());

    match cli.command {
        Commands::Init => {
            if store.init().await? {
                println!(
                    "{} initialized empty backlog at {}",
                    "ok:".green().bold(),
                    store.paths().backlog.display()
                );
            } else {
                println!(
                    "{} backlog already exists at {}",
                    "ok:".green().bold(),
                    store.paths().backlog.display()
                );
            }
        }

        Commands::Add {
            id,
            title,
            category,
            priority,
            complexity,
            effort_hours,
            blocked_by,
        } => {
            let mut task = Task::new(id, title);
            task.category = category;
            task.priority = priority;
            task.dependencies.blocked_by = blocked_by;
            task.estimates = Estimates {
                effort_hours,
                complexity,
                risk_level: None,
            };
            let added = store.add_task(task, "cli").await?;
            println!("{} added {}: {}", "ok:".green().bold(), added.id.cyan(), added.title);
        }

        Commands::Show { id } => {
            let task = store.get_task(&id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }

        Commands::Update {
            id,
            status,
            progress,
            title,
            priority,
        } => {
            let mut patch = TaskPatch::new();
            patch.status = status;
            patch.progress = progress.map(|p| p.min(100));
            patch.title = title;
            patch.priority = priority;

            let updated = store.update_task(&id, patch, "cli").await?;
            println!(
                "{} {} is now {} at {}%",
                "ok:".green().bold(),
                updated.id.cyan(),
                updated.status.to_string().bold(),
                updated.progress
            );
        }

        Commands::Status => {
            let report = store.generate_health_report(Utc::now()).await?;
            println!("{}", "Backlog status".bold());
            println!("  total: {}", report.total);
            for (status, count) in &report.by_status {
                println!("  {status}: {count}");
            }
            if !report.by_priority.is_empty() {
                println!("{}", "By priority".bold());
                for (priority, count) in &report.by_priority {
                    println!("  {priority}: {count}");
                }
            }
            if !report.stuck_tasks.is_empty() {
                println!("{}", "Stuck (>3 days without update)".yellow().bold());
                for stuck in &report.stuck_tasks {
                    println!(
                        "  {} {} ({} days)",
                        stuck.id.cyan(),
                        stuck.title,
                        stuck.days_since_update
                    );
                }
            }
            if !report.blocked_tasks.is_empty() {
                println!("{}", "Blocked".yellow().bold());
                for blocked in &report.blocked_tasks {
                    println!(
                        "  {} {} (blocked by: {})",
                        blocked.id.cyan(),
                        blocked.title,
                        blocked.blocked_by.join(", ")
                    );
                }
            }
            println!(
                "{} {} completed",
                "done:".green().bold(),
                report.completed_tasks.len()
            );
        }

        Commands::Score { id } => {
            let now = Utc::now();
            let task = store.get_task(&id).await?;
            let all = store.get_tasks(&TaskFilter::new()).await?;
            let events = store.event_log().events_for_task(&id)?;

            let score = HealthScorer::new().score(&task, &all, &events, now);
            println!(
                "{} {} scores {} ({:?})",
                task.id.cyan().bold(),
                task.title,
                score.overall.to_string().bold(),
                score.status
            );
            let b = &score.breakdown;
            println!("  progress velocity  {:>5.1}", b.progress_velocity);
            println!("  implementation     {:>5.1}", b.implementation);
            println!("  dependencies       {:>5.1}", b.dependencies);
            println!("  time efficiency    {:>5.1}", b.time_efficiency);
            println!("  blockage risk      {:>5.1}", b.blockage_risk);
            println!("  communication      {:>5.1}", b.communication);
            println!("  quality            {:>5.1}", b.quality);
            for rec in &score.recommendations {
                println!(
                    "  {} [{}] {} -> {}",
                    "hint:".yellow(),
                    rec.priority,
                    rec.message,
                    rec.action
                );
            }
        }

        Commands::Health { fix, dry_run } => {
            let now = Utc::now();
            let tasks = store.get_tasks(&TaskFilter::new()).await?;
            let monitor = HealthMonitor::with_thresholds(config.monitor.clone());
            let report = monitor.analyze_all(&tasks, store.event_log(), now);

            println!("{}", "Task health".bold());
            println!("  {} healthy", report.stats.healthy.to_string().green());
            println!("  {} warning", report.stats.warning.to_string().yellow());
            println!("  {} critical", report.stats.critical.to_string().red());

            for entry in report.critical.iter().chain(report.warning.iter()) {
                println!("\n  {} {}", entry.task.id.cyan(), entry.task.title);
                for issue in &entry.issues {
                    let line = format!("    [{}] {}", issue.severity, issue.message);
                    match issue.severity {
                        backlog::Severity::Critical | backlog::Severity::High => {
                            println!("{}", line.red())
                        }
                        _ => println!("{}", line.yellow()),
                    }
                    println!("      -> {}", issue.recommendation.dimmed());
                }
            }

            if fix || dry_run {
                remediate_report(&store, &config, &report.critical, &report.warning, dry_run)
                    .await?;
            }
        }

        Commands::Progress { task } => {
            let git = GitCli::new(&cli.root);
            let probe = CommandTestProbe::new(config.test_command.clone(), &cli.root);
            let tracker = ProgressTracker::new(&store, &git, &probe, &cli.root);
            let now = Utc::now();

            match task {
                Some(id) => {
                    let task = store.get_task(&id).await?;
                    let all = store.get_tasks(&TaskFilter::new()).await?;
                    let report = tracker.report(&task, &all, now);
                    println!(
                        "{} currently {}%, suggested {}%",
                        report.task_id.cyan().bold(),
                        report.current,
                        report.suggested
                    );
                    let b = &report.breakdown;
                    println!("  files created   {:>4.0}%", b.files_created * 100.0);
                    println!("  files modified  {:>4.0}%", b.files_modified * 100.0);
                    println!("  commits         {:>4.0}%", b.commits * 100.0);
                    println!("  dependencies    {:>4.0}%", b.dependencies * 100.0);
                    println!("  tests           {:>4.0}%", b.tests * 100.0);
                    println!("  time            {:>4.0}%", b.time * 100.0);
                }
                None => {
                    let changes = tracker.update_all(now).await?;
                    if changes.is_empty() {
                        println!("no progress changes detected");
                    } else {
                        for change in &changes {
                            println!(
                                "{} {}% -> {}%",
                                change.task_id.cyan(),
                                change.from,
                                change.to
                            );
                        }
                        println!(
                            "{} updated progress for {} tasks",
                            "ok:".green().bold(),
                            changes.len()
                        );
                    }
                }
            }
        }

        Commands::Resolve => {
            let summary = DependencyResolver::new(&store).run(Utc::now()).await?;
            if summary.updates.is_empty() {
                println!("all dependencies already resolved");
            } else {
                for update in &summary.updates {
                    println!("{} {}", update.task_id.cyan(), update.title);
                    for removed in &update.removed_blockers {
                        println!("  {} {} completed", "ok:".green(), removed);
                    }
                    if update.now_unblocked {
                        println!("  {}", "fully unblocked".green().bold());
                    } else {
                        println!(
                            "  still blocked by: {}",
                            update.remaining_blockers.join(", ").yellow()
                        );
                    }
                }
                println!(
                    "{} updated {} tasks, {} fully unblocked",
                    "ok:".green().bold(),
                    summary.updates.len(),
                    summary.total_unblocked
                );
            }
        }

        Commands::Events { limit } => {
            for event in store.recent_events(limit)? {
                println!(
                    "{} {} {} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    event.operation.as_str().bold(),
                    event.task_id.as_deref().unwrap_or("-").cyan(),
                    event.source.dimmed()
                );
            }
        }
    }

    Ok(())
}

/// Run the remediation engine over every flagged task in a health report.
async fn remediate_report(
    store: &TaskStore,
    config: &BacklogConfig,
    critical: &[TaskHealth],
    warning: &[TaskHealth],
    dry_run: bool,
) -> Result<(), BacklogError> {
    let remediation_config = config.remediation.clone().with_dry_run(dry_run);
    let engine = RemediationEngine::with_config(store, remediation_config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );
    spinner.set_message("applying automatic remediations...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut applied = 0usize;
    for entry in critical.iter().chain(warning.iter()) {
        let outcome = engine.remediate(&entry.task, &entry.issues).await?;
        applied += outcome.applied.len();
        for fix in &outcome.applied {
            spinner.println(format!("  {} {}: {}", "fix:".green(), entry.task.id, fix.action));
        }
    }

    if applied > 0 {
        spinner.finish_with_message(format!("applied {applied} automatic remediations"));
    } else {
        spinner.finish_with_message("no automatic remediations needed");
    }
    Ok(())
}
