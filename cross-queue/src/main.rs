//! cross-queue - Manage the scheduled post queue
//!
//! Operational surface for the post state machine: inspect the queue,
//! retry failed posts, reschedule, or cancel.

use clap::{Parser, Subcommand};
use libcrosscast::{Config, CrosscastError, Database, PostEdit, PostQueue, PostStatus, Result};

#[derive(Parser, Debug)]
#[command(name = "cross-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
cross-queue - Manage the Crosscast post queue

COMMANDS:
    list        List posts, optionally filtered by status
    retry       Reset a failed post to scheduled (next tick re-attempts)
    reschedule  Move a post to a different time
    cancel      Remove a post from the queue
    stats       Show queue counts by status

USAGE EXAMPLES:
    # Everything still waiting to go out
    cross-queue list --status scheduled

    # Failed posts, machine-readable
    cross-queue list --status failed --format json

    # Try a failed post again
    cross-queue retry <POST_ID>

    # Push a post to a specific time (RFC 3339 or unix seconds)
    cross-queue reschedule <POST_ID> 2026-09-01T09:00:00Z

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Override with CROSSCAST_CONFIG.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Credential error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts
    List {
        /// Filter by status: draft, scheduled, published, failed
        #[arg(short, long)]
        status: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reset a failed post to scheduled
    Retry {
        /// Post ID to retry
        post_id: String,
    },

    /// Move a post to a different time
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New time (RFC 3339 or unix seconds); omit to unschedule
        time: Option<String>,
    },

    /// Remove a post from the queue
    Cancel {
        /// Post ID to cancel
        post_id: String,
    },

    /// Show queue counts by status
    Stats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let queue = PostQueue::new(db);

    match cli.command {
        Commands::List { status, format } => cmd_list(&queue, status.as_deref(), &format).await,
        Commands::Retry { post_id } => cmd_retry(&queue, &post_id).await,
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&queue, &post_id, time.as_deref()).await
        }
        Commands::Cancel { post_id } => cmd_cancel(&queue, &post_id).await,
        Commands::Stats => cmd_stats(&queue).await,
    }
}

async fn cmd_list(queue: &PostQueue, status: Option<&str>, format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(CrosscastError::InvalidInput(format!(
            "Invalid format '{format}'. Must be 'text' or 'json'"
        )));
    }

    let status = status
        .map(|s| {
            PostStatus::parse(s).ok_or_else(|| {
                CrosscastError::InvalidInput(format!(
                    "Invalid status '{s}'. Must be draft, scheduled, published, or failed"
                ))
            })
        })
        .transpose()?;

    let posts = queue.list(status).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&posts).unwrap_or_default());
        return Ok(());
    }

    for post in posts {
        let when = post
            .scheduled_at
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unscheduled".to_string());

        println!(
            "{} | {} | {} | {}",
            post.id,
            post.status,
            when,
            truncate(&post.content, 50)
        );
        if let Some(error) = post.error_message {
            println!("    error: {error}");
        }
    }

    Ok(())
}

async fn cmd_retry(queue: &PostQueue, post_id: &str) -> Result<()> {
    let post = queue.retry(post_id).await?;
    println!("Post {} rescheduled for retry", post.id);
    Ok(())
}

async fn cmd_reschedule(queue: &PostQueue, post_id: &str, time: Option<&str>) -> Result<()> {
    let scheduled_at = time.map(parse_time).transpose()?;

    let post = queue
        .edit(
            post_id,
            PostEdit {
                scheduled_at: Some(scheduled_at),
                ..Default::default()
            },
        )
        .await?;

    match post.scheduled_at {
        Some(ts) => println!("Post {} scheduled for {ts}", post.id),
        None => println!("Post {} moved back to draft", post.id),
    }
    Ok(())
}

async fn cmd_cancel(queue: &PostQueue, post_id: &str) -> Result<()> {
    queue.cancel(post_id).await?;
    println!("Post {post_id} cancelled");
    Ok(())
}

async fn cmd_stats(queue: &PostQueue) -> Result<()> {
    let posts = queue.list(None).await?;

    let count = |status: PostStatus| posts.iter().filter(|p| p.status == status).count();
    println!("draft:     {}", count(PostStatus::Draft));
    println!("scheduled: {}", count(PostStatus::Scheduled));
    println!("published: {}", count(PostStatus::Published));
    println!("failed:    {}", count(PostStatus::Failed));

    Ok(())
}

/// Accept RFC 3339 or raw unix seconds
fn parse_time(input: &str) -> Result<i64> {
    if let Ok(ts) = input.parse::<i64>() {
        return Ok(ts);
    }

    chrono::DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.timestamp())
        .map_err(|e| CrosscastError::InvalidInput(format!("Could not parse time '{input}': {e}")))
}

fn truncate(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max).collect();
        format!("{truncated}...")
    }
}
