//! Operational commands for the outbox table.
//!
//! Reads `DATABASE_URL` from the environment (or `.env`).

use std::env;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use transactional_outbox::{OutboxRepository, SqlxOutboxRepository};

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  outbox-cli stats");
    eprintln!("  outbox-cli replay-since <rfc3339_ts>");
    eprintln!("  outbox-cli revive <max_retries>");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let Some(cmd) = args.get(1) else { usage() };

    let db_url = env::var("DATABASE_URL")?;
    let repo = SqlxOutboxRepository::new(PgPool::connect(&db_url).await?);

    match (cmd.as_str(), args.get(2)) {
        ("stats", None) => {
            let stats = repo.pending_stats().await?;
            println!(
                "pending={} oldest_age_seconds={}",
                stats.pending, stats.oldest_age_seconds
            );
        }
        ("replay-since", Some(ts)) => {
            let ts: DateTime<Utc> = DateTime::parse_from_rfc3339(ts)?.with_timezone(&Utc);
            let count = repo.replay_since(ts).await?;
            println!("Replayed {} events since {}", count, ts);
        }
        ("revive", Some(max)) => {
            let count = repo.revive_exhausted(max.parse()?).await?;
            println!("Revived {} exhausted events", count);
        }
        _ => usage(),
    }

    Ok(())
}
