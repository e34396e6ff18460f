use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use client_core::{HttpCouponBackend, OrderingEngine, OrderingEvent, ViewFilter};
use shared::domain::{CouponId, CouponKind, CouponSummary};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server_url: String,
    /// Print the resulting view as JSON instead of a table.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, default_value = "")]
    store: String,
}

impl FilterArgs {
    fn into_filter(self) -> ViewFilter {
        ViewFilter::new(self.search, self.store)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the visible coupons in their current order.
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show the store names offered by the store filter.
    Stores,
    /// Move the row at `source` to `target` within the filtered view and save.
    Move {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        source: usize,
        #[arg(long)]
        target: usize,
    },
    /// Drop coupon `active` onto the slot held by coupon `over` and save.
    MoveId {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        active: String,
        #[arg(long)]
        over: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let backend = HttpCouponBackend::new(&cli.server_url)?;
    let mut engine = OrderingEngine::new(Arc::new(backend));
    let events = tokio::spawn(report_events(engine.subscribe_events()));

    let outcome = run(cli.command, cli.json, &mut engine).await;
    let reported = drain_events(engine, events).await;
    debug!(reported, "ordering events reported");
    outcome
}

async fn run(command: Command, json: bool, engine: &mut OrderingEngine) -> Result<()> {
    match command {
        Command::Stores => {
            let stores = engine.store_filter_options().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stores)?);
            } else {
                for store in stores {
                    println!("{}  {}", store.id, store.name);
                }
            }
        }
        Command::List { filter } => {
            engine.set_filter(filter.into_filter());
            engine.load().await?;
            print_view(&engine.visible(), json)?;
        }
        Command::Move {
            filter,
            source,
            target,
        } => {
            engine.set_filter(filter.into_filter());
            engine.load().await?;
            if engine.move_visible(source, target)? {
                engine.save().await.context("saving coupon order")?;
            } else {
                info!(source, target, "move left the order unchanged");
            }
            print_view(&engine.visible(), json)?;
        }
        Command::MoveId {
            filter,
            active,
            over,
        } => {
            engine.set_filter(filter.into_filter());
            engine.load().await?;
            if engine.move_by_id(&CouponId::new(active), &CouponId::new(over))? {
                engine.save().await.context("saving coupon order")?;
            }
            print_view(&engine.visible(), json)?;
        }
    }
    Ok(())
}

/// Closes the event channel and waits until every queued event is logged.
async fn drain_events(engine: OrderingEngine, events: JoinHandle<usize>) -> usize {
    drop(engine);
    events.await.unwrap_or_default()
}

async fn report_events(mut events: broadcast::Receiver<OrderingEvent>) -> usize {
    let mut reported = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                reported += 1;
                match event {
                    OrderingEvent::Saved { updated } => info!(updated, "order saved"),
                    OrderingEvent::SaveFailed { attempted, failed } => {
                        let failed: Vec<String> = failed.iter().map(ToString::to_string).collect();
                        warn!(attempted, failed = ?failed, "order save failed; listing reloaded");
                    }
                    OrderingEvent::FetchFailed { message } => {
                        warn!(%message, "listing fetch failed")
                    }
                    event => debug!(?event, "ordering event"),
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "ordering events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
    reported
}

fn print_view(view: &[CouponSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }
    let now = Utc::now();
    for coupon in view {
        let kind = match coupon.kind() {
            CouponKind::Code => "code",
            CouponKind::Deal => "deal",
        };
        let mut flags = Vec::new();
        if coupon.is_featured() {
            flags.push("featured");
        }
        if coupon.is_expired(now) {
            flags.push("expired");
        }
        println!(
            "{:>4}  {:<36}  {:<4}  {}  [{}] {}",
            coupon.order,
            coupon.id,
            kind,
            coupon.title,
            coupon.store_name,
            flags.join(",")
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
