use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use shared::domain::{CouponId, ReferenceId, ReferenceKind, StoreId};
use storage::{NewCoupon, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/coupons.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateStore {
        name: String,
        #[arg(long)]
        slug: Option<String>,
    },
    /// Adds a lookup entry: store, coupon_type, seasonal, featured, category or country.
    CreateReference {
        kind: String,
        name: String,
    },
    CreateCoupon {
        title: String,
        #[arg(long)]
        store_id: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        url: String,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        coupon_type_id: Option<String>,
        #[arg(long)]
        seasonal_id: Option<String>,
        #[arg(long)]
        featured_id: Option<String>,
        #[arg(long, value_parser = parse_day)]
        publish_date: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_day)]
        expire_date: Option<DateTime<Utc>>,
        /// Explicit position; defaults to the end of the listing.
        #[arg(long)]
        order: Option<u32>,
    },
    DeleteCoupon {
        coupon_id: String,
    },
    ListCoupons,
    ListReferences {
        kind: String,
    },
}

fn parse_day(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD or RFC 3339: {err}"))
        .and_then(|day| {
            day.and_hms_opt(0, 0, 0)
                .map(|at| at.and_utc())
                .ok_or_else(|| "invalid day".to_string())
        })
}

fn parse_kind(raw: &str) -> Result<ReferenceKind> {
    ReferenceKind::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown reference kind '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateStore { name, slug } => {
            let store_id = storage.create_store(&name, slug.as_deref()).await?;
            println!("created store_id={store_id}");
        }
        Command::CreateReference { kind, name } => {
            let kind = parse_kind(&kind)?;
            let id = storage.create_reference(kind, &name).await?;
            println!("created {}_id={id}", kind.as_str());
        }
        Command::CreateCoupon {
            title,
            store_id,
            description,
            url,
            code,
            coupon_type_id,
            seasonal_id,
            featured_id,
            publish_date,
            expire_date,
            order,
        } => {
            let coupon_id = storage
                .create_coupon(&NewCoupon {
                    title,
                    description,
                    url,
                    code,
                    store_id: Some(StoreId::new(store_id)),
                    coupon_type_id: coupon_type_id.map(ReferenceId::new),
                    seasonal_id: seasonal_id.map(ReferenceId::new),
                    featured_id: featured_id.map(ReferenceId::new),
                    publish_date,
                    expire_date,
                    order,
                })
                .await?;
            println!("created coupon_id={coupon_id}");
        }
        Command::DeleteCoupon { coupon_id } => {
            let coupon_id = CouponId::new(coupon_id);
            if storage.delete_coupon(&coupon_id).await? {
                println!("deleted coupon_id={coupon_id}");
            } else {
                anyhow::bail!("coupon {coupon_id} not found");
            }
        }
        Command::ListCoupons => {
            for coupon in storage.list_coupon_summaries().await? {
                println!(
                    "{:>4}  {}  {}  [{}]",
                    coupon.order, coupon.id, coupon.title, coupon.store_name
                );
            }
        }
        Command::ListReferences { kind } => {
            let kind = parse_kind(&kind)?;
            for option in storage.list_reference_options(kind).await? {
                println!("{}  {}", option.id, option.name);
            }
        }
    }

    Ok(())
}
