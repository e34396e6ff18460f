use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::domain::{
    CouponId, CouponSummary, ReferenceId, ReferenceKind, ReferenceOption, StoreId, StoreOption,
};

const SUMMARY_SELECT: &str = "
    SELECT c.id, c.title,
           COALESCE(s.name, '') AS store_name,
           COALESCE(s.slug, '') AS store_slug,
           COALESCE(t.name, '') AS coupon_type,
           c.expire_date, c.publish_date, c.code,
           f.name AS featured,
           c.order_index
    FROM coupons c
    LEFT JOIN stores s ON s.id = c.store_id
    LEFT JOIN coupon_types t ON t.id = c.coupon_type_id
    LEFT JOIN featured_labels f ON f.id = c.featured_id";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Fields accepted when a coupon document is created. `order` defaults to
/// one past the current maximum.
#[derive(Debug, Clone, Default)]
pub struct NewCoupon {
    pub title: String,
    pub description: String,
    pub url: String,
    pub code: Option<String>,
    pub store_id: Option<StoreId>,
    pub coupon_type_id: Option<ReferenceId>,
    pub seasonal_id: Option<ReferenceId>,
    pub featured_id: Option<ReferenceId>,
    pub publish_date: Option<DateTime<Utc>>,
    pub expire_date: Option<DateTime<Utc>>,
    pub order: Option<u32>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_store(&self, name: &str, slug: Option<&str>) -> Result<StoreId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("store name must not be empty"));
        }
        let slug = slug.map(slugify).unwrap_or_else(|| slugify(name));
        let id = StoreId(Uuid::new_v4().to_string());
        sqlx::query("INSERT INTO stores (id, name, slug) VALUES (?, ?, ?)")
            .bind(id.as_str())
            .bind(name)
            .bind(&slug)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert store '{name}' (slug '{slug}')"))?;
        Ok(id)
    }

    /// Adds an entry to one of the lookup collections. Stores get a generated
    /// slug like [`Storage::create_store`].
    pub async fn create_reference(&self, kind: ReferenceKind, name: &str) -> Result<ReferenceId> {
        if kind == ReferenceKind::Store {
            let id = self.create_store(name, None).await?;
            return Ok(ReferenceId(id.0));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("{} name must not be empty", kind.as_str()));
        }
        let (table, has_slug) = reference_table(kind);
        let id = ReferenceId(Uuid::new_v4().to_string());
        let query = if has_slug {
            format!("INSERT INTO {table} (id, name, slug) VALUES (?, ?, ?)")
        } else {
            format!("INSERT INTO {table} (id, name) VALUES (?, ?)")
        };
        let mut insert = sqlx::query(&query).bind(id.as_str()).bind(name);
        if has_slug {
            insert = insert.bind(slugify(name));
        }
        insert
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert {} '{name}'", kind.as_str()))?;
        Ok(id)
    }

    pub async fn create_coupon(&self, coupon: &NewCoupon) -> Result<CouponId> {
        let title = coupon.title.trim();
        if title.is_empty() {
            return Err(anyhow!("coupon title must not be empty"));
        }
        let store_id = coupon
            .store_id
            .as_ref()
            .ok_or_else(|| anyhow!("coupon must reference a store"))?;

        let id = CouponId(Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO coupons (
                id, title, description, url, code, store_id, coupon_type_id, seasonal_id,
                featured_id, publish_date, expire_date, order_index
             )
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                COALESCE(?, (SELECT COALESCE(MAX(order_index) + 1, 0) FROM coupons)))",
        )
        .bind(id.as_str())
        .bind(title)
        .bind(&coupon.description)
        .bind(&coupon.url)
        .bind(coupon.code.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .bind(store_id.as_str())
        .bind(coupon.coupon_type_id.as_ref().map(ReferenceId::as_str))
        .bind(coupon.seasonal_id.as_ref().map(ReferenceId::as_str))
        .bind(coupon.featured_id.as_ref().map(ReferenceId::as_str))
        .bind(coupon.publish_date)
        .bind(coupon.expire_date)
        .bind(coupon.order.map(i64::from))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert coupon '{title}'"))?;
        Ok(id)
    }

    /// Every coupon, ascending by persisted order; equal orders keep creation sequence.
    pub async fn list_coupon_summaries(&self) -> Result<Vec<CouponSummary>> {
        let rows = sqlx::query(&format!(
            "{SUMMARY_SELECT} ORDER BY c.order_index ASC, c.seq ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context("failed to list coupons")?;
        rows.iter().map(summary_from_row).collect()
    }

    pub async fn load_coupon_summary(&self, id: &CouponId) -> Result<Option<CouponSummary>> {
        let row = sqlx::query(&format!("{SUMMARY_SELECT} WHERE c.id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load coupon {id}"))?;
        row.as_ref().map(summary_from_row).transpose()
    }

    /// Writes one coupon's `order`. Returns `false` when no such coupon exists.
    pub async fn set_coupon_order(&self, id: &CouponId, order: u32) -> Result<bool> {
        let result = sqlx::query("UPDATE coupons SET order_index = ? WHERE id = ?")
            .bind(i64::from(order))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update order of coupon {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes a coupon document. Returns `false` when it was already gone.
    pub async fn delete_coupon(&self, id: &CouponId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete coupon {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_store_options(&self) -> Result<Vec<StoreOption>> {
        let rows = sqlx::query("SELECT id, name FROM stores ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await
            .context("failed to list stores")?;
        rows.into_iter()
            .map(|row| {
                Ok(StoreOption {
                    id: StoreId(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    pub async fn list_reference_options(&self, kind: ReferenceKind) -> Result<Vec<ReferenceOption>> {
        let (table, has_slug) = reference_table(kind);
        let slug = if has_slug { "slug" } else { "NULL" };
        let query = format!("SELECT id, name, {slug} AS slug FROM {table} ORDER BY name ASC, id ASC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to list {} references", kind.as_str()))?;
        rows.into_iter()
            .map(|row| {
                Ok(ReferenceOption {
                    id: ReferenceId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    slug: row.try_get("slug")?,
                })
            })
            .collect()
    }
}

/// Backing table of a lookup collection and whether it carries slugs.
fn reference_table(kind: ReferenceKind) -> (&'static str, bool) {
    match kind {
        ReferenceKind::Store => ("stores", true),
        ReferenceKind::CouponType => ("coupon_types", true),
        ReferenceKind::Seasonal => ("seasonal_labels", true),
        ReferenceKind::Featured => ("featured_labels", false),
        ReferenceKind::Category => ("categories", true),
        ReferenceKind::Country => ("countries", true),
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<CouponSummary> {
    let id: String = row.try_get("id")?;
    let order_index: i64 = row.try_get("order_index")?;
    let order = u32::try_from(order_index)
        .with_context(|| format!("coupon {id} has out-of-range order {order_index}"))?;
    Ok(CouponSummary {
        id: CouponId(id),
        title: row.try_get("title")?,
        store_name: row.try_get("store_name")?,
        store_slug: row.try_get("store_slug")?,
        coupon_type: row.try_get("coupon_type")?,
        expire_date: row.try_get("expire_date")?,
        publish_date: row.try_get("publish_date")?,
        code: row.try_get("code")?,
        featured: row.try_get("featured")?,
        order,
    })
}

pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
