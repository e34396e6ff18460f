use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(CouponId);
id_newtype!(StoreId);
id_newtype!(ReferenceId);

/// Listing read-model of a coupon. Everything except `order` is owned by the
/// content store and only read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub id: CouponId,
    pub title: String,
    pub store_name: String,
    pub store_slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coupon_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<String>,
    /// Never-reordered documents carry no order; they list as 0.
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: u32,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    Code,
    Deal,
}

impl CouponSummary {
    pub fn kind(&self) -> CouponKind {
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => CouponKind::Code,
            _ => CouponKind::Deal,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_date.is_some_and(|expires| expires < now)
    }

    pub fn is_featured(&self) -> bool {
        self.featured
            .as_deref()
            .is_some_and(|label| !label.trim().is_empty())
    }
}

/// Entry of the store filter dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOption {
    pub id: StoreId,
    pub name: String,
}

/// Lookup collections offered by `/references/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Store,
    CouponType,
    Seasonal,
    Featured,
    Category,
    Country,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 6] = [
        ReferenceKind::Store,
        ReferenceKind::CouponType,
        ReferenceKind::Seasonal,
        ReferenceKind::Featured,
        ReferenceKind::Category,
        ReferenceKind::Country,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Store => "store",
            ReferenceKind::CouponType => "coupon_type",
            ReferenceKind::Seasonal => "seasonal",
            ReferenceKind::Featured => "featured",
            ReferenceKind::Category => "category",
            ReferenceKind::Country => "country",
        }
    }

    /// Accepts the wire names plus the content-store document type names
    /// (`storeAdd`, `coupontype`).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "storeadd" => return Some(ReferenceKind::Store),
            "coupontype" => return Some(ReferenceKind::CouponType),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceOption {
    pub id: ReferenceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}
