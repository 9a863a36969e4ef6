//! Database row types. These map directly to SQLite rows and are converted
//! into `makewish-types` models at the crate boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use makewish_types::models::{EventSubscriber, Item, User, Wishlist};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct WishlistRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub event_date: Option<String>,
    pub share_slug: String,
    pub created_at: String,
}

pub struct ItemRow {
    pub id: String,
    pub wishlist_id: String,
    pub product_name: String,
    pub product_url: String,
    pub price: String,
    pub image_url: Option<String>,
    pub held_by: Option<String>,
    pub held_by_email: Option<String>,
    pub held_until: Option<String>,
    pub is_fulfilled: bool,
    pub created_at: String,
}

pub struct SubscriberRow {
    pub id: String,
    pub wishlist_id: String,
    pub email: String,
    pub created_at: String,
    pub reminded_at: Option<String>,
}

/// Timestamps are stored as fixed-width RFC 3339 UTC so that SQL string
/// comparison orders them correctly.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("Corrupt timestamp '{}'", raw))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Corrupt date '{}'", raw))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt id '{}'", raw))
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_id(&row.id)?,
            email: row.email,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<WishlistRow> for Wishlist {
    type Error = anyhow::Error;

    fn try_from(row: WishlistRow) -> Result<Self> {
        Ok(Wishlist {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            title: row.title,
            created_at: parse_timestamp(&row.created_at)?,
            event_date: row.event_date.as_deref().map(parse_date).transpose()?,
            share_token: row.share_slug,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = anyhow::Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Item {
            id: parse_id(&row.id)?,
            wishlist_id: parse_id(&row.wishlist_id)?,
            product_name: row.product_name,
            product_url: row.product_url,
            price: row.price,
            image_url: row.image_url,
            held_by: row.held_by,
            held_by_email: row.held_by_email,
            held_until: row.held_until.as_deref().map(parse_timestamp).transpose()?,
            is_fulfilled: row.is_fulfilled,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<SubscriberRow> for EventSubscriber {
    type Error = anyhow::Error;

    fn try_from(row: SubscriberRow) -> Result<Self> {
        Ok(EventSubscriber {
            id: parse_id(&row.id)?,
            wishlist_id: parse_id(&row.wishlist_id)?,
            email: row.email,
            created_at: parse_timestamp(&row.created_at)?,
            reminded_at: row.reminded_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        let ts = parse_timestamp("2026-10-16T08:30:00.000000000Z").unwrap();
        assert_eq!(format_timestamp(ts), "2026-10-16T08:30:00.000000000Z");

        let sqlite = parse_timestamp("2026-10-16 08:30:00").unwrap();
        assert_eq!(sqlite, ts);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_fixed_width_ordering() {
        let early = parse_timestamp("2026-10-16T08:30:00Z").unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(early) < format_timestamp(late));
    }
}
