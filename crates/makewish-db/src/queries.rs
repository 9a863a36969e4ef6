use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use makewish_types::models::{EventSubscriber, Item, User, Wishlist};

use crate::Database;
use crate::models::{
    ItemRow, SubscriberRow, UserRow, WishlistRow, format_date, format_timestamp,
};

/// Share tokens are random, so a collision just means drawing again.
const SHARE_TOKEN_ATTEMPTS: usize = 5;

const WISHLIST_COLUMNS: &str = "id, user_id, title, event_date, share_slug, created_at";

const ITEM_COLUMNS: &str = "id, wishlist_id, product_name, product_url, price, image_url, \
     held_by, held_by_email, held_until, is_fulfilled, created_at";

pub struct NewWishlist<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: &'a str,
    pub event_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct WishlistChanges<'a> {
    pub title: Option<&'a str>,
    /// `Some(None)` clears the event date.
    pub event_date: Option<Option<NaiveDate>>,
}

pub struct NewItem<'a> {
    pub id: Uuid,
    pub wishlist_id: Uuid,
    pub product_name: &'a str,
    pub product_url: &'a str,
    pub price: &'a str,
    pub image_url: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ItemChanges<'a> {
    pub product_name: Option<&'a str>,
    pub product_url: Option<&'a str>,
    pub price: Option<&'a str>,
    /// `Some(None)` removes the image.
    pub image_url: Option<Option<&'a str>>,
}

/// Result of a visitor's conditional hold.
#[derive(Debug)]
pub enum HoldOutcome {
    Held(Item),
    /// The item exists but is actively held or already fulfilled.
    Unavailable,
    NotFound,
}

/// A subscriber whose wishlist event is close enough to send a reminder.
#[derive(Debug)]
pub struct DueReminder {
    pub subscriber_id: Uuid,
    pub email: String,
    pub wishlist_title: String,
    pub share_token: String,
    pub event_date: NaiveDate,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        email: &str,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let inserted = self.with_conn_mut(|conn| {
            let result = conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), email, password_hash, format_timestamp(created_at)),
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })?;

        Ok(inserted.then(|| User {
            id,
            email: email.to_string(),
            created_at,
        }))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                email,
            )
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, email, password, created_at FROM users WHERE id = ?1",
                &id.to_string(),
            )
        })
    }

    pub fn update_user_password(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?2 WHERE id = ?1",
                (id.to_string(), password_hash),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Password resets --

    pub fn insert_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (token_hash, user_id.to_string(), format_timestamp(expires_at)),
            )?;
            Ok(())
        })
    }

    /// Deletes the reset token and returns its user if it had not expired.
    pub fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        self.with_conn_mut(|conn| {
            let found: Option<(String, String)> = conn
                .query_row(
                    "SELECT user_id, expires_at FROM password_resets WHERE token_hash = ?1",
                    [token_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((user_id, expires_at)) = found else {
                return Ok(None);
            };

            conn.execute("DELETE FROM password_resets WHERE token_hash = ?1", [token_hash])?;

            if expires_at <= format_timestamp(now) {
                return Ok(None);
            }
            Ok(Some(user_id.parse()?))
        })
    }

    // -- Wishlists --

    /// Inserts a wishlist, drawing a fresh share token on collision.
    pub fn create_wishlist(
        &self,
        new: &NewWishlist<'_>,
        mut share_token: impl FnMut() -> String,
    ) -> Result<Wishlist> {
        for _ in 0..SHARE_TOKEN_ATTEMPTS {
            let token = share_token();
            let inserted = self.with_conn_mut(|conn| {
                let result = conn.execute(
                    "INSERT INTO wishlists (id, user_id, title, event_date, share_slug, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        new.id.to_string(),
                        new.user_id.to_string(),
                        new.title,
                        new.event_date.map(format_date),
                        &token,
                        format_timestamp(new.created_at),
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })?;

            if inserted {
                return Ok(Wishlist {
                    id: new.id,
                    user_id: new.user_id,
                    title: new.title.to_string(),
                    created_at: new.created_at,
                    event_date: new.event_date,
                    share_token: token,
                });
            }
            warn!("Share token collision for wishlist {}, retrying", new.id);
        }
        bail!("Could not allocate a unique share token")
    }

    /// Newest first.
    pub fn list_wishlists(&self, user_id: Uuid) -> Result<Vec<Wishlist>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE user_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], wishlist_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Wishlist::try_from).collect()
        })
    }

    pub fn get_wishlist(&self, id: Uuid) -> Result<Option<Wishlist>> {
        self.with_conn(|conn| query_wishlist(conn, "id", &id.to_string()))
    }

    pub fn get_wishlist_by_share_token(&self, token: &str) -> Result<Option<Wishlist>> {
        self.with_conn(|conn| query_wishlist(conn, "share_slug", token))
    }

    pub fn update_wishlist(
        &self,
        id: Uuid,
        changes: &WishlistChanges<'_>,
    ) -> Result<Option<Wishlist>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE wishlists SET
                    title = COALESCE(?2, title),
                    event_date = CASE WHEN ?3 THEN ?4 ELSE event_date END
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    changes.title,
                    changes.event_date.is_some(),
                    changes.event_date.flatten().map(format_date),
                ],
            )?;
            query_wishlist(conn, "id", &id.to_string())
        })
    }

    /// Items and subscribers go with it (ON DELETE CASCADE).
    pub fn delete_wishlist(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM wishlists WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    // -- Items --

    pub fn insert_item(&self, new: &NewItem<'_>) -> Result<Item> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO items (id, wishlist_id, product_name, product_url, price, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    new.id.to_string(),
                    new.wishlist_id.to_string(),
                    new.product_name,
                    new.product_url,
                    new.price,
                    new.image_url,
                    format_timestamp(new.created_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(Item {
            id: new.id,
            wishlist_id: new.wishlist_id,
            product_name: new.product_name.to_string(),
            product_url: new.product_url.to_string(),
            price: new.price.to_string(),
            image_url: new.image_url.map(str::to_string),
            held_by: None,
            held_by_email: None,
            held_until: None,
            is_fulfilled: false,
            created_at: new.created_at,
        })
    }

    /// Every item of the wishlist, newest first, whatever its state.
    pub fn list_items(&self, wishlist_id: Uuid) -> Result<Vec<Item>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE wishlist_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([wishlist_id.to_string()], item_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Item::try_from).collect()
        })
    }

    pub fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        self.with_conn(|conn| query_item(conn, id))
    }

    /// The item together with the user id owning its wishlist.
    pub fn get_item_with_owner(&self, id: Uuid) -> Result<Option<(Item, Uuid)>> {
        self.with_conn(|conn| {
            let sql = "SELECT i.id, i.wishlist_id, i.product_name, i.product_url, i.price, i.image_url,
                    i.held_by, i.held_by_email, i.held_until, i.is_fulfilled, i.created_at, w.user_id
                 FROM items i
                 JOIN wishlists w ON w.id = i.wishlist_id
                 WHERE i.id = ?1";
            let found = conn
                .query_row(sql, [id.to_string()], |row| {
                    Ok((item_row(row)?, row.get::<_, String>(11)?))
                })
                .optional()?;

            match found {
                Some((row, owner)) => Ok(Some((Item::try_from(row)?, owner.parse()?))),
                None => Ok(None),
            }
        })
    }

    pub fn update_item(&self, id: Uuid, changes: &ItemChanges<'_>) -> Result<Option<Item>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE items SET
                    product_name = COALESCE(?2, product_name),
                    product_url = COALESCE(?3, product_url),
                    price = COALESCE(?4, price),
                    image_url = CASE WHEN ?5 THEN ?6 ELSE image_url END
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    changes.product_name,
                    changes.product_url,
                    changes.price,
                    changes.image_url.is_some(),
                    changes.image_url.flatten(),
                ],
            )?;
            query_item(conn, id)
        })
    }

    /// Places a hold only if the item is neither fulfilled nor actively held
    /// at `now`, so two racing visitors cannot both win.
    pub fn claim_hold(
        &self,
        item_id: Uuid,
        wishlist_id: Uuid,
        name: &str,
        email: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<HoldOutcome> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE items SET held_by = ?3, held_by_email = ?4, held_until = ?5
                 WHERE id = ?1 AND wishlist_id = ?2 AND is_fulfilled = 0
                   AND (held_until IS NULL OR held_until <= ?6)",
                rusqlite::params![
                    item_id.to_string(),
                    wishlist_id.to_string(),
                    name,
                    email,
                    format_timestamp(until),
                    format_timestamp(now),
                ],
            )?;

            match query_item(conn, item_id)? {
                Some(item) if item.wishlist_id == wishlist_id => {
                    if changed > 0 {
                        Ok(HoldOutcome::Held(item))
                    } else {
                        Ok(HoldOutcome::Unavailable)
                    }
                }
                _ => Ok(HoldOutcome::NotFound),
            }
        })
    }

    /// Clears holder name, email and expiry. The fulfilled flag is untouched.
    pub fn clear_hold(&self, id: Uuid) -> Result<Option<Item>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE items SET held_by = NULL, held_by_email = NULL, held_until = NULL
                 WHERE id = ?1",
                [id.to_string()],
            )?;
            query_item(conn, id)
        })
    }

    /// Sets the fulfilled flag. The bool is false when the item was already fulfilled.
    pub fn set_fulfilled(&self, id: Uuid) -> Result<Option<(Item, bool)>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE items SET is_fulfilled = 1 WHERE id = ?1 AND is_fulfilled = 0",
                [id.to_string()],
            )?;
            Ok(query_item(conn, id)?.map(|item| (item, changed > 0)))
        })
    }

    pub fn delete_item(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM items WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    // -- Images --

    pub fn record_image(&self, name: &str, user_id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO images (name, user_id, created_at) VALUES (?1, ?2, ?3)",
                (name, user_id.to_string(), format_timestamp(created_at)),
            )?;
            Ok(())
        })
    }

    /// Forgets an upload once no item points at `url` any more.
    ///
    /// Returns true only when `user_id` uploaded `name` and the record was
    /// removed, meaning the stored object can go too.
    pub fn release_image(&self, name: &str, url: &str, user_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let in_use: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM items WHERE image_url = ?1)",
                [url],
                |row| row.get(0),
            )?;
            if in_use {
                return Ok(false);
            }

            let changed = conn.execute(
                "DELETE FROM images WHERE name = ?1 AND user_id = ?2",
                (name, user_id.to_string()),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Event subscribers --

    /// Idempotent per (wishlist, email): a repeat returns the existing row.
    pub fn add_subscriber(
        &self,
        id: Uuid,
        wishlist_id: Uuid,
        email: &str,
        created_at: DateTime<Utc>,
    ) -> Result<EventSubscriber> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO event_subscribers (id, wishlist_id, email, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), wishlist_id.to_string(), email, format_timestamp(created_at)),
            )?;
            let row = conn.query_row(
                "SELECT id, wishlist_id, email, created_at, reminded_at
                 FROM event_subscribers WHERE wishlist_id = ?1 AND email = ?2",
                (wishlist_id.to_string(), email),
                subscriber_row,
            )?;
            EventSubscriber::try_from(row)
        })
    }

    pub fn list_subscribers(&self, wishlist_id: Uuid) -> Result<Vec<EventSubscriber>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, wishlist_id, email, created_at, reminded_at
                 FROM event_subscribers WHERE wishlist_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([wishlist_id.to_string()], subscriber_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(EventSubscriber::try_from).collect()
        })
    }

    /// Subscribers not yet reminded whose event falls in `today..=horizon`.
    pub fn due_reminders(&self, today: NaiveDate, horizon: NaiveDate) -> Result<Vec<DueReminder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.email, w.title, w.share_slug, w.event_date
                 FROM event_subscribers s
                 JOIN wishlists w ON w.id = s.wishlist_id
                 WHERE s.reminded_at IS NULL
                   AND w.event_date IS NOT NULL
                   AND w.event_date >= ?1
                   AND w.event_date <= ?2
                 ORDER BY w.event_date",
            )?;
            let rows = stmt
                .query_map((format_date(today), format_date(horizon)), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, email, wishlist_title, share_token, event_date)| -> Result<DueReminder> {
                    Ok(DueReminder {
                        subscriber_id: id.parse()?,
                        email,
                        wishlist_title,
                        share_token,
                        event_date: NaiveDate::parse_from_str(&event_date, "%Y-%m-%d")?,
                    })
                })
                .collect()
        })
    }

    pub fn mark_reminded(&self, subscriber_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE event_subscribers SET reminded_at = ?2 WHERE id = ?1",
                (subscriber_id.to_string(), format_timestamp(at)),
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(sql)?;

    let row = stmt
        .query_row([key], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_wishlist(conn: &Connection, column: &str, key: &str) -> Result<Option<Wishlist>> {
    let sql = format!("SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE {column} = ?1");
    conn.query_row(&sql, [key], wishlist_row)
        .optional()?
        .map(Wishlist::try_from)
        .transpose()
}

fn query_item(conn: &Connection, id: Uuid) -> Result<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], item_row)
        .optional()?
        .map(Item::try_from)
        .transpose()
}

fn wishlist_row(row: &Row<'_>) -> rusqlite::Result<WishlistRow> {
    Ok(WishlistRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        event_date: row.get(3)?,
        share_slug: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        wishlist_id: row.get(1)?,
        product_name: row.get(2)?,
        product_url: row.get(3)?,
        price: row.get(4)?,
        image_url: row.get(5)?,
        held_by: row.get(6)?,
        held_by_email: row.get(7)?,
        held_until: row.get(8)?,
        is_fulfilled: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn subscriber_row(row: &Row<'_>) -> rusqlite::Result<SubscriberRow> {
    Ok(SubscriberRow {
        id: row.get(0)?,
        wishlist_id: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
        reminded_at: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
