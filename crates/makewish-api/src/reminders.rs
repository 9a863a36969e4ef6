use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{info, warn};

use makewish_db::Database;

use crate::mail;
use crate::state::AppState;

/// Background task that mails event reminders.
///
/// On each tick, every subscriber of a wishlist whose event falls within
/// `lead_days` of today gets one simulated reminder, then is stamped so it is
/// never reminded again.
pub async fn run_reminder_loop(state: AppState, interval_secs: u64, lead_days: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let state = state.clone();
        let result = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            dispatch_due_reminders(&state.db, &state.public_url, now.date_naive(), lead_days, now)
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Reminders: sent {} event reminders", count);
                }
            }
            Ok(Err(e)) => warn!("Reminder error: {}", e),
            Err(e) => warn!("Reminder task failed: {}", e),
        }
    }
}

pub fn dispatch_due_reminders(
    db: &Database,
    public_url: &str,
    today: NaiveDate,
    lead_days: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let horizon = today
        .checked_add_days(Days::new(lead_days))
        .ok_or_else(|| anyhow::anyhow!("reminder horizon out of range"))?;

    let due = db.due_reminders(today, horizon)?;
    for reminder in &due {
        let share_url = format!(
            "{}/share/{}",
            public_url.trim_end_matches('/'),
            reminder.share_token
        );
        mail::deliver(&mail::event_reminder(
            &reminder.email,
            &reminder.wishlist_title,
            reminder.event_date,
            &share_url,
        ));
        db.mark_reminded(reminder.subscriber_id, now)?;
    }

    Ok(due.len())
}
