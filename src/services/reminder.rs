//! Periodic diary reminder dispatcher.
//!
//! Each tick reads the wall clock truncated to the minute plus the current
//! weekday, selects every user whose reminder settings match that slot, and
//! fans out pushes. Failures are counted, not retried. The loop must run in
//! exactly one process instance; there is no distributed lock.

use chrono::{DateTime, Utc, Weekday};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::notification::NotificationKind;
use crate::services::notifier;
use crate::AppState;

/// A user who already got a reminder within this window is skipped.
const DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Default, PartialEq)]
pub struct ReminderTally {
    pub matched: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Wall-clock slot for settings matching, truncated to the minute.
pub fn minute_slot(now: DateTime<Utc>) -> String {
    now.format("%H:%M").to_string()
}

/// Lowercase three-letter weekday key, matching stored reminder day arrays.
pub fn weekday_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

pub fn spawn_reminder_scheduler(state: AppState) {
    let tick_secs = state.config.reminder_tick_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
        // A missed tick should not fire a burst of catch-up queries.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_slot: Option<String> = None;
        loop {
            interval.tick().await;
            let now = Utc::now();

            // Duplicate-tick suppression: never process the same minute twice.
            let slot = minute_slot(now);
            if last_slot.as_deref() == Some(slot.as_str()) {
                continue;
            }
            last_slot = Some(slot);

            match process_tick(&state, now).await {
                Ok(tally) => {
                    if tally.matched > 0 {
                        tracing::info!(
                            matched = tally.matched,
                            sent = tally.sent,
                            skipped = tally.skipped,
                            failed = tally.failed,
                            "Diary reminder tick complete"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Diary reminder tick failed");
                }
            }
        }
    });
}

/// One reminder pass for the given instant.
pub async fn process_tick(state: &AppState, now: DateTime<Utc>) -> AppResult<ReminderTally> {
    use chrono::Datelike;

    let slot = minute_slot(now);
    let day = weekday_key(now.weekday());

    // NULL or empty day arrays mean "every day".
    let user_ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT u.id
        FROM users u
        JOIN notification_settings ns ON ns.user_id = u.id
        WHERE u.deleted_at IS NULL
          AND ns.push_enabled = true
          AND ns.diary_reminder_enabled = true
          AND ns.diary_reminder_time = $1
          AND (ns.diary_reminder_days IS NULL
               OR ns.diary_reminder_days = '[]'::jsonb
               OR ns.diary_reminder_days ? $2)
        "#,
    )
    .bind(&slot)
    .bind(day)
    .fetch_all(&state.db)
    .await?;

    let mut tally = ReminderTally {
        matched: user_ids.len(),
        ..ReminderTally::default()
    };

    for user_id in user_ids {
        match notifier::recently_sent(
            &state.db,
            user_id,
            NotificationKind::DiaryReminder,
            DEDUP_WINDOW_HOURS,
        )
        .await
        {
            Ok(true) => {
                tally.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                // When the dedup check itself fails, err on the quiet side.
                tracing::error!(user_id = %user_id, error = %e, "Reminder dedup check failed");
                tally.failed += 1;
                continue;
            }
        }

        match notifier::send_diary_reminder(state, user_id).await {
            Ok(report) if report.skipped => tally.skipped += 1,
            Ok(report) if report.success_count > 0 => tally.sent += 1,
            Ok(_) => tally.failed += 1,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Reminder send failed");
                tally.failed += 1;
            }
        }
    }

    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minute_slot_truncates_seconds() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 21, 0, 59).unwrap();
        assert_eq!(minute_slot(t), "21:00");

        let t = Utc.with_ymd_and_hms(2025, 6, 1, 9, 5, 0).unwrap();
        assert_eq!(minute_slot(t), "09:05");
    }

    #[test]
    fn test_weekday_keys() {
        assert_eq!(weekday_key(Weekday::Mon), "mon");
        assert_eq!(weekday_key(Weekday::Tue), "tue");
        assert_eq!(weekday_key(Weekday::Wed), "wed");
        assert_eq!(weekday_key(Weekday::Thu), "thu");
        assert_eq!(weekday_key(Weekday::Fri), "fri");
        assert_eq!(weekday_key(Weekday::Sat), "sat");
        assert_eq!(weekday_key(Weekday::Sun), "sun");
    }
}
