//! Commit counter family kept on an entity hash.
//!
//! Buckets roll over against the stored `commits_updated` timestamp (UTC): a new calendar day
//! resets `daily` and bumps `days`, a new ISO week number resets `weekly`, a new month number
//! resets `monthly`, and a new year resets `yearly` and then `weekly` and `monthly` again
//! whatever the week and month checks decided. Every bucket is then incremented atomically.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::mapper::{Decoder, Entity, EntityTypeBuilder, FieldDescriptor, MapperError, Value};

pub const COMMITS_TOTAL: &str = "commits_total";
pub const COMMITS_DAILY: &str = "commits_daily";
pub const COMMITS_WEEKLY: &str = "commits_weekly";
pub const COMMITS_MONTHLY: &str = "commits_monthly";
pub const COMMITS_YEARLY: &str = "commits_yearly";
pub const COMMITS_DAYS: &str = "commits_days";
pub const COMMITS_UPDATED: &str = "commits_updated";

const BUCKETS: [&str; 5] =
    [COMMITS_TOTAL, COMMITS_DAILY, COMMITS_WEEKLY, COMMITS_MONTHLY, COMMITS_YEARLY];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub total: i64,
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,
    pub yearly: i64,
    pub days: i64,
    pub updated: Option<DateTime<Utc>>,
}

/// Declares the counter family on an entity type.
pub fn with_commit_counters(builder: EntityTypeBuilder) -> EntityTypeBuilder {
    BUCKETS
        .into_iter()
        .chain([COMMITS_DAYS])
        .fold(builder, |builder, field| builder.field(field, FieldDescriptor::integer()))
        .field(COMMITS_UPDATED, FieldDescriptor::timestamp())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Rollover {
    day: bool,
    week: bool,
    month: bool,
    year: bool,
}

impl Rollover {
    fn between(previous: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            day: previous.date_naive() != now.date_naive(),
            week: previous.iso_week().week() != now.iso_week().week(),
            month: previous.month() != now.month(),
            year: previous.year() != now.year(),
        }
    }
}

async fn last_updated(entity: &Entity) -> Result<Option<DateTime<Utc>>, MapperError> {
    Ok(match entity.get(COMMITS_UPDATED).await? {
        Some(Value::Timestamp(at)) => Some(at),
        // Undeclared on this type: the coercion chain handed back text.
        Some(other) => Decoder::Timestamp.decode(&other.encode()).and_then(|v| v.as_timestamp()),
        None => None,
    })
}

pub async fn update_commits(
    entity: &Entity,
    count: i64,
    now: DateTime<Utc>,
) -> Result<(), MapperError> {
    match last_updated(entity).await? {
        None => {
            for field in BUCKETS {
                entity.set(field, 0_i64).await?;
            }
            entity.set(COMMITS_DAYS, 1_i64).await?;
            entity.set(COMMITS_UPDATED, now).await?;
        }
        Some(previous) => {
            let rollover = Rollover::between(previous, now);
            if rollover.day {
                entity.set(COMMITS_DAILY, 0_i64).await?;
                entity.increment_by(COMMITS_DAYS, 1).await?;
            }
            if rollover.week {
                entity.set(COMMITS_WEEKLY, 0_i64).await?;
            }
            if rollover.month {
                entity.set(COMMITS_MONTHLY, 0_i64).await?;
            }
            if rollover.year {
                entity.set(COMMITS_YEARLY, 0_i64).await?;
                entity.set(COMMITS_WEEKLY, 0_i64).await?;
                entity.set(COMMITS_MONTHLY, 0_i64).await?;
            }
        }
    }

    for field in BUCKETS {
        entity.increment_by(field, count).await?;
    }
    entity.set(COMMITS_UPDATED, now).await
}

pub async fn commit_stats(entity: &Entity) -> Result<CommitStats, MapperError> {
    let count = |value: Option<Value>| value.and_then(|value| value.as_i64()).unwrap_or(0);

    Ok(CommitStats {
        total: count(entity.get(COMMITS_TOTAL).await?),
        daily: count(entity.get(COMMITS_DAILY).await?),
        weekly: count(entity.get(COMMITS_WEEKLY).await?),
        monthly: count(entity.get(COMMITS_MONTHLY).await?),
        yearly: count(entity.get(COMMITS_YEARLY).await?),
        days: count(entity.get(COMMITS_DAYS).await?),
        updated: last_updated(entity).await?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{commit_stats, update_commits, with_commit_counters, CommitStats, Rollover};
    use crate::mapper::{Entity, EntityMapper, EntityType};
    use crate::store::{InMemoryFieldHashStore, StoreHandle};

    fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
    }

    async fn member(declared: bool) -> Entity {
        let store: StoreHandle = Arc::new(InMemoryFieldHashStore::new());
        let builder = EntityType::builder("Member").prefix("member:");
        let builder = if declared { with_commit_counters(builder) } else { builder };
        let mapper = EntityMapper::new(builder.build().expect("valid type"), store);
        mapper.load("dev").await.expect("load")
    }

    /// `[total, daily, weekly, monthly, yearly, days]`
    fn stats(counts: [i64; 6], updated: DateTime<Utc>) -> CommitStats {
        let [total, daily, weekly, monthly, yearly, days] = counts;
        CommitStats { total, daily, weekly, monthly, yearly, days, updated: Some(updated) }
    }

    #[tokio::test]
    async fn first_update_initialises_family_then_counts() {
        let entity = member(true).await;
        let now = at(2024, 3, 1, 9);

        assert_eq!(commit_stats(&entity).await.expect("empty stats"), CommitStats::default());

        update_commits(&entity, 1, now).await.expect("update");
        assert_eq!(commit_stats(&entity).await.expect("stats"), stats([1, 1, 1, 1, 1, 1], now));
    }

    #[tokio::test]
    async fn same_day_accumulates_without_new_day() {
        let entity = member(true).await;
        update_commits(&entity, 1, at(2024, 3, 1, 9)).await.expect("first");
        update_commits(&entity, 1, at(2024, 3, 1, 17)).await.expect("second");

        assert_eq!(
            commit_stats(&entity).await.expect("stats"),
            stats([2, 2, 2, 2, 2, 1], at(2024, 3, 1, 17))
        );
    }

    #[tokio::test]
    async fn eight_days_later_resets_daily_and_weekly() {
        let entity = member(true).await;
        let start = at(2024, 3, 1, 9);
        update_commits(&entity, 1, start).await.expect("first");
        update_commits(&entity, 1, start + Duration::hours(2)).await.expect("second");

        let later = start + Duration::days(8);
        update_commits(&entity, 1, later).await.expect("later");

        // same month and year, new ISO week
        assert_eq!(commit_stats(&entity).await.expect("stats"), stats([3, 1, 1, 3, 3, 2], later));
    }

    #[tokio::test]
    async fn month_boundary_inside_one_iso_week_keeps_weekly() {
        let entity = member(true).await;
        update_commits(&entity, 2, at(2024, 4, 30, 12)).await.expect("april");
        update_commits(&entity, 1, at(2024, 5, 1, 12)).await.expect("may");

        assert_eq!(
            commit_stats(&entity).await.expect("stats"),
            stats([3, 1, 3, 1, 3, 2], at(2024, 5, 1, 12))
        );
    }

    #[tokio::test]
    async fn year_boundary_resets_weekly_even_within_same_iso_week() {
        // 2024-12-31 and 2025-01-01 both fall in ISO week 1
        let previous = at(2024, 12, 31, 22);
        let now = at(2025, 1, 1, 8);
        assert_eq!(
            Rollover::between(previous, now),
            Rollover { day: true, week: false, month: true, year: true }
        );

        let entity = member(true).await;
        update_commits(&entity, 2, previous).await.expect("december");
        update_commits(&entity, 3, now).await.expect("january");

        assert_eq!(commit_stats(&entity).await.expect("stats"), stats([5, 3, 3, 3, 3, 2], now));
    }

    #[tokio::test]
    async fn counters_work_on_types_without_declarations() {
        let entity = member(false).await;
        let start = at(2024, 6, 10, 9);
        update_commits(&entity, 4, start).await.expect("first");
        update_commits(&entity, 1, start + Duration::days(1)).await.expect("next day");

        let stats = commit_stats(&entity).await.expect("stats");
        assert_eq!(stats.total, 5);
        assert_eq!(stats.daily, 1);
        assert_eq!(stats.days, 2);
        assert_eq!(stats.updated, Some(start + Duration::days(1)));
    }
}
