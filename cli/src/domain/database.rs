//! Database cluster rules used while migrating a clustered database app.

use hangar_api_types::{DbSetting, ReplicationStat};

use crate::domain::error::ValidationError;

/// Settings that bound how many replicas can stream from the leader.
pub const REPLICATION_SETTINGS: [&str; 2] = ["max_wal_senders", "max_replication_slots"];

/// Replication capacity needed while old and new replicas coexist.
#[must_use]
pub fn required_replication_slots(units: usize) -> u32 {
    u32::try_from(units.saturating_mul(2).saturating_add(1)).unwrap_or(u32::MAX)
}

/// Check the leader's replication settings against the unit count.
///
/// # Errors
///
/// Returns [`ValidationError::DatabaseSettings`] when either setting is too
/// low or not a number.
pub fn check_replication_settings(settings: &[DbSetting], units: usize) -> Result<(), ValidationError> {
    let required = required_replication_slots(units);
    for setting in settings
        .iter()
        .filter(|s| REPLICATION_SETTINGS.contains(&s.name.as_str()))
    {
        let value: u32 = setting
            .setting
            .trim()
            .parse()
            .map_err(|_| ValidationError::DatabaseSettings { required })?;
        if value < required {
            return Err(ValidationError::DatabaseSettings { required });
        }
    }
    Ok(())
}

/// True when at least one replica among `db_uids` has caught up with the
/// leader.
#[must_use]
pub fn is_synced(stats: &[ReplicationStat], db_uids: &[String]) -> bool {
    stats.iter().any(|stat| {
        stat.diff == 0
            && stat
                .db_uid()
                .is_some_and(|uid| db_uids.iter().any(|d| d == uid))
    })
}
