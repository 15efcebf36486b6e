//! Activity history.

use super::{not_found_as, Orchestrator};
use crate::errors::IufError;
use crate::model::{history_name, ActivityState, History};
use crate::store::Selector;
use crate::utils::epoch_millis;

/// Attempts at finding a free `start_time` for a new entry.
const MAX_NAME_ATTEMPTS: usize = 16;

impl Orchestrator {
    /// Lists an activity's history, oldest first.
    pub async fn list_history(&self, activity: &str) -> Result<Vec<History>, IufError> {
        self.get_activity(activity).await?;
        let mut entries = self.stores.history.list(&Selector::activity(activity)).await?;
        entries.sort_by_key(|entry| entry.start_time);
        Ok(entries)
    }

    /// Records an admin action against the activity's current state.
    pub async fn add_history_entry(
        &self,
        activity: &str,
        session_name: &str,
        comment: &str,
    ) -> Result<History, IufError> {
        let record = self.get_activity(activity).await?;
        self.record_history(activity, record.activity_state, session_name, comment)
            .await
    }

    /// Replaces the comment of a history entry.
    pub async fn update_history_comment(
        &self,
        activity: &str,
        start_time: i64,
        comment: &str,
    ) -> Result<History, IufError> {
        let name = history_name(activity, start_time);
        let mut entry = self
            .stores
            .history
            .get(&name)
            .await
            .map_err(|e| not_found_as::<History>(e, &name))?;
        entry.comment = comment.to_string();
        Ok(self.stores.history.update(entry).await?)
    }

    /// Appends a history entry stamped with the current time.
    ///
    /// Entries are keyed by `start_time`, so a collision moves the entry one
    /// millisecond later.
    pub(super) async fn record_history(
        &self,
        activity: &str,
        state: ActivityState,
        session_name: &str,
        comment: &str,
    ) -> Result<History, IufError> {
        let mut entry = History::new(activity, state, epoch_millis())
            .with_session(session_name)
            .with_comment(comment);

        let mut attempt = 1;
        loop {
            match self.stores.history.create(entry.clone()).await {
                Ok(created) => return Ok(created),
                Err(err) if err.is_conflict() && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    entry.start_time += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Moves the activity from `from` to `to` if it is currently in `from`,
    /// recording the change in history.
    pub(super) async fn sync_activity_state(
        &self,
        activity: &str,
        session_name: &str,
        from: ActivityState,
        to: ActivityState,
    ) -> Result<(), IufError> {
        let mut record = self.get_activity(activity).await?;
        if record.activity_state != from {
            tracing::debug!(
                activity,
                state = %record.activity_state,
                "Leaving activity state unchanged"
            );
            return Ok(());
        }

        record.activity_state = to;
        self.stores.activities.update(record).await?;
        self.record_history(activity, to, session_name, "").await?;

        tracing::info!(activity, session = session_name, from = %from, to = %to, "Activity state changed");
        Ok(())
    }
}
