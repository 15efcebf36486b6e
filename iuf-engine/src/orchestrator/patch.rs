//! Activity patches and the state transition guard.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Orchestrator;
use crate::errors::IufError;
use crate::events::event_types;
use crate::model::{
    empty_state_as_none, Activity, ActivityState, InputParameters, ManagedRolloutStrategy,
    SiteParameters,
};
use crate::store::Selector;

/// A sparse update of an activity. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPatch {
    /// Requested state. An empty string deserializes to `None`.
    #[serde(default, deserialize_with = "empty_state_as_none")]
    pub activity_state: Option<ActivityState>,
    /// Input parameter changes.
    #[serde(default)]
    pub input_parameters: Option<InputParametersPatch>,
    /// Replacement site parameters.
    #[serde(default)]
    pub site_parameters: Option<SiteParameters>,
}

impl ActivityPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a state change.
    #[must_use]
    pub fn with_state(mut self, state: ActivityState) -> Self {
        self.activity_state = Some(state);
        self
    }

    /// Sets input parameter changes.
    #[must_use]
    pub fn with_input_parameters(mut self, input: InputParametersPatch) -> Self {
        self.input_parameters = Some(input);
        self
    }

    /// Replaces the site parameters.
    #[must_use]
    pub fn with_site_parameters(mut self, site: SiteParameters) -> Self {
        self.site_parameters = Some(site);
        self
    }
}

/// Sparse input parameter changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParametersPatch {
    /// Media directory.
    pub media_dir: Option<String>,
    /// Media host.
    pub media_host: Option<String>,
    /// Managed-node bootprep file.
    pub bootprep_config_managed: Option<String>,
    /// Management-node bootprep file.
    pub bootprep_config_management: Option<String>,
    /// Management node limit.
    pub limit_management_nodes: Option<Vec<String>>,
    /// Managed node limit.
    pub limit_managed_nodes: Option<Vec<String>>,
    /// Managed rollout strategy.
    pub managed_rollout_strategy: Option<ManagedRolloutStrategy>,
    /// Management rollout percentage.
    pub concurrent_management_rollout_percentage: Option<i64>,
    /// Concurrency limit.
    pub concurrency: Option<i64>,
    /// Force flag.
    pub force: Option<bool>,
    /// Stage list. Validated against the catalog.
    pub stages: Option<Vec<String>>,
}

impl InputParametersPatch {
    /// Writes every present field into `target`.
    pub fn apply(self, target: &mut InputParameters) {
        if let Some(value) = self.media_dir {
            target.media_dir = value;
        }
        if let Some(value) = self.media_host {
            target.media_host = value;
        }
        if let Some(value) = self.bootprep_config_managed {
            target.bootprep_config_managed = value;
        }
        if let Some(value) = self.bootprep_config_management {
            target.bootprep_config_management = value;
        }
        if let Some(value) = self.limit_management_nodes {
            target.limit_management_nodes = value;
        }
        if let Some(value) = self.limit_managed_nodes {
            target.limit_managed_nodes = value;
        }
        if let Some(value) = self.managed_rollout_strategy {
            target.managed_rollout_strategy = value;
        }
        if let Some(value) = self.concurrent_management_rollout_percentage {
            target.concurrent_management_rollout_percentage = value;
        }
        if let Some(value) = self.concurrency {
            target.concurrency = value;
        }
        if let Some(value) = self.force {
            target.force = value;
        }
        if let Some(value) = self.stages {
            target.stages = value;
        }
    }
}

/// Checks an admin-requested state change.
///
/// | target | allowed from |
/// |---|---|
/// | `blocked` | anything but `in_progress` |
/// | `paused` | `in_progress` |
///
/// Every other target is reserved to the engine.
pub fn check_transition(from: ActivityState, to: ActivityState) -> Result<(), IufError> {
    let allowed = match to {
        ActivityState::Blocked => from != ActivityState::InProgress,
        ActivityState::Paused => from == ActivityState::InProgress,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(IufError::IllegalTransition { from, to })
    }
}

impl Orchestrator {
    /// Applies a patch to an activity.
    ///
    /// Non-completed sessions of the activity receive the resulting input
    /// and site parameters.
    pub async fn patch_activity(
        &self,
        name: &str,
        patch: ActivityPatch,
    ) -> Result<Activity, IufError> {
        let mut activity = self.get_activity(name).await?;
        let previous_state = activity.activity_state;

        if let Some(to) = patch.activity_state {
            check_transition(previous_state, to)?;
        }
        if let Some(stages) = patch
            .input_parameters
            .as_ref()
            .and_then(|input| input.stages.as_ref())
        {
            self.catalog.validate_stage_list(stages)?;
        }

        if let Some(to) = patch.activity_state {
            activity.activity_state = to;
        }
        if let Some(input) = patch.input_parameters {
            input.apply(&mut activity.input_parameters);
        }
        if let Some(site) = patch.site_parameters {
            activity.site_parameters = site;
        }

        let activity = self.stores.activities.update(activity).await?;
        let state_changed = activity.activity_state != previous_state;
        if state_changed {
            self.record_history(name, activity.activity_state, "", "").await?;
        }

        let synced = self.resync_sessions(&activity).await?;

        tracing::info!(
            activity = %activity.name,
            state = %activity.activity_state,
            state_changed,
            sessions = synced,
            "Patched activity"
        );
        self.events
            .emit(
                event_types::ACTIVITY_PATCHED,
                json!({
                    "activity": activity.name,
                    "state": activity.activity_state,
                    "previous_state": previous_state,
                }),
            )
            .await;
        Ok(activity)
    }

    async fn resync_sessions(&self, activity: &Activity) -> Result<usize, IufError> {
        let sessions = self
            .stores
            .sessions
            .list(&Selector::activity(&activity.name))
            .await?;

        let mut synced = 0;
        for mut session in sessions.into_iter().filter(|s| !s.is_completed()) {
            session.input_parameters = activity.input_parameters.clone();
            session.site_parameters = activity.site_parameters.clone();
            self.stores.sessions.update(session).await?;
            synced += 1;
        }
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_from_anything_but_in_progress() {
        for from in [
            ActivityState::WaitForAdmin,
            ActivityState::Paused,
            ActivityState::Debug,
            ActivityState::Blocked,
        ] {
            assert!(check_transition(from, ActivityState::Blocked).is_ok(), "{from}");
        }

        let err = check_transition(ActivityState::InProgress, ActivityState::Blocked).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("in_progress"));
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn test_paused_only_from_in_progress() {
        assert!(check_transition(ActivityState::InProgress, ActivityState::Paused).is_ok());
        assert!(check_transition(ActivityState::WaitForAdmin, ActivityState::Paused).is_err());
    }

    #[test]
    fn test_engine_owned_targets_rejected() {
        assert!(check_transition(ActivityState::Paused, ActivityState::InProgress).is_err());
        assert!(check_transition(ActivityState::Blocked, ActivityState::WaitForAdmin).is_err());
        assert!(check_transition(ActivityState::WaitForAdmin, ActivityState::Debug).is_err());
    }

    #[test]
    fn test_empty_state_is_no_change() {
        let patch: ActivityPatch = serde_json::from_str(r#"{"activity_state": ""}"#).unwrap();
        assert_eq!(patch.activity_state, None);

        let patch: ActivityPatch = serde_json::from_str(r#"{"activity_state": "blocked"}"#).unwrap();
        assert_eq!(patch.activity_state, Some(ActivityState::Blocked));

        assert!(serde_json::from_str::<ActivityPatch>(r#"{"activity_state": "bogus"}"#).is_err());
    }

    #[test]
    fn test_input_patch_applies_present_fields() {
        let mut input = InputParameters::with_stages(["process-media"]).with_media_dir("/old");
        InputParametersPatch {
            media_dir: Some("/new".to_string()),
            force: Some(true),
            ..InputParametersPatch::default()
        }
        .apply(&mut input);

        assert_eq!(input.media_dir, "/new");
        assert!(input.force);
        assert_eq!(input.stages, vec!["process-media"]);
    }
}
