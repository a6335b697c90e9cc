use tracing::{info, warn};
use welcomebot_core::ScheduledMessageSpec;

use crate::gateway::{GatewayError, MessagingGateway};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledDeletion {
    pub id: String,
    pub outcome: Result<(), GatewayError>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScheduleBootstrapReport {
    pub scheduled_ids: Vec<String>,
    pub deletions: Vec<ScheduledDeletion>,
}

impl ScheduleBootstrapReport {
    pub fn deleted_count(&self) -> usize {
        self.deletions.iter().filter(|deletion| deletion.outcome.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScheduledDeletion> {
        self.deletions.iter().filter(|deletion| deletion.outcome.is_err())
    }
}

/// Schedules each spec in order and returns the ids Slack assigned.
pub async fn schedule_messages(
    gateway: &dyn MessagingGateway,
    specs: &[ScheduledMessageSpec],
) -> Result<Vec<String>, GatewayError> {
    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = gateway.schedule_message(spec).await?;
        info!(
            event_name = "schedule.created",
            channel = %spec.channel_id,
            post_at = spec.post_at,
            scheduled_message_id = %id,
            "scheduled message"
        );
        ids.push(id);
    }
    Ok(ids)
}

/// Deletes every message pending in `channel`.
///
/// A failed listing aborts; a failed delete is recorded and the rest still run.
pub async fn clear_scheduled_messages(
    gateway: &dyn MessagingGateway,
    channel: &str,
) -> Result<Vec<ScheduledDeletion>, GatewayError> {
    let ids = gateway.list_scheduled_messages(channel).await?;
    let mut deletions = Vec::with_capacity(ids.len());

    for id in ids {
        let outcome = gateway.delete_scheduled_message(channel, &id).await;
        if let Err(error) = &outcome {
            warn!(
                event_name = "schedule.delete_failed",
                channel,
                scheduled_message_id = %id,
                error = %error,
                "could not delete scheduled message"
            );
        }
        deletions.push(ScheduledDeletion { id, outcome });
    }
    Ok(deletions)
}

/// Startup bootstrap: schedule `specs`, then clear everything pending in `channel`.
///
/// The clear runs after scheduling, so the messages just scheduled are
/// cancelled along with any left over from earlier runs.
pub async fn replace_scheduled_messages(
    gateway: &dyn MessagingGateway,
    specs: &[ScheduledMessageSpec],
    channel: &str,
) -> Result<ScheduleBootstrapReport, GatewayError> {
    let scheduled_ids = schedule_messages(gateway, specs).await?;
    let deletions = clear_scheduled_messages(gateway, channel).await?;
    Ok(ScheduleBootstrapReport { scheduled_ids, deletions })
}
