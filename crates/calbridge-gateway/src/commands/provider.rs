//! Provider operations: run one gateway call and render its envelope.

use std::path::Path;

use calbridge_core::SyncCursor;
use serde::Serialize;

use crate::cli::{CredentialArgs, Operation};
use crate::credentials_file;
use crate::envelope::Envelope;
use crate::error::GatewayResult;
use crate::gateway::Gateway;

/// What an operation produced: the rendered envelope and whether it succeeded.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub output: serde_json::Value,
}

pub async fn execute(gateway: &Gateway, operation: Operation) -> GatewayResult<Outcome> {
    match operation {
        Operation::AuthUrl => finish(gateway.get_auth_code(), None),
        Operation::AuthTokens {
            code,
            write_credentials,
        } => {
            let envelope = gateway.get_auth_tokens(&code).await;
            finish(envelope, write_credentials.as_deref())
        }
        Operation::CreateCalendar {
            credentials,
            name,
            description,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway.create_calendar(current, &name, &description).await;
            finish(envelope, credentials.save_target())
        }
        Operation::DeleteCalendar {
            credentials,
            calendar_id,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway.delete_calendar(current, &calendar_id).await;
            finish(envelope, credentials.save_target())
        }
        Operation::Sync {
            credentials,
            calendar_id,
            sync_token,
            local_time_zone,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway
                .sync_calendar(
                    current,
                    &calendar_id,
                    &SyncCursor::new(sync_token),
                    local_time_zone.as_deref(),
                )
                .await;
            finish(envelope, credentials.save_target())
        }
        Operation::CreateEvent {
            credentials,
            calendar_id,
            event,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway
                .create_event(current, &calendar_id, &event.to_draft())
                .await;
            finish(envelope, credentials.save_target())
        }
        Operation::UpdateEvent {
            credentials,
            calendar_id,
            event_id,
            concurrency_tag,
            event,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway
                .update_event(
                    current,
                    &calendar_id,
                    &event_id,
                    &concurrency_tag,
                    &event.to_draft(),
                )
                .await;
            finish(envelope, credentials.save_target())
        }
        Operation::DeleteEvent {
            credentials,
            calendar_id,
            event_id,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway.delete_event(current, &calendar_id, &event_id).await;
            finish(envelope, credentials.save_target())
        }
        Operation::EventTag {
            credentials,
            calendar_id,
            event_id,
        } => {
            let current = load(&credentials)?;
            let envelope = gateway.event_tag(current, &calendar_id, &event_id).await;
            finish(envelope, credentials.save_target())
        }
    }
}

fn load(args: &CredentialArgs) -> GatewayResult<calbridge_core::Credentials> {
    credentials_file::read(&args.credentials)
}

/// Persists returned credentials, then renders the envelope.
///
/// Credentials are written even for failed operations: a refresh may have
/// rotated them before the provider call failed.
fn finish<T: Serialize>(envelope: Envelope<T>, save_to: Option<&Path>) -> GatewayResult<Outcome> {
    if let Some(path) = save_to
        && let Some(ref credentials) = envelope.credentials
    {
        credentials_file::write(path, credentials)?;
    }
    Ok(Outcome {
        success: envelope.success,
        output: serde_json::to_value(&envelope)?,
    })
}
