//! Call lifecycle event handling for live agent sessions.

use std::sync::Arc;

use call_agents_core::{CallEvent, MeetingId, MeetingStore, SessionHandle, StatusChange, meeting};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::registry::SessionRegistry;

/// Spawn the watcher task for a live session handle.
///
/// The watcher drives teardown when the call ends naturally. All teardown
/// paths are arbitrated through `SessionRegistry::take_active`: only the
/// path that takes the live handle performs the disconnect, so a concurrent
/// manual disconnect and a call-ended event cannot double-disconnect.
/// Failures inside the watcher are logged and never propagate past the task
/// boundary. The task is detached; it exits once teardown happens or the
/// event stream closes.
pub fn spawn_watcher<S>(
    meeting_id: MeetingId,
    handle: SessionHandle,
    registry: SessionRegistry,
    store: Arc<S>,
) where
    S: MeetingStore + 'static,
{
    let mut events = handle.subscribe();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(meeting_id = %meeting_id, skipped, "Lagged behind session events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                CallEvent::Error { message } => {
                    error!(meeting_id = %meeting_id, error = %message, "Realtime session error");
                    // The remote side is presumed broken: drop local state
                    // without attempting a remote disconnect.
                    registry.take_active(&meeting_id);
                    break;
                }
                CallEvent::CallEnded => {
                    info!(meeting_id = %meeting_id, "Call ended");
                    if let Some(handle) = registry.take_active(&meeting_id) {
                        if let Err(e) = handle.disconnect().await {
                            warn!(meeting_id = %meeting_id, error = %e, "Handle disconnect failed after call end");
                        }
                    }
                    break;
                }
                CallEvent::ParticipantLeft { participants } => {
                    let humans = participants.iter().filter(|p| p.is_human()).count();
                    if humans > 0 {
                        debug!(meeting_id = %meeting_id, humans, "Human participants remain");
                        continue;
                    }

                    info!(meeting_id = %meeting_id, "No human participants remaining, disconnecting");
                    if let Some(handle) = registry.take_active(&meeting_id) {
                        if let Err(e) = handle.disconnect().await {
                            warn!(meeting_id = %meeting_id, error = %e, "Handle disconnect failed on empty room");
                        }
                        let change = StatusChange::completed(meeting::now_epoch());
                        if let Err(e) = store.set_meeting_status(&meeting_id, change).await {
                            error!(meeting_id = %meeting_id, error = %e, "Failed to persist completed status");
                        }
                    }
                    break;
                }
            }
        }
    });
}
