//! Reaction-driven follow-ups on delivered responses.
//!
//! 🗑️ deletes a tracked response and trims its scope's history so the model
//! never sees the deleted turn again. 🔄 regenerates: same trim, then a
//! fresh detached generation re-tracked under the new message ids. Both are
//! gated to the user whose message produced the response.

use crate::retry_ui::{DELETE_EMOJI, REGENERATE_EMOJI};
use crate::runtime::{friendly_error, BotRuntime};
use anyhow::Result;
use banter_channels::{InboundEvent, OutboundMessage};
use banter_core::TrackedResponse;
use std::sync::Arc;

pub async fn handle_reaction(
    runtime: &Arc<BotRuntime>,
    event: InboundEvent,
    emoji: &str,
) -> Result<()> {
    if emoji != DELETE_EMOJI && emoji != REGENERATE_EMOJI {
        return Ok(());
    }
    let Some(record) = runtime.registry.lookup(&event.message_id) else {
        return Ok(());
    };

    if event.sender_id != record.author_id {
        if let Err(e) = runtime
            .platform
            .remove_reaction(&event.channel_id, &event.message_id, emoji, Some(&event.sender_id))
            .await
        {
            tracing::debug!(%e, "stray reaction removal failed");
        }
        runtime
            .transient_notice(
                &event.channel_id,
                "Only the person I replied to can do that.",
            )
            .await;
        return Ok(());
    }

    if emoji == DELETE_EMOJI {
        delete_response(runtime, &record).await
    } else {
        regenerate_response(runtime, &record).await
    }
}

async fn delete_response(runtime: &Arc<BotRuntime>, record: &TrackedResponse) -> Result<()> {
    for id in &record.message_ids {
        if let Err(e) = runtime.platform.delete_message(&record.channel_id, id).await {
            tracing::warn!(%e, message = %id, "tracked message delete failed");
        }
    }
    if let Some(primary) = record.message_ids.first() {
        runtime.registry.remove(primary);
    }
    runtime.sessions.remove_last_model_entry(&record.scope);
    tracing::info!(scope = record.scope.describe(), "response deleted on request");
    Ok(())
}

async fn regenerate_response(runtime: &Arc<BotRuntime>, record: &TrackedResponse) -> Result<()> {
    let guard = runtime.gate.enter(&record.channel_id).await;

    // Drop the rejected answer before rebuilding the request, so the model
    // does not echo it back.
    runtime.sessions.remove_last_model_entry(&record.scope);
    let contents = runtime.regeneration_contents(record).await;
    let settings = runtime.sessions.settings(&record.scope);

    let result = runtime.generate_text_detached(&settings, contents).await;
    match result {
        Ok(text) => {
            for id in &record.message_ids {
                if let Err(e) = runtime.platform.delete_message(&record.channel_id, id).await {
                    tracing::warn!(%e, message = %id, "stale message delete failed");
                }
            }
            if let Some(primary) = record.message_ids.first() {
                runtime.registry.remove(primary);
            }
            runtime
                .sessions
                .append_history(&record.scope, banter_llm::Content::model_text(&text));

            // Re-track under the fresh message id, preserving the original
            // author and scope. No reply reference: the message the old
            // response replied to may itself be long gone.
            runtime
                .deliver_and_track(
                    &record.channel_id,
                    &record.scope,
                    &record.author_id,
                    &record.prompt,
                    None,
                    text,
                    None,
                )
                .await?;
            guard.release().await;
        }
        Err(e) => {
            guard.release().await;
            runtime.gate.force_stop_now(&record.channel_id).await;
            let notice = OutboundMessage::text(friendly_error(&e));
            runtime
                .platform
                .send_message(&record.channel_id, notice)
                .await?;
        }
    }
    Ok(())
}
