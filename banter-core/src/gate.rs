//! Per-channel refcounted "processing" signal.
//!
//! The platform's typing indicator is ephemeral: it has to be re-sent every
//! few seconds or the platform clears it. The gate keeps one refresh task per
//! channel alive for as long as at least one request is in flight, and
//! debounces the stop with a short grace period so back-to-back requests do
//! not flicker the indicator.
//!
//! All count/signal decisions happen behind one async lock because they are
//! check-then-act (start a new refresh loop vs. reuse the running one).

use async_trait::async_trait;
use banter_channels::ChannelId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Discord clears a typing ping after ~10s; re-send well inside that window.
pub const TYPING_REFRESH_INTERVAL: Duration = Duration::from_secs(8);

/// Delay between the last `exit` and actually stopping the signal.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// The external indicator the gate drives. Failures are best-effort UX and
/// are swallowed by the refresh loop.
#[async_trait]
pub trait TypingSignal: Send + Sync + 'static {
    async fn start_typing(&self, channel: &ChannelId) -> anyhow::Result<()>;
}

struct ChannelState {
    count: usize,
    stop: Option<CancellationToken>,
    last_keep_alive: Option<Instant>,
}

#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    signal: Arc<dyn TypingSignal>,
    channels: Mutex<HashMap<ChannelId, ChannelState>>,
}

impl ConcurrencyGate {
    pub fn new(signal: Arc<dyn TypingSignal>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                signal,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Increment the in-flight count, starting the refresh loop on 0 -> 1.
    /// The returned guard releases the entry on drop, so every `enter` is
    /// matched on all exit paths including panics.
    pub async fn enter(&self, channel: &ChannelId) -> TypingGuard {
        let mut channels = self.inner.channels.lock().await;
        let state = channels
            .entry(channel.clone())
            .or_insert_with(|| ChannelState {
                count: 0,
                stop: None,
                last_keep_alive: None,
            });
        state.count += 1;

        let loop_running = state.stop.as_ref().is_some_and(|t| !t.is_cancelled());
        if !loop_running {
            let token = CancellationToken::new();
            state.stop = Some(token.clone());
            self.spawn_refresh_loop(channel.clone(), token);
        }
        drop(channels);

        TypingGuard {
            gate: self.clone(),
            channel: channel.clone(),
            released: false,
        }
    }

    /// Decrement the in-flight count. At zero the stop is scheduled after the
    /// grace period rather than applied immediately.
    pub async fn exit(&self, channel: &ChannelId) {
        let mut channels = self.inner.channels.lock().await;
        let Some(state) = channels.get_mut(channel) else {
            return;
        };
        state.count = state.count.saturating_sub(1);
        if state.count == 0 {
            let gate = self.clone();
            let channel = channel.clone();
            tokio::spawn(async move {
                gate.delayed_stop(channel).await;
            });
        }
    }

    /// Stop the signal right now, bypassing the grace period. Used once a
    /// visible reply has been delivered, since posting a message clears the
    /// platform indicator anyway.
    pub async fn force_stop_now(&self, channel: &ChannelId) {
        let mut channels = self.inner.channels.lock().await;
        if let Some(state) = channels.remove(channel) {
            if let Some(token) = state.stop {
                token.cancel();
            }
        }
    }

    /// Reset the grace clock without touching the count. Called right before
    /// a send so a nearly-expired grace window cannot race the delivery.
    pub async fn keep_alive(&self, channel: &ChannelId) {
        let mut channels = self.inner.channels.lock().await;
        if let Some(state) = channels.get_mut(channel) {
            state.last_keep_alive = Some(Instant::now());
        }
    }

    /// Whether the signal is currently live for the channel.
    pub async fn is_active(&self, channel: &ChannelId) -> bool {
        let channels = self.inner.channels.lock().await;
        channels
            .get(channel)
            .and_then(|s| s.stop.as_ref())
            .is_some_and(|t| !t.is_cancelled())
    }

    async fn delayed_stop(&self, channel: ChannelId) {
        loop {
            tokio::time::sleep(STOP_GRACE_PERIOD).await;

            let mut channels = self.inner.channels.lock().await;
            let Some(state) = channels.get_mut(&channel) else {
                return;
            };
            // A new request entered during the grace window.
            if state.count != 0 {
                return;
            }
            // A keep-alive touch re-arms the window instead of stopping.
            if let Some(touched) = state.last_keep_alive {
                if touched.elapsed() < STOP_GRACE_PERIOD {
                    continue;
                }
            }
            if let Some(token) = state.stop.take() {
                token.cancel();
            }
            channels.remove(&channel);
            return;
        }
    }

    fn spawn_refresh_loop(&self, channel: ChannelId, token: CancellationToken) {
        let gate = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = gate.inner.signal.start_typing(&channel).await {
                    tracing::debug!(%e, %channel, "typing signal rejected; continuing");
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(TYPING_REFRESH_INTERVAL) => {}
                }
            }
        });
    }
}

/// Scoped hold on the gate. Call [`TypingGuard::release`] on the normal
/// path; dropping without releasing (early return, panic) still exits.
pub struct TypingGuard {
    gate: ConcurrencyGate,
    channel: ChannelId,
    released: bool,
}

impl TypingGuard {
    pub async fn release(mut self) {
        self.released = true;
        let gate = self.gate.clone();
        let channel = self.channel.clone();
        gate.exit(&channel).await;
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let gate = self.gate.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            gate.exit(&channel).await;
        });
    }
}
