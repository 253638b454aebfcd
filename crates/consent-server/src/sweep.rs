//! Periodic expiry sweep.

use std::{sync::Arc, time::Duration};

use consent_core::store::ConsentStore;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::Engine;

/// Run [`sweep_expired`](consent_core::ConsentEngine::sweep_expired) every
/// `interval_secs` seconds. Returns `None` when `interval_secs` is zero.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn<S>(engine: Arc<Engine<S>>, interval_secs: u64) -> Option<JoinHandle<()>>
where
  S: ConsentStore + 'static,
{
  if interval_secs == 0 {
    tracing::info!("background expiry sweep disabled");
    return None;
  }

  let period = Duration::from_secs(interval_secs);
  Some(tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let now = engine.now();
      match engine.sweep_expired(now).await {
        Ok(0) => tracing::trace!("expiry sweep found nothing"),
        Ok(count) => tracing::info!(count, "expiry sweep finished"),
        Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
      }
    }
  }))
}
