//! Tokio driver for hosts without their own update loop

use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::activity::{ActivityDetector, PresenceContext};
use crate::controller::PresenceController;
use crate::native::NativeRpc;

/// Shared handle the driver ticks
pub type SharedController<N, D, C> = Arc<Mutex<PresenceController<N, D, C>>>;

/// Run one tick unless another caller is mid-tick
///
/// Returns `false` when the tick was skipped.
pub fn try_tick<N, D, C>(controller: &Mutex<PresenceController<N, D, C>>) -> bool
where
    N: NativeRpc,
    D: ActivityDetector,
    C: PresenceContext,
{
    match controller.try_lock() {
        Ok(mut controller) => {
            controller.tick();
            true
        }
        Err(TryLockError::Poisoned(poisoned)) => {
            poisoned.into_inner().tick();
            true
        }
        Err(TryLockError::WouldBlock) => {
            log::debug!(target: "editor_presence", "Controller busy, skipping tick");
            false
        }
    }
}

/// Tick `controller` every `period` on the current tokio runtime
///
/// Each tick runs on the blocking pool since connecting may wait on the
/// local socket. Abort the returned handle to stop; shutting the controller
/// down is left to the caller.
pub fn spawn_tokio_driver<N, D, C>(
    controller: SharedController<N, D, C>,
    period: Duration,
) -> JoinHandle<()>
where
    N: NativeRpc + 'static,
    D: ActivityDetector + 'static,
    C: PresenceContext + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let controller = Arc::clone(&controller);
            if let Err(err) = tokio::task::spawn_blocking(move || try_tick(&controller)).await {
                log::error!(target: "editor_presence", "Presence tick task failed: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ManualDetector;
    use crate::config::RpcConfig;
    use crate::native::LoopbackRpc;
    use crate::settings::PresenceSettings;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn driver_ticks_controller() {
        let (native, handle) = LoopbackRpc::new();
        let controller = PresenceController::new(
            native,
            ManualDetector::default(),
            PresenceSettings::default(),
            RpcConfig::default(),
        )
        .unwrap();
        let shared = Arc::new(Mutex::new(controller));

        let driver = spawn_tokio_driver(Arc::clone(&shared), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;
        driver.abort();

        assert_eq!(handle.initialize_count(), 1);
        assert!(handle.update_count() >= 1);
        assert!(shared.lock().unwrap().is_initialized());
    }

    #[test]
    fn busy_controller_skips_tick() {
        let (native, handle) = LoopbackRpc::new();
        let controller = PresenceController::new(
            native,
            ManualDetector::default(),
            PresenceSettings::default(),
            RpcConfig::default(),
        )
        .unwrap();
        let shared = Mutex::new(controller);

        let guard = shared.lock().unwrap();
        assert!(!try_tick(&shared));
        drop(guard);
        assert!(handle.calls().is_empty());

        assert!(try_tick(&shared));
        assert_eq!(handle.initialize_count(), 1);
    }
}
