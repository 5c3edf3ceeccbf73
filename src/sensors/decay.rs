//! Decay monitor for remote sensors
//!
//! Remote sensors do not have to report when they go inactive. The monitor
//! sweeps the registry on a fixed interval and turns off every active sensor
//! whose last report is older than the decay window.

use super::registry::RemoteSensorRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

pub struct DecayMonitor {
    sensors: Arc<Mutex<RemoteSensorRegistry>>,
    interval: Duration,
}

/// Handle on a running decay monitor task
pub struct DecayMonitorHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DecayMonitor {
    /// Create a monitor sweeping every `interval`
    ///
    /// A zero interval selects half of the registry's decay window.
    pub fn new(sensors: Arc<Mutex<RemoteSensorRegistry>>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            sensors.lock().decay_window() / 2
        } else {
            interval
        };
        Self { sensors, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now, returns the raw ids that were deactivated
    pub fn sweep_once(&self) -> Vec<u16> {
        self.sensors.lock().expire(Instant::now())
    }

    pub fn spawn(self) -> DecayMonitorHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        DecayMonitorHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!("Remote sensor decay monitor started (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = self.sweep_once();
                    if expired.is_empty() {
                        trace!("Decay sweep: nothing expired");
                    } else {
                        debug!("Decay sweep deactivated {} sensor(s)", expired.len());
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("Remote sensor decay monitor stopped");
                    return;
                }
            }
        }
    }
}

impl DecayMonitorHandle {
    /// Stop the monitor and wait for its task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sensors(window: Duration) -> Arc<Mutex<RemoteSensorRegistry>> {
        Arc::new(Mutex::new(RemoteSensorRegistry::new(100, window)))
    }

    #[test]
    fn test_default_interval_is_half_window() {
        let monitor = DecayMonitor::new(make_sensors(Duration::from_secs(60)), Duration::ZERO);
        assert_eq!(monitor.interval(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_deactivates_silent_sensor() {
        let sensors = make_sensors(Duration::from_secs(10));
        sensors.lock().report(1, 1).unwrap();

        let handle = DecayMonitor::new(sensors.clone(), Duration::from_secs(1)).spawn();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(sensors.lock().get(1).unwrap().is_active());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(!sensors.lock().get(1).unwrap().is_active());
        assert_eq!(sensors.lock().len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_sensor_stays_active() {
        let sensors = make_sensors(Duration::from_secs(10));
        sensors.lock().report(2, 5).unwrap();

        let handle = DecayMonitor::new(sensors.clone(), Duration::from_secs(1)).spawn();

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(6)).await;
            sensors.lock().report(2, 5).unwrap();
        }
        assert!(sensors.lock().get(2).unwrap().is_active());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_once() {
        let sensors = make_sensors(Duration::from_secs(10));
        sensors.lock().report(3, 1).unwrap();
        let monitor = DecayMonitor::new(sensors.clone(), Duration::from_secs(5));

        assert!(monitor.sweep_once().is_empty());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(monitor.sweep_once(), vec![3]);
    }
}
