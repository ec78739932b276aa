//! Simulated access point.
//!
//! Stands in for the WiFi driver: `start` raises `ApStarted`, and stations
//! join and leave through an [`ApHandle`].

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use softap_core::{AccessPoint, ApConfig, ApEvent, MacAddr, NetError};

#[derive(Debug, Default)]
struct ApState {
    subscribers: Vec<Sender<ApEvent>>,
    config: Option<ApConfig>,
    running: bool,
    stations: Vec<(MacAddr, u16)>,
    next_aid: u16,
}

impl ApState {
    fn publish(&mut self, event: ApEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn lock(state: &Mutex<ApState>) -> MutexGuard<'_, ApState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Access point without a radio.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAccessPoint {
    state: Arc<Mutex<ApState>>,
}

impl SimulatedAccessPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for driving stations and stopping the access point.
    pub fn handle(&self) -> ApHandle {
        ApHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl AccessPoint for SimulatedAccessPoint {
    fn subscribe(&mut self) -> Result<Receiver<ApEvent>, NetError> {
        let (tx, rx) = mpsc::channel();
        lock(&self.state).subscribers.push(tx);
        Ok(rx)
    }

    fn configure(&mut self, config: &ApConfig) -> Result<(), NetError> {
        config.validate()?;
        let mut state = lock(&self.state);
        if state.running {
            return Err(NetError::Driver(
                "cannot reconfigure a running access point".to_string(),
            ));
        }
        state.config = Some(config.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), NetError> {
        let mut state = lock(&self.state);
        let ssid = match &state.config {
            Some(config) => config.ssid.clone(),
            None => return Err(NetError::Driver("access point not configured".to_string())),
        };
        if state.running {
            debug!("Access point {} already running", ssid);
            return Ok(());
        }

        state.running = true;
        info!("Simulated access point {} up", ssid);
        state.publish(ApEvent::ApStarted);
        Ok(())
    }
}

/// Controls a [`SimulatedAccessPoint`] from outside the bootstrap.
#[derive(Debug, Clone)]
pub struct ApHandle {
    state: Arc<Mutex<ApState>>,
}

impl ApHandle {
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn stations(&self) -> Vec<MacAddr> {
        lock(&self.state).stations.iter().map(|(mac, _)| *mac).collect()
    }

    /// Associate a station and return its association id.
    pub fn join(&self, mac: MacAddr) -> Result<u16, NetError> {
        let mut state = lock(&self.state);
        if !state.running {
            return Err(NetError::Driver("access point not running".to_string()));
        }
        if let Some((_, aid)) = state.stations.iter().find(|(m, _)| *m == mac) {
            return Ok(*aid);
        }
        let max = state.config.as_ref().map_or(0, |c| c.max_connections);
        if state.stations.len() >= usize::from(max) {
            warn!("Rejecting station {}: {} stations connected", mac, max);
            return Err(NetError::Driver(format!("station limit {} reached", max)));
        }

        state.next_aid += 1;
        let aid = state.next_aid;
        state.stations.push((mac, aid));
        state.publish(ApEvent::StationJoined { mac, aid });
        Ok(aid)
    }

    /// Disassociate a station. Returns false if it was not connected.
    pub fn leave(&self, mac: MacAddr) -> bool {
        let mut state = lock(&self.state);
        let Some(pos) = state.stations.iter().position(|(m, _)| *m == mac) else {
            return false;
        };
        let (mac, aid) = state.stations.remove(pos);
        state.publish(ApEvent::StationLeft { mac, aid });
        true
    }

    /// Stop the access point and close every event channel.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.running {
            state.running = false;
            let stations = std::mem::take(&mut state.stations);
            for (mac, aid) in stations {
                state.publish(ApEvent::StationLeft { mac, aid });
            }
            state.publish(ApEvent::ApStopped);
        }
        state.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use softap_core::AuthMode;

    fn configured(max_connections: u16) -> SimulatedAccessPoint {
        let mut ap = SimulatedAccessPoint::new();
        ap.configure(&ApConfig {
            max_connections,
            ..Default::default()
        })
        .unwrap();
        ap
    }

    #[test]
    fn test_start_publishes_ap_started() {
        let mut ap = configured(4);
        let events = ap.subscribe().unwrap();

        ap.start().unwrap();

        assert_eq!(events.try_recv().unwrap(), ApEvent::ApStarted);
        assert!(ap.handle().is_running());
    }

    #[test]
    fn test_start_requires_configuration() {
        let mut ap = SimulatedAccessPoint::new();
        assert!(matches!(ap.start(), Err(NetError::Driver(_))));
    }

    #[test]
    fn test_configure_rejects_invalid_config() {
        let mut ap = SimulatedAccessPoint::new();
        let config = ApConfig {
            auth: AuthMode::WpaPsk,
            password: "short".to_string(),
            ..Default::default()
        };
        assert!(matches!(ap.configure(&config), Err(NetError::InvalidConfig(_))));
    }

    #[test]
    fn test_station_limit() {
        let mut ap = configured(1);
        let events = ap.subscribe().unwrap();
        ap.start().unwrap();
        let handle = ap.handle();
        let first = MacAddr([1, 0, 0, 0, 0, 1]);
        let second = MacAddr([1, 0, 0, 0, 0, 2]);

        assert_eq!(handle.join(first).unwrap(), 1);
        assert!(handle.join(second).is_err());
        assert!(handle.leave(first));
        assert_eq!(handle.join(second).unwrap(), 2);

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ApEvent::ApStarted,
                ApEvent::StationJoined { mac: first, aid: 1 },
                ApEvent::StationLeft { mac: first, aid: 1 },
                ApEvent::StationJoined { mac: second, aid: 2 },
            ]
        );
    }

    #[test]
    fn test_stop_closes_channel() {
        let mut ap = configured(4);
        let events = ap.subscribe().unwrap();
        ap.start().unwrap();
        let handle = ap.handle();
        let mac = MacAddr([2; 6]);
        handle.join(mac).unwrap();

        handle.stop();

        let received: Vec<_> = events.iter().collect();
        assert_eq!(
            received,
            vec![
                ApEvent::ApStarted,
                ApEvent::StationJoined { mac, aid: 1 },
                ApEvent::StationLeft { mac, aid: 1 },
                ApEvent::ApStopped,
            ]
        );
        assert!(handle.stations().is_empty());
    }
}
