//! WiFi access point for ESP32.
//!
//! Runs `EspWifi` in access point mode. The driver is created on first use,
//! so `esp_wifi_init` runs during access point bring-up, after NVS and SPIFFS.
//! Driver notifications arrive on the system event loop; the subscription
//! forwards them as [`ApEvent`]s.

use std::sync::mpsc::{self, Receiver};

use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::sys::EspError;
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration, EspWifi, WifiEvent};
use log::{debug, info};

use softap_core::{AccessPoint, ApConfig, ApEvent, AuthMode, MacAddr, NetError};

fn driver_error(e: EspError) -> NetError {
    NetError::Driver(e.to_string())
}

fn auth_method(auth: AuthMode) -> AuthMethod {
    match auth {
        AuthMode::Open => AuthMethod::None,
        AuthMode::Wep => AuthMethod::WEP,
        AuthMode::WpaPsk => AuthMethod::WPA,
        AuthMode::Wpa2Psk => AuthMethod::WPA2Personal,
        AuthMode::WpaWpa2Psk => AuthMethod::WPAWPA2Personal,
        AuthMode::Wpa3Psk => AuthMethod::WPA3Personal,
        AuthMode::Wpa2Wpa3Psk => AuthMethod::WPA2WPA3Personal,
    }
}

fn ap_event(event: &WifiEvent<'_>) -> Option<ApEvent> {
    match event {
        WifiEvent::ApStarted => Some(ApEvent::ApStarted),
        WifiEvent::ApStopped => Some(ApEvent::ApStopped),
        WifiEvent::ApStaConnected(sta) => Some(ApEvent::StationJoined {
            mac: MacAddr(sta.mac()),
            aid: sta.aid(),
        }),
        WifiEvent::ApStaDisconnected(sta) => Some(ApEvent::StationLeft {
            mac: MacAddr(sta.mac()),
            aid: sta.aid(),
        }),
        _ => None,
    }
}

/// Soft access point on the ESP32 radio.
pub struct EspAccessPoint {
    modem: Option<Modem>,
    wifi: Option<Box<EspWifi<'static>>>,
    sysloop: EspSystemEventLoop,
    subscription: Option<EspSubscription<'static, System>>,
}

impl EspAccessPoint {
    /// Take the modem. No driver call is made until the access point is
    /// configured.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        Self {
            modem: Some(modem),
            wifi: None,
            sysloop,
            subscription: None,
        }
    }

    /// The WiFi driver, initialized on the first call. The driver keeps no
    /// state in NVS.
    fn driver(&mut self) -> Result<&mut EspWifi<'static>, NetError> {
        if self.wifi.is_none() {
            let modem = self
                .modem
                .take()
                .ok_or_else(|| NetError::Driver("modem already released".to_string()))?;
            let wifi = EspWifi::new(modem, self.sysloop.clone(), None).map_err(driver_error)?;
            info!("WiFi driver initialized");
            self.wifi = Some(Box::new(wifi));
        }
        self.wifi
            .as_deref_mut()
            .ok_or_else(|| NetError::Driver("WiFi driver unavailable".to_string()))
    }
}

impl AccessPoint for EspAccessPoint {
    fn subscribe(&mut self) -> Result<Receiver<ApEvent>, NetError> {
        let (tx, rx) = mpsc::channel();
        let subscription = self
            .sysloop
            .subscribe::<WifiEvent, _>(move |event| {
                if let Some(event) = ap_event(&event) {
                    // Receiver gone means nobody is serving anymore
                    let _ = tx.send(event);
                }
            })
            .map_err(driver_error)?;
        self.subscription = Some(subscription);
        Ok(rx)
    }

    fn configure(&mut self, config: &ApConfig) -> Result<(), NetError> {
        let mut ap = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| NetError::InvalidConfig("ssid too long".to_string()))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| NetError::InvalidConfig("password too long".to_string()))?,
            auth_method: auth_method(config.auth),
            ssid_hidden: config.ssid_hidden,
            max_connections: config.max_connections,
            ..Default::default()
        };
        if config.channel != 0 {
            ap.channel = config.channel;
        }
        debug!(
            "Beacon interval {} TU is left to the driver default",
            config.beacon_interval
        );

        self.driver()?
            .set_configuration(&Configuration::AccessPoint(ap))
            .map_err(driver_error)
    }

    fn start(&mut self) -> Result<(), NetError> {
        self.driver()?.start().map_err(driver_error)?;
        info!("WiFi driver started in access point mode");
        Ok(())
    }
}
