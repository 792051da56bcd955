// crates/bridge/src/conditions.rs
//! Gate deciding whether a sync may run right now.

use crate::account::AccountContext;

/// Precondition check run before any job is enqueued.
pub trait SyncConditions: Send + Sync {
    fn conditions_met(&self, ctx: &AccountContext) -> bool;
}

/// Never blocks a sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysMet;

impl SyncConditions for AlwaysMet {
    fn conditions_met(&self, _ctx: &AccountContext) -> bool {
        true
    }
}

/// Current network as seen by the device.
pub trait NetworkProbe: Send + Sync {
    fn on_wifi(&self) -> bool;
    /// SSID of the current Wi-Fi network, if it can be determined.
    fn current_ssid(&self) -> Option<String>;
}

/// Probe with fixed answers.
#[derive(Debug, Clone, Default)]
pub struct StaticNetwork {
    pub wifi: bool,
    pub ssid: Option<String>,
}

impl NetworkProbe for StaticNetwork {
    fn on_wifi(&self) -> bool {
        self.wifi
    }

    fn current_ssid(&self) -> Option<String> {
        self.ssid.clone()
    }
}

/// Applies an account's Wi-Fi restrictions.
///
/// Accounts without `wifi_only` always pass. With `wifi_only`, the device
/// must be on Wi-Fi, and if SSIDs are listed the current SSID must be one
/// of them. An unknown SSID does not match.
pub struct WifiConditions<P> {
    probe: P,
}

impl<P: NetworkProbe> WifiConditions<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: NetworkProbe> SyncConditions for WifiConditions<P> {
    fn conditions_met(&self, ctx: &AccountContext) -> bool {
        let settings = &ctx.settings;
        if !settings.wifi_only {
            return true;
        }
        if !self.probe.on_wifi() {
            tracing::info!(account = %ctx.account, "Not on Wi-Fi, sync restricted to Wi-Fi");
            return false;
        }
        if settings.allowed_ssids.is_empty() {
            return true;
        }
        match self.probe.current_ssid() {
            Some(ssid) if settings.allowed_ssids.iter().any(|allowed| *allowed == ssid) => true,
            Some(ssid) => {
                tracing::info!(account = %ctx.account, %ssid, "Connected SSID is not in the allowed list");
                false
            }
            None => {
                tracing::warn!(account = %ctx.account, "Cannot determine SSID, sync restricted to specific networks");
                false
            }
        }
    }
}
