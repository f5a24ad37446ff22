//! Host network configuration
//!
//! A [`NetworkManager`] either manages the robot-facing interface or stays
//! unmanaged. Unmanaged managers accept every request as a successful no-op;
//! any failure while managed switches that manager to unmanaged for good.

#[cfg(target_os = "linux")]
pub mod linux;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("No network interface selected")]
    NoInterface,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Dhcp,
    Static,
}

/// Desired addressing for the managed interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub team_number: u16,
    pub connection_type: ConnectionType,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    pub hostname: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            team_number: 0,
            connection_type: ConnectionType::Dhcp,
            ip: "10.0.0.11".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1".to_string(),
            hostname: "visioncam".to_string(),
        }
    }
}

/// One IPv4 address bound to an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.address, self.prefix_len)
    }
}

/// Operating-system network configuration
pub trait SysNetworking: Send {
    fn interfaces(&self) -> Result<Vec<InterfaceAddress>, NetworkError>;

    /// Target subsequent operations at `interface`
    fn select_interface(&mut self, interface: &InterfaceAddress);

    fn set_static(
        &mut self,
        ip: &str,
        netmask: &str,
        gateway: &str,
        broadcast: &str,
    ) -> Result<(), NetworkError>;

    fn set_dhcp(&mut self) -> Result<(), NetworkError>;

    fn set_hostname(&mut self, hostname: &str) -> Result<(), NetworkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedState {
    Managed,
    Unmanaged,
}

pub struct NetworkManager {
    state: ManagedState,
    networking: Option<Box<dyn SysNetworking>>,
    interface: Option<InterfaceAddress>,
}

impl NetworkManager {
    pub fn unmanaged() -> Self {
        Self {
            state: ManagedState::Unmanaged,
            networking: None,
            interface: None,
        }
    }

    /// Take over the interface whose address carries the team number, then
    /// apply `settings` to it.
    ///
    /// Anything that goes wrong leaves the manager unmanaged.
    pub fn initialize(
        manage: bool,
        networking: Option<Box<dyn SysNetworking>>,
        settings: &NetworkSettings,
    ) -> Self {
        if !manage {
            return Self::unmanaged();
        }
        let Some(mut networking) = networking else {
            log::warn!("Network management is not supported on this platform. Running unmanaged.");
            return Self::unmanaged();
        };

        let interfaces = networking.interfaces().unwrap_or_else(|e| {
            log::error!("Failed to list network interfaces: {}", e);
            Vec::new()
        });
        let Some(team_bytes) = team_ip_bytes(settings.team_number) else {
            log::error!(
                "Team number {} has no 10.TE.AM.x address. Staying unmanaged.",
                settings.team_number
            );
            return Self::unmanaged();
        };
        let Some(interface) = interfaces
            .into_iter()
            .find(|candidate| matches_team(candidate.address, team_bytes))
        else {
            log::error!("No valid network interfaces found! Staying unmanaged.");
            return Self::unmanaged();
        };

        log::info!("Managing network interface {}", interface);
        networking.select_interface(&interface);
        let mut manager = Self {
            state: ManagedState::Managed,
            networking: Some(networking),
            interface: Some(interface),
        };

        if !manager.apply(settings) {
            log::error!("Failed to load network settings. Staying unmanaged!");
        }
        manager
    }

    /// Initialize with the host's own networking implementation
    pub fn for_platform(manage: bool, settings: &NetworkSettings) -> Self {
        Self::initialize(manage, platform_networking(), settings)
    }

    pub fn state(&self) -> ManagedState {
        self.state
    }

    pub fn is_managed(&self) -> bool {
        self.state == ManagedState::Managed
    }

    pub fn interface(&self) -> Option<&InterfaceAddress> {
        self.interface.as_ref()
    }

    /// Apply addressing then hostname
    pub fn apply(&mut self, settings: &NetworkSettings) -> bool {
        if !self.is_managed() {
            return true;
        }

        let addressed = match settings.connection_type {
            ConnectionType::Static => match broadcast_for(&settings.ip) {
                Ok(broadcast) => self.configure_static(
                    &settings.ip,
                    &settings.netmask,
                    &settings.gateway,
                    &broadcast,
                ),
                Err(e) => self.fail("static configuration", e),
            },
            ConnectionType::Dhcp => self.configure_dhcp(),
        };

        addressed && self.set_hostname(&settings.hostname)
    }

    pub fn configure_static(
        &mut self,
        ip: &str,
        netmask: &str,
        gateway: &str,
        broadcast: &str,
    ) -> bool {
        self.run("static configuration", |net| {
            net.set_static(ip, netmask, gateway, broadcast)
        })
    }

    pub fn configure_dhcp(&mut self) -> bool {
        self.run("DHCP configuration", |net| net.set_dhcp())
    }

    pub fn set_hostname(&mut self, hostname: &str) -> bool {
        self.run("hostname change", |net| net.set_hostname(hostname))
    }

    fn run<F>(&mut self, what: &str, op: F) -> bool
    where
        F: FnOnce(&mut dyn SysNetworking) -> Result<(), NetworkError>,
    {
        if !self.is_managed() {
            return true;
        }
        let result = match self.networking.as_deref_mut() {
            Some(networking) => op(networking),
            None => Err(NetworkError::NoInterface),
        };
        match result {
            Ok(()) => {
                log::debug!("Network {} applied", what);
                true
            }
            Err(e) => self.fail(what, e),
        }
    }

    fn fail(&mut self, what: &str, error: NetworkError) -> bool {
        log::error!("Network {} failed, running unmanaged: {}", what, error);
        self.state = ManagedState::Unmanaged;
        false
    }
}

/// Second and third address octets derived from a team number.
///
/// `None` above 25599, where the leading digits no longer fit an octet.
pub fn team_ip_bytes(team_number: u16) -> Option<[u8; 2]> {
    let upper = u8::try_from(team_number / 100).ok()?;
    Some([upper, (team_number % 100) as u8])
}

fn matches_team(address: Ipv4Addr, team_bytes: [u8; 2]) -> bool {
    let octets = address.octets();
    octets[1] == team_bytes[0] && octets[2] == team_bytes[1]
}

/// Broadcast address of `ip`'s /24
pub fn broadcast_for(ip: &str) -> Result<String, NetworkError> {
    let address: Ipv4Addr = ip
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(ip.to_string()))?;
    let [a, b, c, _] = address.octets();
    Ok(Ipv4Addr::new(a, b, c, 255).to_string())
}

/// Prefix length of a dotted netmask
pub fn netmask_prefix(netmask: &str) -> Result<u8, NetworkError> {
    let mask: Ipv4Addr = netmask
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(netmask.to_string()))?;
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(NetworkError::InvalidAddress(netmask.to_string()));
    }
    Ok(bits.leading_ones() as u8)
}

/// The host's networking implementation, if this platform has one
pub fn platform_networking() -> Option<Box<dyn SysNetworking>> {
    #[cfg(target_os = "linux")]
    {
        Some(Box::new(linux::LinuxNetworking::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_ip_bytes() {
        assert_eq!(team_ip_bytes(1577), Some([15, 77]));
        assert_eq!(team_ip_bytes(254), Some([2, 54]));
        assert_eq!(team_ip_bytes(0), Some([0, 0]));
    }

    #[test]
    fn test_team_ip_bytes_out_of_octet_range() {
        assert_eq!(team_ip_bytes(25599), Some([255, 99]));
        assert_eq!(team_ip_bytes(25600), None);
        assert_eq!(team_ip_bytes(u16::MAX), None);
    }

    #[test]
    fn test_broadcast_for() {
        assert_eq!(broadcast_for("10.15.77.11").unwrap(), "10.15.77.255");
        assert!(broadcast_for("not-an-ip").is_err());
    }

    #[test]
    fn test_netmask_prefix() {
        assert_eq!(netmask_prefix("255.255.255.0").unwrap(), 24);
        assert_eq!(netmask_prefix("255.0.0.0").unwrap(), 8);
        assert_eq!(netmask_prefix("0.0.0.0").unwrap(), 0);
        assert!(netmask_prefix("255.0.255.0").is_err());
    }

    #[test]
    fn test_unmanaged_accepts_everything() {
        let mut manager = NetworkManager::unmanaged();
        assert!(manager.configure_dhcp());
        assert!(manager.configure_static("10.0.0.2", "255.0.0.0", "10.0.0.1", "10.0.0.255"));
        assert!(manager.set_hostname("robot"));
        assert_eq!(manager.state(), ManagedState::Unmanaged);
    }

    #[test]
    fn test_initialize_without_management() {
        let manager = NetworkManager::initialize(false, None, &NetworkSettings::default());
        assert!(!manager.is_managed());
        let manager = NetworkManager::initialize(true, None, &NetworkSettings::default());
        assert!(!manager.is_managed());
    }
}
