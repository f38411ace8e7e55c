//! Operator configuration
//!
//! One struct per operator, all deserializable from TOML with every field
//! optional. Configs are plain values: operators receive the current one on
//! every pull/send and react to changes (rebinding, re-joining groups) there.

use serde::{Deserialize, Serialize};
use stagelink_core::psn::TrackerName;
use stagelink_core::{Protocol, ARTNET_PORT, PSN_MULTICAST_GROUP, PSN_PORT, SACN_PORT};
use stagelink_transport::{parse_ipv4, parse_local_ip, ANY_ADDRESS};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// sACN data-loss timeout from E1.31
const DEFAULT_TIMEOUT_SECS: f64 = 2.5;

fn default_local_ip() -> String {
    ANY_ADDRESS.to_string()
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_artnet_port() -> u16 {
    ARTNET_PORT
}

fn default_sacn_port() -> u16 {
    SACN_PORT
}

fn default_psn_port() -> u16 {
    PSN_PORT
}

fn default_count() -> u32 {
    1
}

fn default_sacn_universe() -> u32 {
    1
}

fn default_dmx_fps() -> f64 {
    44.0
}

fn default_true() -> bool {
    true
}

fn default_psn_group() -> String {
    PSN_MULTICAST_GROUP.to_string()
}

fn default_system_name() -> String {
    "StageLink".to_string()
}

// ============================================================================
// Inputs
// ============================================================================

/// Art-Net receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtNetInputConfig {
    /// Local interface address, or "any"
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default = "default_artnet_port")]
    pub port: u16,
    #[serde(default)]
    pub start_universe: u32,
    #[serde(default = "default_count")]
    pub universe_count: u32,
    /// Seconds without packets before a universe reads as zero; <= 0 disables
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

impl Default for ArtNetInputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            port: ARTNET_PORT,
            start_universe: 0,
            universe_count: 1,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ArtNetInputConfig {
    pub fn bind_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;
        check_range(Protocol::ArtNet, self.start_universe, self.universe_count)?;
        check_seconds("timeout_secs", self.timeout_secs)
    }
}

/// sACN receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacnInputConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default = "default_sacn_port")]
    pub port: u16,
    #[serde(default = "default_sacn_universe")]
    pub start_universe: u32,
    #[serde(default = "default_count")]
    pub universe_count: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
    /// Join the per-universe multicast groups (otherwise unicast only)
    #[serde(default = "default_true")]
    pub multicast: bool,
}

impl Default for SacnInputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            port: SACN_PORT,
            start_universe: 1,
            universe_count: 1,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            multicast: true,
        }
    }
}

impl SacnInputConfig {
    pub fn bind_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;
        check_range(Protocol::Sacn, self.start_universe, self.universe_count)?;
        check_seconds("timeout_secs", self.timeout_secs)
    }
}

/// PSN receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsnInputConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default = "default_psn_port")]
    pub port: u16,
    /// Multicast group to join; empty for unicast only
    #[serde(default = "default_psn_group")]
    pub multicast_group: String,
    #[serde(default)]
    pub start_tracker: u32,
    #[serde(default = "default_tracker_count")]
    pub tracker_count: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

fn default_tracker_count() -> u32 {
    16
}

impl Default for PsnInputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            port: PSN_PORT,
            multicast_group: default_psn_group(),
            start_tracker: 0,
            tracker_count: default_tracker_count(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PsnInputConfig {
    pub fn bind_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, self.port)
    }

    pub fn group(&self) -> ConfigResult<Option<Ipv4Addr>> {
        if self.multicast_group.trim().is_empty() {
            return Ok(None);
        }
        let group = ip("multicast_group", &self.multicast_group)?;
        if !group.is_multicast() {
            return Err(ConfigError::InvalidAddress {
                field: "multicast_group",
                value: self.multicast_group.clone(),
            });
        }
        Ok(Some(group))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;
        self.group()?;
        check_range(Protocol::Psn, self.start_tracker, self.tracker_count)?;
        check_seconds("timeout_secs", self.timeout_secs)
    }
}

/// sACN universe discovery listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacnDiscoveryConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default = "default_sacn_port")]
    pub port: u16,
    /// Forget sources that stop announcing; E1.31 sources announce every 10 s
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: f64,
}

fn default_discovery_timeout() -> f64 {
    25.0
}

impl Default for SacnDiscoveryConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            port: SACN_PORT,
            timeout_secs: default_discovery_timeout(),
        }
    }
}

impl SacnDiscoveryConfig {
    pub fn bind_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.bind_addr()?;
        check_seconds("timeout_secs", self.timeout_secs)
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Art-Net sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtNetOutputConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    /// Node address or broadcast address
    #[serde(default = "default_artnet_target")]
    pub target_ip: String,
    #[serde(default = "default_artnet_port")]
    pub port: u16,
    #[serde(default)]
    pub start_universe: u32,
    /// Frames per second; <= 0 sends on every call
    #[serde(default = "default_dmx_fps")]
    pub max_fps: f64,
    /// Allow sending to broadcast addresses
    #[serde(default = "default_true")]
    pub broadcast: bool,
}

fn default_artnet_target() -> String {
    "255.255.255.255".to_string()
}

impl Default for ArtNetOutputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            target_ip: default_artnet_target(),
            port: ARTNET_PORT,
            start_universe: 0,
            max_fps: default_dmx_fps(),
            broadcast: true,
        }
    }
}

impl ArtNetOutputConfig {
    pub fn local_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, 0)
    }

    pub fn target(&self) -> ConfigResult<SocketAddrV4> {
        target_addr("target_ip", &self.target_ip, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.local_addr()?;
        self.target()?;
        check_range(Protocol::ArtNet, self.start_universe, 1)?;
        check_finite("max_fps", self.max_fps)
    }
}

/// sACN sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacnOutputConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    /// Unicast destination, used when `multicast` is off
    #[serde(default = "default_unicast_target")]
    pub target_ip: String,
    #[serde(default = "default_sacn_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub multicast: bool,
    #[serde(default = "default_sacn_universe")]
    pub start_universe: u32,
    #[serde(default = "default_dmx_fps")]
    pub max_fps: f64,
    #[serde(default = "default_system_name")]
    pub source_name: String,
    /// 0-200
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Send a synchronization packet after each frame
    #[serde(default)]
    pub sync_enabled: bool,
    #[serde(default = "default_sync_universe")]
    pub sync_universe: u32,
    /// Announce our universes every 10 s
    #[serde(default = "default_true")]
    pub discovery: bool,
    #[serde(default)]
    pub preview: bool,
}

fn default_unicast_target() -> String {
    Ipv4Addr::LOCALHOST.to_string()
}

fn default_priority() -> u8 {
    stagelink_core::sacn::DEFAULT_PRIORITY
}

fn default_sync_universe() -> u32 {
    63999
}

impl Default for SacnOutputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            target_ip: default_unicast_target(),
            port: SACN_PORT,
            multicast: true,
            start_universe: 1,
            max_fps: default_dmx_fps(),
            source_name: default_system_name(),
            priority: default_priority(),
            sync_enabled: false,
            sync_universe: default_sync_universe(),
            discovery: true,
            preview: false,
        }
    }
}

impl SacnOutputConfig {
    pub fn local_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, 0)
    }

    /// Unicast target; only meaningful with `multicast` off
    pub fn unicast_target(&self) -> ConfigResult<SocketAddrV4> {
        target_addr("target_ip", &self.target_ip, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.local_addr()?;
        if self.multicast {
            check_port("port", self.port)?;
        } else {
            self.unicast_target()?;
        }
        check_range(Protocol::Sacn, self.start_universe, 1)?;
        if self.sync_enabled {
            check_range(Protocol::Sacn, self.sync_universe, 1)?;
        }
        if self.priority > 200 {
            return Err(ConfigError::OutOfRange {
                field: "priority",
                value: self.priority as i64,
            });
        }
        check_finite("max_fps", self.max_fps)
    }
}

/// PSN sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsnOutputConfig {
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    /// Multicast group or unicast receiver
    #[serde(default = "default_psn_group")]
    pub target_ip: String,
    #[serde(default = "default_psn_port")]
    pub port: u16,
    #[serde(default)]
    pub start_tracker: u32,
    #[serde(default = "default_psn_fps")]
    pub max_fps: f64,
    #[serde(default = "default_system_name")]
    pub system_name: String,
    /// Names by position in the tracker list; missing entries get "Tracker <id>"
    #[serde(default)]
    pub tracker_names: Vec<String>,
    #[serde(default = "default_info_interval")]
    pub info_interval_secs: f64,
}

fn default_psn_fps() -> f64 {
    60.0
}

fn default_info_interval() -> f64 {
    1.0
}

impl Default for PsnOutputConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            target_ip: default_psn_group(),
            port: PSN_PORT,
            start_tracker: 0,
            max_fps: default_psn_fps(),
            system_name: default_system_name(),
            tracker_names: Vec::new(),
            info_interval_secs: default_info_interval(),
        }
    }
}

impl PsnOutputConfig {
    pub fn local_addr(&self) -> ConfigResult<SocketAddrV4> {
        bind_addr(&self.local_ip, 0)
    }

    pub fn target(&self) -> ConfigResult<SocketAddrV4> {
        target_addr("target_ip", &self.target_ip, self.port)
    }

    /// Name for the tracker at `index` in the outgoing list
    pub fn tracker_name(&self, index: usize, id: u16) -> TrackerName {
        match self.tracker_names.get(index) {
            Some(name) if !name.is_empty() => TrackerName::new(id, name.clone()),
            _ => TrackerName::new(id, format!("Tracker {}", id)),
        }
    }

    pub fn info_interval(&self) -> Option<Duration> {
        secs(self.info_interval_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.local_addr()?;
        self.target()?;
        check_range(Protocol::Psn, self.start_tracker, 1)?;
        check_finite("max_fps", self.max_fps)?;
        check_seconds("info_interval_secs", self.info_interval_secs)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Every operator the `run` command can start, each optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub artnet_input: Option<ArtNetInputConfig>,
    pub sacn_input: Option<SacnInputConfig>,
    pub psn_input: Option<PsnInputConfig>,
    pub sacn_discovery: Option<SacnDiscoveryConfig>,
    pub artnet_output: Option<ArtNetOutputConfig>,
    pub sacn_output: Option<SacnOutputConfig>,
    pub psn_output: Option<PsnOutputConfig>,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(c) = &self.artnet_input {
            c.validate()?;
        }
        if let Some(c) = &self.sacn_input {
            c.validate()?;
        }
        if let Some(c) = &self.psn_input {
            c.validate()?;
        }
        if let Some(c) = &self.sacn_discovery {
            c.validate()?;
        }
        if let Some(c) = &self.artnet_output {
            c.validate()?;
        }
        if let Some(c) = &self.sacn_output {
            c.validate()?;
        }
        if let Some(c) = &self.psn_output {
            c.validate()?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Longest accepted timeout or interval, in seconds (one day)
pub const MAX_SECONDS: f64 = 86_400.0;

/// Seconds to a duration; zero, negative, non-finite or unrepresentable means "disabled"
pub fn secs(value: f64) -> Option<Duration> {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).ok()
    } else {
        None
    }
}

fn ip(field: &'static str, value: &str) -> ConfigResult<Ipv4Addr> {
    parse_ipv4(value).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn bind_addr(local_ip: &str, port: u16) -> ConfigResult<SocketAddrV4> {
    let ip = parse_local_ip(local_ip).map_err(|_| ConfigError::InvalidAddress {
        field: "local_ip",
        value: local_ip.to_string(),
    })?;
    Ok(SocketAddrV4::new(ip, port))
}

fn target_addr(field: &'static str, value: &str, port: u16) -> ConfigResult<SocketAddrV4> {
    check_port("port", port)?;
    let ip = ip(field, value)?;
    if ip.is_unspecified() {
        return Err(ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
    Ok(SocketAddrV4::new(ip, port))
}

fn check_port(field: &'static str, port: u16) -> ConfigResult<()> {
    if port == 0 {
        return Err(ConfigError::ZeroPort(field));
    }
    Ok(())
}

fn check_range(protocol: Protocol, start: u32, count: u32) -> ConfigResult<()> {
    if protocol.contains_range(start, count) {
        return Ok(());
    }
    let range = protocol.id_range();
    Err(ConfigError::IdRange {
        protocol,
        start,
        count,
        min: *range.start(),
        max: *range.end(),
    })
}

fn check_finite(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

/// A finite number of seconds no larger than [`MAX_SECONDS`]; <= 0 is allowed and disables
fn check_seconds(field: &'static str, value: f64) -> ConfigResult<()> {
    check_finite(field, value)?;
    if value > MAX_SECONDS {
        return Err(ConfigError::TooLarge {
            field,
            value,
            max: MAX_SECONDS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ArtNetInputConfig::default().validate().unwrap();
        SacnInputConfig::default().validate().unwrap();
        PsnInputConfig::default().validate().unwrap();
        SacnDiscoveryConfig::default().validate().unwrap();
        ArtNetOutputConfig::default().validate().unwrap();
        SacnOutputConfig::default().validate().unwrap();
        PsnOutputConfig::default().validate().unwrap();
    }

    #[test]
    fn test_any_address() {
        let config = ArtNetInputConfig::default();
        assert_eq!(
            config.bind_addr().unwrap(),
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 6454)
        );
    }

    #[test]
    fn test_invalid_values() {
        let config = ArtNetInputConfig {
            local_ip: "300.1.1.1".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAddress { field: "local_ip", .. })
        ));

        let config = SacnInputConfig {
            start_universe: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::IdRange { .. })));

        let config = ArtNetInputConfig {
            timeout_secs: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotFinite { .. })));

        let config = ArtNetOutputConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPort("port")));

        let config = PsnInputConfig {
            multicast_group: "10.0.0.1".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_sections() {
        let text = r#"
            [artnet_input]
            start_universe = 1
            universe_count = 2

            [sacn_output]
            multicast = false
            target_ip = "192.168.1.20"
            sync_enabled = true
            sync_universe = 100
        "#;
        let config = EngineConfig::from_toml_str(text).unwrap();

        let artnet = config.artnet_input.unwrap();
        assert_eq!(artnet.universe_count, 2);
        assert_eq!(artnet.port, 6454);
        assert_eq!(artnet.local_ip, "any");

        let sacn = config.sacn_output.unwrap();
        assert_eq!(sacn.unicast_target().unwrap(), "192.168.1.20:5568".parse().unwrap());
        assert_eq!(sacn.priority, 100);
        assert!(config.psn_input.is_none());
    }

    #[test]
    fn test_toml_rejects_invalid_section() {
        let text = r#"
            [psn_output]
            target_ip = "not-an-ip"
        "#;
        assert!(matches!(
            EngineConfig::from_toml_str(text),
            Err(ConfigError::InvalidAddress { field: "target_ip", .. })
        ));
    }

    #[test]
    fn test_tracker_names() {
        let config = PsnOutputConfig {
            tracker_names: vec!["Lead".into(), String::new()],
            ..Default::default()
        };
        assert_eq!(config.tracker_name(0, 5).name, "Lead");
        assert_eq!(config.tracker_name(1, 6).name, "Tracker 6");
        assert_eq!(config.tracker_name(2, 7).name, "Tracker 7");
    }

    #[test]
    fn test_secs() {
        assert_eq!(secs(0.0), None);
        assert_eq!(secs(-1.0), None);
        assert_eq!(secs(f64::NAN), None);
        assert_eq!(secs(1.5), Some(Duration::from_millis(1500)));
        // Too large for a Duration
        assert_eq!(secs(1e20), None);
        assert_eq!(secs(f64::MAX), None);
    }

    #[test]
    fn test_rejects_oversized_seconds() {
        let config = ArtNetInputConfig {
            timeout_secs: 1e20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge { field: "timeout_secs", .. })
        ));

        let config = SacnDiscoveryConfig {
            timeout_secs: MAX_SECONDS + 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PsnOutputConfig {
            info_interval_secs: 1e300,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge { field: "info_interval_secs", .. })
        ));

        // The upper bound itself and disabled values still pass
        let config = PsnInputConfig {
            timeout_secs: MAX_SECONDS,
            ..Default::default()
        };
        config.validate().unwrap();
        let config = SacnInputConfig {
            timeout_secs: -1.0,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_tiny_rates_validate() {
        // Slow rates are clamped by the pacer rather than rejected
        let config = ArtNetOutputConfig {
            max_fps: 1e-30,
            ..Default::default()
        };
        config.validate().unwrap();
    }
}
