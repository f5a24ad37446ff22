//! Configuration management for visioncam
//!
//! Provides configuration loading, saving, and validation for the camera,
//! mode filter, stream server and network settings.

use crate::calibration::DEFAULT_FOV;
use crate::camera::{CameraParams, ModeFilter, DEFAULT_READY_TIMEOUT};
use crate::errors::CameraError;
use crate::network::{ConnectionType, NetworkSettings};
use crate::types::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionCameraConfig {
    pub camera: CameraConfig,
    pub modes: ModeFilter,
    pub stream: StreamConfig,
    pub network: NetworkConfig,
}

/// Which device to open and how
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub name: String,
    /// Device path (`/dev/video0`) or backend index
    pub path: String,
    /// Diagonal field of view in degrees
    pub field_of_view: f64,
    /// Preferred index into the filtered mode list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_mode_index: Option<usize>,
    pub ready_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            path: "/dev/video0".to_string(),
            field_of_view: DEFAULT_FOV,
            video_mode_index: None,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT.as_millis() as u64,
        }
    }
}

/// MJPEG server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 0 picks a free port
    pub port: u16,
    pub jpeg_quality: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            port: 1181,
            jpeg_quality: 80,
        }
    }
}

impl StreamConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, CameraError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            CameraError::ConfigError(format!("Invalid bind address: {}", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Network management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub managed: bool,
    #[serde(flatten)]
    pub settings: NetworkSettings,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            managed: false,
            settings: NetworkSettings::default(),
        }
    }
}

impl VisionCameraConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: VisionCameraConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("visioncam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.camera.name.trim().is_empty() {
            return Err("Camera name must not be empty".to_string());
        }
        if self.camera.path.trim().is_empty() {
            return Err("Camera path must not be empty".to_string());
        }
        if !(self.camera.field_of_view > 0.0 && self.camera.field_of_view < 180.0) {
            return Err("Field of view must be between 0 and 180 degrees".to_string());
        }

        if self.modes.min_fps == 0 || self.modes.min_width == 0 || self.modes.min_height == 0 {
            return Err("Mode minimums must be positive".to_string());
        }

        if self.stream.jpeg_quality == 0 || self.stream.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.stream.bind_address.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", self.stream.bind_address));
        }

        let network = &self.network.settings;
        if network.team_number > 25599 {
            return Err("Team number must be below 25600".to_string());
        }
        if network.hostname.trim().is_empty() {
            return Err("Hostname must not be empty".to_string());
        }
        if network.connection_type == ConnectionType::Static {
            for (label, value) in [
                ("IP address", &network.ip),
                ("netmask", &network.netmask),
                ("gateway", &network.gateway),
            ] {
                if value.parse::<std::net::Ipv4Addr>().is_err() {
                    return Err(format!("Invalid static {}: {}", label, value));
                }
            }
        }

        Ok(())
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.camera.name, &self.camera.path)
    }

    /// Camera construction parameters described by this configuration
    pub fn camera_params(&self) -> CameraParams {
        let mut params = CameraParams::new(self.identity())
            .with_fov(self.camera.field_of_view)
            .with_ready_timeout(Duration::from_millis(self.camera.ready_timeout_ms))
            .with_mode_filter(self.modes);
        if let Some(index) = self.camera.video_mode_index {
            params = params.with_preferred_mode(index);
        }
        params
    }

    pub fn mode_filter(&self) -> ModeFilter {
        self.modes
    }

    pub fn network_settings(&self) -> NetworkSettings {
        self.network.settings.clone()
    }
}
