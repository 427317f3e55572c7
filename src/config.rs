use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SigpadConfig {
    pub server: ServerConfig,
    pub signature: SignatureConfig,
    pub surface: SurfaceConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// WebSocket endpoint of the local pad server
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Round-trip timeout for a single pad command in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Device class passed to pad discovery
    #[serde(default = "default_pad_subset")]
    pub pad_subset: String,

    /// Index of the discovered pad to open
    #[serde(default = "default_pad_index")]
    pub pad_index: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SignatureConfig {
    /// Field label shown on the pad display
    #[serde(default = "default_field_name")]
    pub field_name: String,

    /// Text shown on the pad display above the signing area
    #[serde(default = "default_custom_text")]
    pub custom_text: String,

    /// Signatures at or below this duration are retried automatically
    #[serde(default = "default_min_duration_seconds")]
    pub min_duration_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SurfaceConfig {
    /// Canvas height in pixels
    #[serde(default = "default_surface_height")]
    pub height: u32,

    /// Initial container width in pixels
    #[serde(default = "default_surface_width")]
    pub width: u32,

    /// Ink color as #rrggbb or #rrggbbaa
    #[serde(default = "default_ink_color")]
    pub ink_color: String,

    /// Stroke width in pixels
    #[serde(default = "default_pen_width")]
    pub pen_width: f32,

    /// Offer the hardware pad mode toggle
    #[serde(default = "default_hardware_toggle")]
    pub hardware_toggle: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pad_subset: default_pad_subset(),
            pad_index: default_pad_index(),
        }
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            field_name: default_field_name(),
            custom_text: default_custom_text(),
            min_duration_seconds: default_min_duration_seconds(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            height: default_surface_height(),
            width: default_surface_width(),
            ink_color: default_ink_color(),
            pen_width: default_pen_width(),
            hardware_toggle: default_hardware_toggle(),
        }
    }
}

impl SigpadConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sigpad.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.url", default_server_url())?
            .set_default("server.connect_timeout_ms", default_connect_timeout_ms())?
            .set_default("server.request_timeout_ms", default_request_timeout_ms())?
            .set_default("server.pad_subset", default_pad_subset())?
            .set_default("server.pad_index", default_pad_index())?
            .set_default("signature.field_name", default_field_name())?
            .set_default("signature.custom_text", default_custom_text())?
            .set_default(
                "signature.min_duration_seconds",
                default_min_duration_seconds(),
            )?
            .set_default("surface.height", default_surface_height())?
            .set_default("surface.width", default_surface_width())?
            .set_default("surface.ink_color", default_ink_color())?
            .set_default("surface.pen_width", default_pen_width() as f64)?
            .set_default("surface.hardware_toggle", default_hardware_toggle())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // SIGPAD_SERVER__URL style overrides; field names contain underscores
            .add_source(
                Environment::with_prefix("SIGPAD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: SigpadConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.url.starts_with("ws://") || self.server.url.starts_with("wss://")) {
            return Err(ConfigError::Message(format!(
                "Pad server url must use ws:// or wss://, got '{}'",
                self.server.url
            )));
        }

        if self.server.connect_timeout_ms == 0 || self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Pad server timeouts must be greater than 0".to_string(),
            ));
        }

        if self.server.pad_subset.trim().is_empty() {
            return Err(ConfigError::Message(
                "Pad subset must not be empty".to_string(),
            ));
        }

        if self.signature.min_duration_seconds < 0.0 {
            return Err(ConfigError::Message(
                "Signature min_duration_seconds must not be negative".to_string(),
            ));
        }

        if self.surface.height == 0 || self.surface.width == 0 {
            return Err(ConfigError::Message(
                "Surface dimensions must be greater than 0".to_string(),
            ));
        }

        if self.surface.pen_width <= 0.0 {
            return Err(ConfigError::Message(
                "Surface pen_width must be greater than 0".to_string(),
            ));
        }

        if crate::surface::parse_ink_color(&self.surface.ink_color).is_err() {
            return Err(ConfigError::Message(format!(
                "Surface ink_color '{}' is not a #rrggbb color",
                self.surface.ink_color
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for SigpadConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            signature: SignatureConfig::default(),
            surface: SurfaceConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_server_url() -> String {
    "ws://127.0.0.1:49494".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    10000
}
fn default_pad_subset() -> String {
    "HID".to_string()
}
fn default_pad_index() -> u32 {
    0
}

fn default_field_name() -> String {
    "Signature".to_string()
}
fn default_custom_text() -> String {
    "Please sign below".to_string()
}
fn default_min_duration_seconds() -> f64 {
    0.2
}

fn default_surface_height() -> u32 {
    160
}
fn default_surface_width() -> u32 {
    500
}
fn default_ink_color() -> String {
    "#000000".to_string()
}
fn default_pen_width() -> f32 {
    2.0
}
fn default_hardware_toggle() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
