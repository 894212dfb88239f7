use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::device::CameraDevice;
use crate::error::ValidationError;

/// Address prefixes accepted for network cameras.
pub const NETWORK_SCHEMES: [&str; 5] = ["rtsp://", "rtmp://", "rtp://", "http://", "https://"];

/// Transport options applied when opening a network source.
const NETWORK_TRANSPORT_OPTIONS: [(&str, &str); 3] = [
    ("rtsp_transport", "tcp"),
    // demuxer reorder window, microseconds
    ("max_delay", "500000"),
    // socket timeout, microseconds
    ("timeout", "5000000"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    NetworkCamera,
    NetworkVtx,
    LocalCamera,
    UvcCamera,
    UsbVtx,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 5] = [
        ConnectionType::NetworkCamera,
        ConnectionType::NetworkVtx,
        ConnectionType::LocalCamera,
        ConnectionType::UvcCamera,
        ConnectionType::UsbVtx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConnectionType::NetworkCamera => "Network Camera",
            ConnectionType::NetworkVtx => "Network VTX",
            ConnectionType::LocalCamera => "Local Camera",
            ConnectionType::UvcCamera => "UVC Camera",
            ConnectionType::UsbVtx => "USB VTX",
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, ConnectionType::NetworkVtx | ConnectionType::UsbVtx)
    }
}

impl Display for ConnectionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnectionType {
    type Err = ValidationError;

    /// Accepts the display name in any case, with or without separators
    /// (`network-camera`, `NetworkCamera`, `uvc_camera`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        ConnectionType::ALL
            .into_iter()
            .find(|kind| {
                kind.name()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .map(|c| c.to_ascii_lowercase())
                    .eq(wanted.chars())
            })
            .ok_or_else(|| ValidationError::UnknownConnectionType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    Network,
    File,
    /// Capture device opened through a named FFmpeg input format (v4l2, avfoundation, dshow).
    Device { format: String },
}

/// A validated source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    url: String,
    kind: LocatorKind,
}

impl Locator {
    pub fn network(url: &str) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyLocator);
        }
        if !has_network_scheme(url) {
            return Err(ValidationError::UnsupportedScheme {
                locator: url.to_string(),
                expected: NETWORK_SCHEMES.join(", "),
            });
        }
        Ok(Self {
            url: url.to_string(),
            kind: LocatorKind::Network,
        })
    }

    pub fn file(path: &str) -> Result<Self, ValidationError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ValidationError::EmptyLocator);
        }
        Ok(Self {
            url: path.to_string(),
            kind: LocatorKind::File,
        })
    }

    pub fn device(format: &str, id: &str) -> Self {
        Self {
            url: id.to_string(),
            kind: LocatorKind::Device {
                format: format.to_string(),
            },
        }
    }

    /// Validates `address` for the given connection type and maps it to a locator.
    /// Camera names are looked up in `cameras`, which should be a fresh snapshot.
    pub fn resolve(
        kind: ConnectionType,
        address: &str,
        cameras: &[CameraDevice],
    ) -> Result<Self, ValidationError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ValidationError::EmptyLocator);
        }
        match kind {
            ConnectionType::NetworkCamera => Self::network(address),
            ConnectionType::NetworkVtx | ConnectionType::UsbVtx => {
                Err(ValidationError::UnsupportedConnection(kind))
            }
            ConnectionType::LocalCamera | ConnectionType::UvcCamera => {
                if cameras.is_empty() {
                    return Err(ValidationError::NoCameraDetected);
                }
                cameras
                    .iter()
                    .find(|camera| camera.matches(address))
                    .map(CameraDevice::locator)
                    .ok_or_else(|| ValidationError::CameraNotFound(address.to_string()))
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> &LocatorKind {
        &self.kind
    }

    pub fn is_network(&self) -> bool {
        self.kind == LocatorKind::Network
    }

    pub fn input_format(&self) -> Option<&str> {
        match &self.kind {
            LocatorKind::Device { format } => Some(format),
            _ => None,
        }
    }

    pub fn transport_options(&self) -> &'static [(&'static str, &'static str)] {
        if self.is_network() {
            &NETWORK_TRANSPORT_OPTIONS
        } else {
            &[]
        }
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            LocatorKind::Device { format } => write!(f, "{}:{}", format, self.url),
            _ => f.write_str(&self.url),
        }
    }
}

pub fn has_network_scheme(address: &str) -> bool {
    NETWORK_SCHEMES.iter().any(|scheme| {
        address
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Egress wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Rtsp,
    Rtmp,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Rtsp => "RTSP",
            Protocol::Rtmp => "RTMP",
        }
    }

    /// Muxer used to write the protocol.
    pub fn muxer_format(self) -> &'static str {
        match self {
            Protocol::Rtsp => "rtsp",
            Protocol::Rtmp => "flv",
        }
    }

    pub fn options(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Protocol::Rtsp => &[("rtsp_transport", "tcp"), ("muxdelay", "0.1")],
            Protocol::Rtmp => &[],
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rtsp" => Ok(Protocol::Rtsp),
            "rtmp" => Ok(Protocol::Rtmp),
            _ => Err(ValidationError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Where an egress session publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    protocol: Protocol,
    url: String,
}

impl SinkTarget {
    pub fn new(protocol: Protocol, url: &str) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyLocator);
        }
        Ok(Self {
            protocol,
            url: url.to_string(),
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Display for SinkTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.protocol, self.url)
    }
}
