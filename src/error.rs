//! Library error types.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Error returned by every fallible operation in this crate.
///
/// Carries a machine-readable kind plus a structured payload so callers
/// (and test harnesses) can match on what went wrong without parsing
/// display strings.
#[derive(Debug)]
pub struct NeoError {
    payload: HashMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The instance already has a live server process
    InstanceRunning,
    /// A requested listen port is already bound on this host
    PortOccupied,
    /// Base configuration file unreadable or unwritable
    Config,
    /// File system error
    Io,
    /// Network failure or terminal HTTP status while fetching a distribution
    Download,
    /// Archive unpack failure
    Extraction,
    /// Server binary missing, not executable, or OS-level spawn failure
    Spawn,
    /// The server process exited before reporting readiness
    PrematureExit,
    /// The server did not report readiness within the allotted time
    StartupTimeout,
    /// The OS failed to signal or reap the server process
    Stop,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::InstanceRunning => 1001,
            Self::PortOccupied => 1002,
            Self::Config => 2001,
            Self::Io => 2002,
            Self::Download => 2003,
            Self::Extraction => 2004,
            Self::Spawn => 3001,
            Self::PrematureExit => 3002,
            Self::StartupTimeout => 3003,
            Self::Stop => 3004,
            Self::Other => 9999,
        }
    }
}

impl NeoError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn instance_running(http_port: u16) -> Self {
        Self::new(
            ErrorKind::InstanceRunning,
            HashMap::from([("http_port".to_string(), http_port.to_string())]),
        )
    }

    pub fn port_occupied(port: u16) -> Self {
        Self::new(
            ErrorKind::PortOccupied,
            HashMap::from([("port".to_string(), port.to_string())]),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Download, message)
    }

    pub fn download_with_url(url: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Download,
            HashMap::from([
                ("url".to_string(), url.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Extraction, message)
    }

    pub fn spawn(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Spawn, message)
    }

    pub fn premature_exit(version: &str) -> Self {
        Self::new(
            ErrorKind::PrematureExit,
            HashMap::from([(
                "detail".to_string(),
                format!("{version} server could not be started"),
            )]),
        )
    }

    pub fn startup_timeout(version: &str, timeout_secs: u64) -> Self {
        Self::new(
            ErrorKind::StartupTimeout,
            HashMap::from([
                ("version".to_string(), version.to_string()),
                ("timeout_secs".to_string(), timeout_secs.to_string()),
            ]),
        )
    }

    pub fn stop(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Stop, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for NeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for NeoError {}

impl Serialize for NeoError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("NeoError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for NeoError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<reqwest::Error> for NeoError {
    fn from(err: reqwest::Error) -> Self {
        Self::download(err.to_string())
    }
}

impl From<zip::result::ZipError> for NeoError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::extraction(err.to_string())
    }
}

impl From<walkdir::Error> for NeoError {
    fn from(err: walkdir::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, NeoError>;
