use crate::error::{CoreError, CoreResult};
use crate::redaction::engine::RedactionRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// The five gateway endpoints a capture can come from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Appliances,
    DirectObjects,
    DomainObjects,
    Locations,
    Modules,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 5] = [
        EndpointKind::Appliances,
        EndpointKind::DirectObjects,
        EndpointKind::DomainObjects,
        EndpointKind::Locations,
        EndpointKind::Modules,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::Appliances => "appliances",
            EndpointKind::DirectObjects => "direct_objects",
            EndpointKind::DomainObjects => "domain_objects",
            EndpointKind::Locations => "locations",
            EndpointKind::Modules => "modules",
        }
    }

    /// Path on the gateway, e.g. `/core/appliances`.
    pub fn path(self) -> String {
        format!("/core/{}", self.as_str())
    }

    /// Name of the fixture file, e.g. `core.appliances.xml`.
    pub fn file_name(self) -> String {
        format!("core.{}.xml", self.as_str())
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_prefix("core.")?.strip_suffix(".xml")?;
        stem.parse().ok()
    }

    /// URL a contributor fetches this capture from. Nothing here performs the fetch.
    pub fn fetch_url(self, host: &str) -> CoreResult<Url> {
        let base = if host.contains("://") {
            Url::parse(host)
        } else {
            Url::parse(&format!("http://{}", host))
        }
        .map_err(|e| CoreError::InvalidInput(format!("invalid gateway host {}: {}", host, e)))?;
        base.join(&self.path())
            .map_err(|e| CoreError::InvalidInput(format!("cannot build fetch url: {}", e)))
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        let norm = norm.trim_start_matches("/core/");
        EndpointKind::ALL
            .into_iter()
            .find(|e| e.as_str() == norm)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown endpoint kind: {}", s)))
    }
}

/// One raw document as fetched from a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub endpoint: EndpointKind,
    pub text: String,
}

impl Capture {
    pub fn new(endpoint: EndpointKind, text: impl Into<String>) -> Self {
        Self {
            endpoint,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanitizedCapture {
    pub endpoint: EndpointKind,
    pub text: String,
    pub sha256: String,
    pub records: Vec<RedactionRecord>,
    /// Ingest-time rewrites applied before redaction (e.g. ampersand repair).
    pub transformations: Vec<String>,
}

impl SanitizedCapture {
    pub fn changed_count(&self) -> usize {
        self.records.iter().filter(|r| r.changed).count()
    }
}
