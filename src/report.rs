//! Reading nmap XML reports.
//!
//! The run header, host status, addresses, hostnames, ports, service
//! fingerprints and script output are modelled; the `.json` written next to a
//! report is this model, not a lossless conversion. Every other element and
//! attribute is skipped, so newer nmap versions that add fields still parse.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScanError};
use crate::types::OpenPort;

const OPEN: &str = "open";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NmapRun {
    #[serde(rename = "@args", default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "@scanner", default, skip_serializing_if = "Option::is_none")]
    pub scanner: Option<String>,
    #[serde(rename = "@startstr", default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Host {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostnames: Option<Hostnames>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Ports>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub names: Vec<Hostname>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype", default, skip_serializing_if = "Option::is_none")]
    pub addr_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<Port>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Port {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PortState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(rename = "script", default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<Script>,
}

/// NSE script result; nested `<table>`/`<elem>` structure is dropped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Script {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Service {
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "@product", default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "@extrainfo", default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(rename = "@ostype", default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(rename = "cpe", default, skip_serializing_if = "Vec::is_empty")]
    pub cpe: Vec<String>,
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.state == OPEN)
    }

    fn to_open_port(&self) -> OpenPort {
        let service = self.service.as_ref();
        OpenPort {
            port_number: self.port_id,
            protocol: self.protocol.clone(),
            service: service.and_then(|s| s.name.clone()),
            version: service.and_then(|s| s.version.clone()),
        }
    }
}

impl NmapRun {
    pub fn from_xml(xml: &str) -> std::result::Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }

    /// Open ports of every host in the report, in document order.
    pub fn open_ports(&self) -> Vec<OpenPort> {
        self.hosts
            .iter()
            .filter_map(|h| h.ports.as_ref())
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.is_open())
            .map(Port::to_open_port)
            .collect()
    }
}

/// Parse an XML report held in memory and return its open ports.
pub fn parse_report(xml: &str) -> std::result::Result<Vec<OpenPort>, quick_xml::DeError> {
    Ok(NmapRun::from_xml(xml)?.open_ports())
}

/// Path of the JSON rendering written next to an XML report.
pub fn json_path_for(xml_path: &Path) -> PathBuf {
    xml_path.with_extension("json")
}

/// Parse `xml_path`, write its JSON rendering alongside it and return the open ports.
pub fn convert_report(xml_path: &Path) -> Result<Vec<OpenPort>> {
    if !xml_path.is_file() {
        return Err(ScanError::MissingReport(xml_path.to_path_buf()));
    }
    let xml = fs::read_to_string(xml_path)?;
    let run = NmapRun::from_xml(&xml).map_err(|source| ScanError::Report {
        path: xml_path.to_path_buf(),
        source,
    })?;

    let json_path = json_path_for(xml_path);
    let file = fs::File::create(&json_path)?;
    serde_json::to_writer_pretty(file, &run).map_err(|source| ScanError::Json {
        path: json_path.clone(),
        source,
    })?;
    debug!(path = %json_path.display(), hosts = run.hosts.len(), "wrote report json");

    Ok(run.open_ports())
}
