//! Configuration files of the server, the client and the control tool.
//!
//! Configurations are JSON objects. A missing file yields the defaults; keys missing from a
//! file keep their default value. Command line flags are applied on top by the executables.
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::engine::snapshot::to_indented_json;
use crate::{Result, WhosonError};

/// value of `TCP`/`UDP` that disables the listener
pub const NOSTART: &str = "nostart";

/// default server configuration file
pub const SERVER_CONFIG: &str = "/etc/gowhoson.json";
/// file name of the client configuration, under [`config_dir`]
pub const CLIENT_CONFIG: &str = "client.json";
/// file name of the control tool configuration, under [`config_dir`]
pub const SERVER_CTL_CONFIG: &str = "serverctl.json";

/// the log levels accepted by `Loglevel`
pub const LOG_LEVELS: [&str; 8] = ["trace", "debug", "info", "warn", "error", "dpanic", "panic", "fatal"];

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address, or `nostart`
    #[serde(rename = "TCP")]
    pub tcp: String,
    /// UDP listen address, or `nostart`
    #[serde(rename = "UDP")]
    pub udp: String,
    /// `stdout`, `stderr`, `discard` or a file path
    #[serde(rename = "Log")]
    pub log: String,
    /// one of [`LOG_LEVELS`]
    #[serde(rename = "Loglevel")]
    pub loglevel: String,
    /// worker id of the session id generator
    #[serde(rename = "ServerID")]
    pub server_id: u64,
    /// listen address of the replication/dump RPC service
    #[serde(rename = "ControlPort")]
    pub control_port: String,
    /// comma separated `ip:port` list of peers to replicate to
    #[serde(rename = "SyncRemote")]
    pub sync_remote: String,
    /// snapshot file, loaded at start and saved at shutdown; empty to disable
    #[serde(rename = "SaveFile")]
    pub save_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            tcp: "127.0.0.1:9876".to_string(),
            udp: "127.0.0.1:9876".to_string(),
            log: "stdout".to_string(),
            loglevel: "error".to_string(),
            server_id: 1000,
            control_port: "127.0.0.1:9877".to_string(),
            sync_remote: String::new(),
            save_file: String::new(),
        }
    }
}

impl ServerConfig {
    /// the TCP listen address, `None` if disabled
    pub fn tcp_addr(&self) -> Result<Option<SocketAddr>> {
        optional_addr("tcp", &self.tcp)
    }

    /// the UDP listen address, `None` if disabled
    pub fn udp_addr(&self) -> Result<Option<SocketAddr>> {
        optional_addr("udp", &self.udp)
    }

    /// the RPC listen address
    pub fn control_addr(&self) -> Result<SocketAddr> {
        parse_ip_port("controlport", &self.control_port)
    }

    /// the replication peers, empty if replication is disabled
    pub fn sync_peers(&self) -> Result<Vec<SocketAddr>> {
        parse_ip_port_list("syncremote", &self.sync_remote)
    }

    /// the snapshot file, `None` if disabled
    pub fn save_path(&self) -> Option<PathBuf> {
        if self.save_file.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(self.save_file.trim()))
        }
    }

    /// checks every address and the log level
    ///
    /// # Errors
    /// `WhosonError::Config` naming the first invalid option
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.loglevel.as_str()) {
            return Err(WhosonError::Config(format!(
                "\"--loglevel {}\" not support loglevel",
                self.loglevel
            )));
        }
        self.tcp_addr()?;
        self.udp_addr()?;
        self.control_addr()?;
        self.sync_peers()?;
        Ok(())
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `tcp` or `udp`
    #[serde(rename = "Mode")]
    pub mode: String,
    /// server address
    #[serde(rename = "Server")]
    pub server: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            mode: "udp".to_string(),
            server: "127.0.0.1:9876".to_string(),
        }
    }
}

/// Control tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCtlConfig {
    /// RPC address of the server
    #[serde(rename = "Server")]
    pub server: String,
    /// dump as JSON instead of a table
    #[serde(rename = "JSON")]
    pub json: bool,
}

impl Default for ServerCtlConfig {
    fn default() -> Self {
        ServerCtlConfig {
            server: "127.0.0.1:9877".to_string(),
            json: false,
        }
    }
}

/// loads a configuration from `path`, falling back to the defaults if the file does not exist
///
/// # Errors
/// `WhosonError::Config` if the file exists but cannot be read or parsed
pub fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| WhosonError::Config(format!("could not unmarshal {:?}: {}", path, e))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(WhosonError::Config(format!("could not read {:?}: {}", path, e))),
    }
}

/// writes `config` to `path` as indented JSON, creating missing parent directories
pub fn save<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, to_indented_json(config)?)?;
    Ok(())
}

/// the per-user configuration directory, `~/.config/gowhoson`
///
/// # Errors
/// `WhosonError::Config` if the home directory cannot be determined
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WhosonError::Config("could not determine home directory".to_string()))?;
    Ok(home.join(".config").join("gowhoson"))
}

fn optional_addr(name: &str, value: &str) -> Result<Option<SocketAddr>> {
    if value.trim() == NOSTART {
        Ok(None)
    } else {
        parse_ip_port(name, value).map(Some)
    }
}

/// parses `IP:PORT` where the host must be an IP literal
pub fn parse_ip_port(name: &str, value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    let invalid = || WhosonError::Config(format!("\"--{} {}\" parse error", name, value));
    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = host.parse().map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok(SocketAddr::new(ip, port))
}

/// parses a comma separated list of `IP:PORT`, ignoring blank entries
pub fn parse_ip_port_list(name: &str, value: &str) -> Result<Vec<SocketAddr>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_ip_port(name, s))
        .collect()
}
