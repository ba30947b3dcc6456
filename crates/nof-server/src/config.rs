use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use nof_core::db::DEFAULT_POOL_SIZE;
use nof_core::Staging;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HOST: &str = "localhost";

/// The three HTTP tiers, ordered south to north.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Controller,
    Dashboard,
    RemoteDashboard,
}

impl Role {
    /// Short name recorded as `source_name` on activities.
    pub fn name(self) -> &'static str {
        match self {
            Role::Controller => "CTRL",
            Role::Dashboard => "DASH",
            Role::RemoteDashboard => "RASH",
        }
    }

    /// Prefix of the `<PREFIX>_HOST` / `<PREFIX>_PORT` environment variables.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Role::Controller => "CONTROLLER",
            Role::Dashboard => "DASHBOARD",
            Role::RemoteDashboard => "REMOTEDASHBOARD",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Role::Controller => 8070,
            Role::Dashboard => 8080,
            Role::RemoteDashboard => 8090,
        }
    }

    /// The neighbour this tier syncs against in the default topology.
    pub fn northbound(self) -> Option<Role> {
        match self {
            Role::Controller => Some(Role::Dashboard),
            Role::Dashboard => Some(Role::RemoteDashboard),
            Role::RemoteDashboard => None,
        }
    }

    /// Whether some tier syncs against this one from the south.
    pub fn has_southbound(self) -> bool {
        !matches!(self, Role::Controller)
    }

    /// `~/.nof/<NAME>.db`, or `./.nof/<NAME>.db` without a home directory.
    pub fn default_db_path(self) -> PathBuf {
        home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nof")
            .join(format!("{}.db", self.name()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Address of the northbound neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn sync_url(&self) -> String {
        format!("http://{}:{}/activities/sync", self.host, self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: Role,
    pub host: String,
    pub port: u16,
    pub northbound: Option<Peer>,
    pub sync_interval: Duration,
    pub db_path: PathBuf,
    pub pool_size: usize,
}

impl NodeConfig {
    /// Defaults for `role`: its standard port, its standard northbound
    /// neighbour on localhost and the database under `~/.nof`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            host: DEFAULT_HOST.to_string(),
            port: role.default_port(),
            northbound: role
                .northbound()
                .map(|peer| Peer::new(DEFAULT_HOST, peer.default_port())),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            db_path: role.default_db_path(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Queue only toward sides that will actually drain.
    pub fn staging(&self) -> Staging {
        Staging {
            northbound: self.northbound.is_some(),
            southbound: self.role.has_southbound(),
        }
    }
}
