//! Startup configuration: everything here fails before any channel opens.

use std::{
    error::Error,
    fmt, fs, io,
    net::{SocketAddr, ToSocketAddrs},
    num::NonZeroUsize,
    path::Path,
};

use comms::{scenario::Catalog, specs::TrainSpec};

/// Startup validation failures.
#[derive(Debug)]
pub enum ConfigError {
    EmptyCatalog,
    NoWorkers,
    /// Exactly one parameter server is supported per run.
    LeaderCount { got: usize },
    BadAddress { value: String },
    TaskIndexOutOfRange { index: usize, count: usize },
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyCatalog => write!(f, "the scenario catalog is empty"),
            ConfigError::NoWorkers => write!(f, "the worker host list is empty"),
            ConfigError::LeaderCount { got } => {
                write!(f, "expected exactly one parameter server host, got {got}")
            }
            ConfigError::BadAddress { value } => {
                write!(f, "cannot resolve cluster address {value:?}")
            }
            ConfigError::TaskIndexOutOfRange { index, count } => {
                write!(f, "task index {index} outside the {count} configured tasks")
            }
            ConfigError::Io(e) => write!(f, "config io error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Boundary conversion for the binary's exit path.
impl From<ConfigError> for io::Error {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// The cluster address view; every process in a run must be given an
/// identical one.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub leader: SocketAddr,
    pub workers: Vec<SocketAddr>,
    count: NonZeroUsize,
}

impl ClusterSpec {
    /// Parses the comma-separated `host:port` lists for both roles.
    pub fn parse(ps_hosts: &str, worker_hosts: &str) -> Result<Self, ConfigError> {
        let leaders = parse_hosts(ps_hosts)?;
        let workers = parse_hosts(worker_hosts)?;

        let [leader] = leaders[..] else {
            return Err(ConfigError::LeaderCount { got: leaders.len() });
        };
        let count = NonZeroUsize::new(workers.len()).ok_or(ConfigError::NoWorkers)?;

        Ok(Self {
            leader,
            workers,
            count,
        })
    }

    pub fn worker_count(&self) -> NonZeroUsize {
        self.count
    }
}

fn parse_hosts(list: &str) -> Result<Vec<SocketAddr>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| {
            host.to_socket_addrs()
                .ok()
                .and_then(|mut addrs| addrs.next())
                .ok_or_else(|| ConfigError::BadAddress {
                    value: host.to_string(),
                })
        })
        .collect()
}

/// Loads the shared scenario catalog from a JSON file.
pub fn load_catalog(path: &Path) -> Result<Catalog, ConfigError> {
    let bytes = fs::read(path)?;
    let catalog: Catalog = serde_json::from_slice(&bytes)?;

    if catalog.is_empty() {
        return Err(ConfigError::EmptyCatalog);
    }
    Ok(catalog)
}

/// Loads the training spec, or the defaults when no file is given.
pub fn load_spec(path: Option<&Path>) -> Result<TrainSpec, ConfigError> {
    match path {
        Some(path) => Ok(serde_json::from_slice(&fs::read(path)?)?),
        None => Ok(TrainSpec::default()),
    }
}

pub fn check_task_index(index: usize, count: usize) -> Result<(), ConfigError> {
    if index >= count {
        return Err(ConfigError::TaskIndexOutOfRange { index, count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_host_lists() {
        let cluster =
            ClusterSpec::parse("127.0.0.1:4000", "127.0.0.1:5000, 127.0.0.1:5001").unwrap();

        assert_eq!(cluster.worker_count().get(), 2);
        assert_eq!(cluster.leader.port(), 4000);
    }

    #[test]
    fn rejects_empty_worker_list() {
        assert!(matches!(
            ClusterSpec::parse("127.0.0.1:4000", ""),
            Err(ConfigError::NoWorkers)
        ));
    }

    #[test]
    fn rejects_multiple_leaders() {
        assert!(matches!(
            ClusterSpec::parse("127.0.0.1:4000,127.0.0.1:4001", "127.0.0.1:5000"),
            Err(ConfigError::LeaderCount { got: 2 })
        ));
    }

    #[test]
    fn rejects_garbage_addresses() {
        assert!(matches!(
            ClusterSpec::parse("127.0.0.1:4000", "not-an-address"),
            Err(ConfigError::BadAddress { .. })
        ));
    }

    #[test]
    fn empty_catalog_fails_fast() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("node-catalog-{}.json", std::process::id()));
        fs::write(&path, "[]").unwrap();

        assert!(matches!(
            load_catalog(&path),
            Err(ConfigError::EmptyCatalog)
        ));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn catalog_roundtrips_from_json() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("node-catalog-ok-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"[{"topology": 0, "traffic": 1}, {"topology": 2, "traffic": 3}]"#,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.scenarios()[1].topology, 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn task_index_bounds() {
        assert!(check_task_index(0, 1).is_ok());
        assert!(matches!(
            check_task_index(2, 2),
            Err(ConfigError::TaskIndexOutOfRange { index: 2, count: 2 })
        ));
    }
}
