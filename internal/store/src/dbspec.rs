use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::Error;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Sqlite { path: PathBuf },
}

/// Describes the database a [`Connector`](crate::Connector) talks to, and how
/// it should pool connections to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSpec {
    backend: Backend,
    busy_timeout: Duration,
    connect_timeout: Duration,
    max_connections: u32,
}

impl DbSpec {
    pub fn sqlite<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            backend: Backend::Sqlite { path: path.into() },
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Parses a database URL.
    ///
    /// Only SQLite is supported. `sqlite:///state.sqlite` refers to a file
    /// relative to `basedir`; `sqlite:////var/lib/state.sqlite` is absolute.
    pub fn from_url<P>(url: &str, basedir: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let (scheme, rest) = match url.find("://") {
            Some(idx) => (&url[..idx], &url[idx + 3..]),
            None => return Err(Error::InvalidUrl(url.to_string())),
        };

        match scheme {
            "sqlite" => {
                let path = match rest.strip_prefix('/') {
                    Some(path) if !path.is_empty() => Path::new(path),
                    _ => return Err(Error::InvalidUrl(url.to_string())),
                };

                Ok(Self::sqlite(if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    basedir.as_ref().join(path)
                }))
            }
            _ => Err(Error::UnsupportedBackend(scheme.to_string())),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }
}
