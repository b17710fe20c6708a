//! Runtime configuration, read from command-line flags or the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use clap::Args;
use crate::fetcher::ObjectStoreFetcher;
use crate::lookup::LookupService;
use crate::materialize::MaterializationCoordinator;

/// Default listening port, matching the census API it replaces.
pub const DEFAULT_PORT: u16 = 3000;

/// Where the census file comes from and how callers wait for it.
#[derive(Debug, Clone, Args)]
pub struct LookupConfig {
    /// URI of the published census Parquet file (https://, http://, s3://, memory://, or a path).
    #[arg(long, env = "CENSUS_ORIGIN_URL")]
    pub origin_url: String,

    /// Local cache path for the downloaded file.
    #[arg(long, env = "CENSUS_LOCAL_PATH", default_value = "data/censo.parquet")]
    pub local_path: PathBuf,

    /// Longest a request waits on an in-flight build, in milliseconds. Unset waits indefinitely.
    #[arg(long, env = "CENSUS_BUILD_WAIT_TIMEOUT_MS")]
    pub build_wait_timeout_ms: Option<u64>,
}

impl LookupConfig {
    pub fn new(origin_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            origin_url: origin_url.into(),
            local_path: local_path.into(),
            build_wait_timeout_ms: None,
        }
    }

    pub fn build_wait_timeout(&self) -> Option<Duration> {
        self.build_wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn fetcher(&self) -> ObjectStoreFetcher {
        ObjectStoreFetcher::new(self.origin_url.clone(), self.local_path.clone())
    }

    pub fn coordinator(&self) -> MaterializationCoordinator {
        MaterializationCoordinator::new(Arc::new(self.fetcher()))
            .with_wait_timeout(self.build_wait_timeout())
    }

    pub fn lookup_service(&self) -> LookupService {
        LookupService::new(Arc::new(self.coordinator()))
    }
}

/// Settings for the HTTP server.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[command(flatten)]
    pub dataset: LookupConfig,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, env = "CENSUS_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_address: IpAddr,

    /// Start materializing at startup instead of on the first request.
    #[arg(long, env = "CENSUS_WARM_ON_START")]
    pub warm_on_start: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
