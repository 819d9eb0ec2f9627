use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::tracker::types::TrackerConfig;

/// Runtime configuration resolved from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub infile: PathBuf,
    pub outfile: PathBuf,
    pub checkpoint: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub work_timeout: Duration,
    pub checkpoint_interval: Duration,
}

impl ServerConfig {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            infile: self.infile.clone(),
            outfile: self.outfile.clone(),
            checkpoint: self.checkpoint.clone(),
            work_timeout: self.work_timeout,
            checkpoint_interval: self.checkpoint_interval,
        }
    }
}
