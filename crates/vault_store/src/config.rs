use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use vault_group::GroupConfig;

use crate::error::{Result, VaultError};
use crate::keys::KeyLayout;
use crate::ledger::LedgerConfig;
use crate::worker::WorkerConfig;

/// CLI options for running a vault node.
#[derive(Parser, Debug, Clone)]
#[command(name = "vault-node", about = "Account-partitioned vault storage node")]
pub struct NodeArgs {
    /// Store directory. Wiped on startup and removed on shutdown.
    #[arg(long, env = "VAULT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Bytes of account id prefix in each stored key (1..=4).
    #[arg(long, env = "VAULT_PREFIX_WIDTH", default_value_t = 2)]
    pub prefix_width: usize,

    /// Bytes of type tag suffix in each stored key (1..=8).
    #[arg(long, env = "VAULT_SUFFIX_WIDTH", default_value_t = 1)]
    pub suffix_width: usize,

    /// Override the quorum derived from `--group-size` (strict majority).
    #[arg(long, env = "VAULT_QUORUM")]
    pub quorum: Option<usize>,

    /// Pending actions without quorum after this long are evicted (ms).
    #[arg(long, env = "VAULT_STALE_AFTER_MS", default_value_t = 30_000)]
    pub stale_after_ms: u64,

    /// How often the worker sweeps stale actions (ms).
    #[arg(long, env = "VAULT_SWEEP_INTERVAL_MS", default_value_t = 1_000)]
    pub sweep_interval_ms: u64,

    /// Reports queued beyond this are rejected with backpressure.
    #[arg(long, env = "VAULT_QUEUE_CAPACITY", default_value_t = 1024)]
    pub queue_capacity: usize,

    #[arg(long, env = "VAULT_NOTIFY_CAPACITY", default_value_t = 1024)]
    pub notify_capacity: usize,

    /// Closest nodes that hold a target's data; also sets the default quorum.
    #[arg(long, env = "VAULT_GROUP_SIZE", default_value_t = 4)]
    pub group_size: usize,

    /// Closest nodes that track a target without holding it.
    #[arg(long, env = "VAULT_PROXIMAL_SIZE", default_value_t = 16)]
    pub proximal_size: usize,
}

impl NodeArgs {
    pub fn key_layout(&self) -> Result<KeyLayout> {
        KeyLayout::new(self.prefix_width, self.suffix_width)
    }

    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        let stale_after = Duration::from_millis(self.stale_after_ms);
        match self.quorum {
            Some(quorum) => LedgerConfig::new(quorum, stale_after),
            None => LedgerConfig::for_group(&self.group_config()?, stale_after),
        }
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        if self.sweep_interval_ms == 0 {
            return Err(VaultError::Config(
                "sweep interval must be non-zero".to_string(),
            ));
        }
        Ok(WorkerConfig {
            queue_capacity: self.queue_capacity,
            notify_capacity: self.notify_capacity,
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        })
    }

    pub fn group_config(&self) -> Result<GroupConfig> {
        GroupConfig::new(self.group_size, self.proximal_size)
            .map_err(|err| VaultError::Config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> NodeArgs {
        let mut argv = vec!["vault-node", "--data-dir", "/tmp/vault-test"];
        argv.extend_from_slice(extra);
        NodeArgs::try_parse_from(argv).expect("parse args")
    }

    #[test]
    fn defaults_derive_majority_quorum() {
        let args = parse(&[]);
        let ledger = args.ledger_config().expect("ledger config");
        assert_eq!(ledger.quorum(), 3);
        assert_eq!(ledger.stale_after(), Duration::from_secs(30));
        assert_eq!(args.key_layout().expect("layout"), KeyLayout::default());
        let group = args.group_config().expect("group config");
        assert_eq!((group.group_size(), group.proximal_size()), (4, 16));
    }

    #[test]
    fn quorum_override_wins() {
        let args = parse(&["--group-size", "8", "--proximal-size", "16"]);
        assert_eq!(args.ledger_config().expect("ledger config").quorum(), 5);

        let args = parse(&["--group-size", "8", "--proximal-size", "16", "--quorum", "2"]);
        assert_eq!(args.ledger_config().expect("ledger config").quorum(), 2);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let args = parse(&["--prefix-width", "5"]);
        assert!(matches!(args.key_layout(), Err(VaultError::Config(_))));

        let args = parse(&["--group-size", "4", "--proximal-size", "4"]);
        assert!(matches!(args.group_config(), Err(VaultError::Config(_))));

        let args = parse(&["--sweep-interval-ms", "0"]);
        assert!(args.worker_config().is_err());
    }
}
