//! Lightweight node-local counters, standing in for the out-of-scope
//! statistics subsystem (spec.md §1). Per SPEC_FULL.md §B, this is the
//! ambient "observability floor," not the excluded metrics exporter: a
//! plain counter struct, surfaced through a `tracing` event rather than a
//! scrape endpoint.

use tracing::info;

#[derive(Clone, Copy, Debug, Default)]
pub struct NodeStats {
    pub rounds_seen: u64,
    pub pools_committed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl NodeStats {
    pub fn on_round_start(&mut self, round_num: u32) {
        self.rounds_seen += 1;
        info!(round = round_num, rounds_seen = self.rounds_seen, "round transition");
    }

    pub fn on_pool_committed(&mut self, sequence: u64) {
        self.pools_committed += 1;
        info!(sequence, pools_committed = self.pools_committed, "pool committed");
    }
}
