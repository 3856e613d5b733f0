// Copyright 2020 The Weft Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Two-lane synchronization scenarios over the in-process network.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use weft_core::{Transaction, TransactionBuilder};
use weft_p2p::LocalNetwork;
use weft_servers::lane::sync_service::{State, TransactionSyncService};
use weft_servers::lane::tx_finder::TxFinderProtocol;
use weft_servers::{LaneService, Mode, ShardConfig};
use weft_util as util;
use weft_util::Runnable;

use std::sync::Arc;

fn clean_output_dir(test_dir: &str) {
	let _ = fs::remove_dir_all(test_dir);
}

fn setup(test_dir: &str) {
	util::init_test_logger();
	clean_output_dir(test_dir);
	fs::create_dir_all(test_dir).unwrap();
}

fn shard_config(test_dir: &str, name: &str) -> ShardConfig {
	let mut cfg = ShardConfig::default();
	cfg.storage_path = format!("{}/{}", test_dir, name);
	cfg
}

fn sealed_tx(seed: u64) -> Transaction {
	TransactionBuilder::new()
		.valid_from(seed)
		.valid_until(seed + 100)
		.charge_rate(seed % 13)
		.data(seed.to_be_bytes().to_vec())
		.signatory(b"identity".to_vec(), b"signature".to_vec())
		.seal()
}

fn wait_until(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if check() {
			return;
		}
		thread::sleep(Duration::from_millis(10));
	}
	panic!("timed out waiting for {}", what);
}

/// Cold start: lane B joins with empty storage and recovers everything
/// lane A holds through bulk subtree sync.
#[test]
fn cold_start_subtree_sync() {
	let test_dir = "test_output/sync_cold_start";
	setup(test_dir);
	const NUM_TXS: u64 = 10_000;

	let external = LocalNetwork::new();
	let internal_a = LocalNetwork::new();
	let internal_b = LocalNetwork::new();

	let mut a = LaneService::new(
		shard_config(test_dir, "a"),
		Mode::CreateDatabase,
		&external,
		&internal_a,
	)
	.unwrap();

	let mut expected = Vec::new();
	for seed in 0..NUM_TXS {
		let tx = sealed_tx(seed);
		expected.push(tx.clone());
		a.engine().add(tx, false).unwrap();
		a.engine().confirm(expected[seed as usize].digest);
	}
	a.start();

	// everything must be durably archived before B pulls subtrees
	wait_until("lane A to archive all txs", Duration::from_secs(60), || {
		a.engine().archiver_counters().additions_total() == NUM_TXS
	});
	assert_eq!(a.engine().count(), NUM_TXS);

	let mut b = LaneService::new(
		shard_config(test_dir, "b"),
		Mode::CreateDatabase,
		&external,
		&internal_b,
	)
	.unwrap();
	assert_eq!(b.engine().count(), 0);

	b.controller().use_these_peers(vec![a.external_addr()]);
	b.start();

	wait_until("lane B to sync all txs", Duration::from_secs(60), || {
		b.is_sync_ready() && b.engine().count() == NUM_TXS
	});

	// subtree-synced transactions never surface as recent
	assert!(b.engine().get_recent(u32::max_value()).is_empty());

	// spot-check recovered contents; recovered copies carry the sync marker
	for seed in &[0u64, 42, 4_999, 9_999] {
		let mut want = expected[*seed as usize].clone();
		let got = b.engine().get(&want.digest).unwrap();
		assert!(got.from_subtree_sync);
		want.from_subtree_sync = true;
		assert_eq!(got, want);
	}

	a.stop();
	b.stop();
	clean_output_dir(test_dir);
}

/// A sync service with no connected peers stays in its initial state and
/// issues no requests.
#[test]
fn no_peers_stays_initial() {
	let test_dir = "test_output/sync_no_peers";
	setup(test_dir);

	let network = LocalNetwork::new();
	let endpoint = network.endpoint(weft_p2p::PeerAddr::random());
	let cfg = shard_config(test_dir, "c");
	let engine = Arc::new(
		weft_pool::TransactionStorageEngine::new(
			0,
			0,
			format!("{}/c_transaction.db", test_dir),
			format!("{}/c_transaction_index.db", test_dir),
			weft_pool::StoreMode::Create,
		)
		.unwrap(),
	);

	let mut service = TransactionSyncService::new(
		cfg,
		endpoint,
		engine,
		Arc::new(TxFinderProtocol::new()),
		Box::new(|| {}),
	);

	for _ in 0..5 {
		service.execute();
		thread::sleep(Duration::from_millis(110));
	}

	assert_eq!(service.state(), State::Initial);
	assert!(!service.is_ready());
	assert_eq!(service.counters().subtree_requests_total(), 0);

	clean_output_dir(test_dir);
}

/// Steady state: a transaction accepted by A reaches B through the
/// recent-gossip poll and lands in B's recent cache.
#[test]
fn gossip_propagates_recent_transactions() {
	let test_dir = "test_output/sync_gossip";
	setup(test_dir);

	let external = LocalNetwork::new();
	let internal_a = LocalNetwork::new();
	let internal_b = LocalNetwork::new();

	let mut a = LaneService::new(
		shard_config(test_dir, "a"),
		Mode::CreateDatabase,
		&external,
		&internal_a,
	)
	.unwrap();

	// B needs something to cold-start from before it reaches steady state
	let bootstrap = sealed_tx(1);
	a.engine().add(bootstrap.clone(), false).unwrap();
	a.engine().confirm(bootstrap.digest);
	a.start();
	wait_until("lane A to archive bootstrap tx", Duration::from_secs(10), || {
		a.engine().archiver_counters().additions_total() == 1
	});

	let mut cfg_b = shard_config(test_dir, "b");
	cfg_b.sync.fetch_object_wait_ms = 200;
	let mut b = LaneService::new(cfg_b, Mode::CreateDatabase, &external, &internal_b).unwrap();
	b.controller().use_these_peers(vec![a.external_addr()]);
	b.start();

	wait_until("lane B to finish cold start", Duration::from_secs(30), || {
		b.is_sync_ready() && b.engine().count() == 1
	});

	// a fresh arrival on A...
	let fresh = sealed_tx(2);
	a.engine().add(fresh.clone(), true).unwrap();

	// ...reaches B through the next gossip poll, as a recent transaction
	wait_until("gossip to reach lane B", Duration::from_secs(30), || {
		b.engine().has(&fresh.digest)
	});
	wait_until("recent cache to surface the tx", Duration::from_secs(10), || {
		b.engine()
			.get_recent(u32::max_value())
			.iter()
			.any(|l| l.digest == fresh.digest)
	});

	a.stop();
	b.stop();
	clean_output_dir(test_dir);
}

/// Digests announced through the tx finder are fetched from peers with a
/// targeted request, even when no gossip poll is due.
#[test]
fn tx_finder_triggers_specific_fetch() {
	let test_dir = "test_output/sync_specific";
	setup(test_dir);

	let external = LocalNetwork::new();
	let internal_a = LocalNetwork::new();
	let internal_b = LocalNetwork::new();

	let mut a = LaneService::new(
		shard_config(test_dir, "a"),
		Mode::CreateDatabase,
		&external,
		&internal_a,
	)
	.unwrap();

	let bootstrap = sealed_tx(1);
	a.engine().add(bootstrap.clone(), false).unwrap();
	a.engine().confirm(bootstrap.digest);
	a.start();
	wait_until("lane A to archive bootstrap tx", Duration::from_secs(10), || {
		a.engine().archiver_counters().additions_total() == 1
	});

	// gossip polling effectively disabled: only the initial poll runs
	let mut cfg_b = shard_config(test_dir, "b");
	cfg_b.sync.fetch_object_wait_ms = 3_600_000;
	let mut b = LaneService::new(cfg_b, Mode::CreateDatabase, &external, &internal_b).unwrap();
	b.controller().use_these_peers(vec![a.external_addr()]);
	b.start();

	wait_until("lane B to finish cold start", Duration::from_secs(30), || {
		b.is_sync_ready() && b.engine().count() == 1
	});

	// a transaction B doesn't know about yet, sitting in A's pool
	let wanted = sealed_tx(2);
	a.engine().add(wanted.clone(), false).unwrap();

	// announcing the digest makes B fetch it directly
	let mut digests = weft_core::DigestSet::default();
	digests.insert(wanted.digest);
	b.tx_finder().issue_call_for_missing_txs(digests);

	wait_until("specific fetch to reach lane B", Duration::from_secs(30), || {
		b.engine().has(&wanted.digest)
	});

	a.stop();
	b.stop();
	clean_output_dir(test_dir);
}

/// Young entries survive a gossip-cache trim and are served to peers.
#[test]
fn gossip_cache_trim_keeps_young_entries() {
	let test_dir = "test_output/sync_trim";
	setup(test_dir);

	let external = LocalNetwork::new();
	let internal = LocalNetwork::new();
	let a = LaneService::new(
		shard_config(test_dir, "a"),
		Mode::CreateDatabase,
		&external,
		&internal,
	)
	.unwrap();

	let sync_protocol = a.sync_protocol();
	assert_eq!(sync_protocol.cache_size(), 0);

	a.engine().add(sealed_tx(1), true).unwrap();
	a.engine().add(sealed_tx(2), true).unwrap();
	assert_eq!(sync_protocol.cache_size(), 2);

	sync_protocol.trim_cache();
	assert_eq!(sync_protocol.cache_size(), 2);

	clean_output_dir(test_dir);
}
