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

//! Client side of transaction synchronization. A state machine drives the
//! three flows that keep a lane aligned with its peers: a bulk subtree
//! download on cold start, a periodic poll of peers' recent-transaction
//! caches in steady state, and point requests for digests local consumers
//! explicitly asked for. Every response is funnelled through the verifier
//! before it reaches the storage engine.
//!
//! ```text
//!  INITIAL
//!    │  peers > 0
//!    ▼
//!  QUERY_OBJECT_COUNTS ──▶ RESOLVING_OBJECT_COUNTS
//!                               │  (no objects: sleep, retry)
//!                               ▼
//!                          QUERY_SUBTREE ⇆ RESOLVING_SUBTREE
//!                               │  (all roots fetched)
//!                               ▼
//!                          QUERY_OBJECTS ⇆ RESOLVING_OBJECTS
//!                               │
//!                               ▼
//!                           TRIM_CACHE ─▶ QUERY_OBJECTS
//! ```

use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use weft_core::{log2_ceil, Digest, DigestSet, Transaction};
use weft_p2p::{
	Endpoint, PeerAddr, RequestingQueue, RpcClient, CHANNEL_RPC, SERVICE_TX_STORE_SYNC,
};
use weft_pool::TransactionStorageEngine;
use weft_util::{FutureTimepoint, Runnable, StateMachine};

use weft_core::ser;

use crate::common::sinks::TransactionSink;
use crate::common::types::ShardConfig;
use crate::lane::sync_protocol;
use crate::lane::tx_finder::TxFinderProtocol;
use crate::lane::verifier::TransactionVerifier;

/// Completed object-count promises handled per resolve cycle.
pub const MAX_OBJECT_COUNT_RESOLUTION_PER_CYCLE: usize = 128;
/// Completed subtree promises handled per resolve cycle.
pub const MAX_SUBTREE_RESOLUTION_PER_CYCLE: usize = 128;
/// Completed object promises handled per resolve cycle.
pub const MAX_OBJECT_RESOLUTION_PER_CYCLE: usize = 128;
/// Most digests drained from the tx finder per query pass.
pub const TX_FINDER_PROTO_LIMIT: usize = 1000;
/// In-flight subtree requests allowed per connected peer.
const MAX_REQUESTS_PER_NODE: usize = 2;
/// Upper bound on the subtree fan-out; bounds the root queue even when a
/// peer advertises an absurd object count.
const MAX_ROOT_SIZE: u64 = 12;

/// Pause between polling passes while promises are in flight.
const RESOLVE_DELAY: Duration = Duration::from_millis(10);
/// Pause between object-count polling passes.
const OBJECT_COUNT_RESOLVE_DELAY: Duration = Duration::from_millis(20);
/// Pause before re-querying counts when the network holds no objects.
const EMPTY_NETWORK_DELAY: Duration = Duration::from_millis(2000);
/// Pause while waiting for the first peer connection.
const AWAITING_PEERS_DELAY: Duration = Duration::from_millis(100);

/// Sync service state machine states.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
	/// Waiting for at least one connected peer
	Initial,
	/// Fanning out object-count queries
	QueryObjectCounts,
	/// Collecting object-count responses
	ResolvingObjectCounts,
	/// Requesting subtree roots from peers
	QuerySubtree,
	/// Collecting subtree responses
	ResolvingSubtree,
	/// Steady state: gossip polls and explicit requests
	QueryObjects,
	/// Collecting gossip / explicit-request responses
	ResolvingObjects,
	/// Expiring old entries from the recent-gossip cache
	TrimCache,
}

impl fmt::Display for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			State::Initial => "Initial",
			State::QueryObjectCounts => "Query Object Counts",
			State::ResolvingObjectCounts => "Resolving Object Counts",
			State::QuerySubtree => "Query Subtree",
			State::ResolvingSubtree => "Resolving Subtree",
			State::QueryObjects => "Query Objects",
			State::ResolvingObjects => "Resolving Objects",
			State::TrimCache => "Trim Cache",
		};
		write!(f, "{}", text)
	}
}

/// Monotonic counters exposed by the sync service.
#[derive(Default)]
pub struct SyncCounters {
	stored_transactions: AtomicU64,
	resolve_count_failures: AtomicU64,
	subtree_requests: AtomicU64,
	subtree_responses: AtomicU64,
	subtree_failures: AtomicU64,
}

impl SyncCounters {
	/// Verified transactions accepted into storage through sync.
	pub fn stored_transactions_total(&self) -> u64 {
		self.stored_transactions.load(Ordering::Relaxed)
	}
	/// Failed object-count queries.
	pub fn resolve_count_failures_total(&self) -> u64 {
		self.resolve_count_failures.load(Ordering::Relaxed)
	}
	/// Subtree requests issued.
	pub fn subtree_requests_total(&self) -> u64 {
		self.subtree_requests.load(Ordering::Relaxed)
	}
	/// Successful subtree responses.
	pub fn subtree_responses_total(&self) -> u64 {
		self.subtree_responses.load(Ordering::Relaxed)
	}
	/// Failed subtree requests (retried).
	pub fn subtree_failures_total(&self) -> u64 {
		self.subtree_failures.load(Ordering::Relaxed)
	}
}

/// The one [`TransactionSink`] implementation: verified transactions land
/// in the storage engine unless the lane already holds them.
struct StoreSink {
	storage: Arc<TransactionStorageEngine>,
	counters: Arc<SyncCounters>,
}

impl TransactionSink for StoreSink {
	fn on_transaction(&self, tx: Transaction) {
		if self.storage.has(&tx.digest) {
			return;
		}
		let digest = tx.digest;
		// the transaction is recent unless it arrived through subtree sync
		let is_recent = !tx.from_subtree_sync;
		match self.storage.add(tx, is_recent) {
			Ok(()) => {
				trace!("sync: stored verified tx 0x{}", digest.to_hex());
				self.counters
					.stored_transactions
					.fetch_add(1, Ordering::Relaxed);
			}
			Err(e) => warn!("sync: dropping verified tx 0x{}: {}", digest.to_hex(), e),
		}
	}
}

/// Drives one lane's outbound synchronization.
pub struct TransactionSyncService {
	lane: u32,
	cfg: ShardConfig,
	endpoint: Arc<dyn Endpoint>,
	client: RpcClient,
	storage: Arc<TransactionStorageEngine>,
	tx_finder: Arc<TxFinderProtocol>,
	trim_cache_callback: Box<dyn Fn() + Send>,
	verifier: TransactionVerifier,

	sm: StateMachine<State>,
	promise_wait_timeout: FutureTimepoint,
	fetch_object_wait_timeout: FutureTimepoint,

	pending_object_count: RequestingQueue<PeerAddr, u64>,
	max_object_count: u64,

	pending_subtree: RequestingQueue<u64, Vec<Transaction>>,
	pending_objects: RequestingQueue<PeerAddr, Vec<Transaction>>,

	roots_to_sync: VecDeque<u64>,
	root_size: u64,

	is_ready: Arc<AtomicBool>,
	counters: Arc<SyncCounters>,
}

impl TransactionSyncService {
	/// New sync service for the lane described by `cfg`, pulling peers
	/// from `endpoint` and storing through `storage`.
	pub fn new(
		cfg: ShardConfig,
		endpoint: Arc<dyn Endpoint>,
		storage: Arc<TransactionStorageEngine>,
		tx_finder: Arc<TxFinderProtocol>,
		trim_cache_callback: Box<dyn Fn() + Send>,
	) -> TransactionSyncService {
		let lane = cfg.lane_id;
		let counters = Arc::new(SyncCounters::default());

		let sink = Arc::new(StoreSink {
			storage: storage.clone(),
			counters: counters.clone(),
		});
		let verifier = TransactionVerifier::new(
			sink,
			cfg.verification_threads,
			&format!("TxV-L{}", lane),
		);

		let client = RpcClient::new(
			&format!("TxSync-L{}", lane),
			endpoint.clone(),
			SERVICE_TX_STORE_SYNC,
			CHANNEL_RPC,
			cfg.sync.promise_wait_timeout(),
		);

		TransactionSyncService {
			lane,
			cfg,
			endpoint,
			client,
			storage,
			tx_finder,
			trim_cache_callback,
			verifier,
			sm: StateMachine::new(&format!("TxSyncService-L{}", lane), State::Initial),
			promise_wait_timeout: FutureTimepoint::new(),
			fetch_object_wait_timeout: FutureTimepoint::new(),
			pending_object_count: RequestingQueue::new(),
			max_object_count: 0,
			pending_subtree: RequestingQueue::new(),
			pending_objects: RequestingQueue::new(),
			roots_to_sync: VecDeque::new(),
			root_size: 0,
			is_ready: Arc::new(AtomicBool::new(false)),
			counters,
		}
	}

	/// Start the verifier pipeline.
	pub fn start(&mut self) {
		self.verifier.start();
	}

	/// Stop the verifier pipeline, joining its threads.
	pub fn stop(&mut self) {
		self.verifier.stop();
	}

	/// Whether the service has completed subtree sync at least once.
	pub fn is_ready(&self) -> bool {
		self.is_ready.load(Ordering::Relaxed)
	}

	/// A shared handle onto the readiness flag.
	pub fn ready_flag(&self) -> Arc<AtomicBool> {
		self.is_ready.clone()
	}

	/// The current state machine state.
	pub fn state(&self) -> State {
		self.sm.state()
	}

	/// The service's counters.
	pub fn counters(&self) -> Arc<SyncCounters> {
		self.counters.clone()
	}

	fn on_initial(&mut self) -> State {
		if self.endpoint.connected_peers().is_empty() {
			self.sm.delay(AWAITING_PEERS_DELAY);
			return State::Initial;
		}
		State::QueryObjectCounts
	}

	fn on_query_object_counts(&mut self) -> State {
		for peer in self.endpoint.connected_peers() {
			debug!("lane {}: querying object count from {:?}", self.lane, peer);
			let promise = self
				.client
				.call(&peer, sync_protocol::OBJECT_COUNT, vec![]);
			self.pending_object_count.add(peer, promise);
		}

		self.max_object_count = 0;
		self.promise_wait_timeout.set(self.cfg.sync.main_timeout());

		State::ResolvingObjectCounts
	}

	fn on_resolving_object_counts(&mut self) -> State {
		let counts = self.pending_object_count.resolve();
		let completed = self
			.pending_object_count
			.take_completed(MAX_OBJECT_COUNT_RESOLUTION_PER_CYCLE);
		self.pending_object_count.discard_failures();

		for (_peer, count) in completed {
			self.max_object_count = self.max_object_count.max(count);
		}

		if counts.failed > 0 {
			error!(
				"lane {}: failed object count promises: {}",
				self.lane, counts.failed
			);
			self.counters
				.resolve_count_failures
				.fetch_add(counts.failed as u64, Ordering::Relaxed);
		}

		if counts.pending > 0 {
			debug!(
				"lane {}: still waiting for {} object count promises",
				self.lane, counts.pending
			);
			if !self.promise_wait_timeout.is_due() {
				self.sm.delay(OBJECT_COUNT_RESOLVE_DELAY);
				return State::ResolvingObjectCounts;
			}
			warn!(
				"lane {}: still pending {} object count promises, but timed out",
				self.lane, counts.pending
			);
		}

		// With objects to sync from the network, fetch the space as 2^n
		// roots queried from the peers in parallel, where each root is the
		// set of all digests starting with that n-bit prefix.
		if self.max_object_count == 0 {
			info!(
				"lane {}: network appears to have no transactions, peers: {}",
				self.lane,
				self.endpoint.connected_peers().len()
			);
		} else {
			info!(
				"lane {}: expected tx count to sync: {}",
				self.lane, self.max_object_count
			);

			let computed = log2_ceil(
				self.max_object_count / sync_protocol::PULL_LIMIT as u64 + 1,
			) + 1;
			self.root_size = computed.min(MAX_ROOT_SIZE);
			if self.root_size < computed {
				warn!(
					"lane {}: clamping subtree fan-out from {} to {} bits",
					self.lane, computed, self.root_size
				);
			}
			for root in 0..(1u64 << self.root_size) {
				self.roots_to_sync.push_back(root);
			}
		}

		if self.roots_to_sync.is_empty() {
			self.sm.delay(EMPTY_NETWORK_DELAY);
			return State::QueryObjectCounts;
		}

		State::QuerySubtree
	}

	fn on_query_subtree(&mut self) -> State {
		let peers = self.endpoint.connected_peers();
		let orig_num_of_roots = self.roots_to_sync.len();

		let maximum_inflight = MAX_REQUESTS_PER_NODE * peers.len();
		let total_inflight = self.pending_subtree.num_pending();
		let roots_to_query = maximum_inflight.saturating_sub(total_inflight);

		let mut requests_made = 0;
		for peer in peers {
			if requests_made >= roots_to_query {
				break;
			}
			let root = match self.roots_to_sync.pop_front() {
				Some(root) => root,
				None => break,
			};

			let prefix = Digest::from_subtree_root(root, self.root_size);
			let mut body = vec![];
			ser::serialize(&mut body, &prefix).expect("in-memory serialization failed");
			ser::serialize(&mut body, &self.root_size).expect("in-memory serialization failed");

			let promise = self
				.client
				.call(&peer, sync_protocol::PULL_SUBTREE, body);
			self.pending_subtree.add(root, promise);
			self.counters.subtree_requests.fetch_add(1, Ordering::Relaxed);
			requests_made += 1;
		}

		self.promise_wait_timeout
			.set(self.cfg.sync.promise_wait_timeout());

		info!(
			"lane {}: querying subtree: requested {} root(s), remaining {} / {}",
			self.lane,
			orig_num_of_roots - self.roots_to_sync.len(),
			self.roots_to_sync.len(),
			1u64 << self.root_size
		);

		State::ResolvingSubtree
	}

	fn on_resolving_subtree(&mut self) -> State {
		let counts = self.pending_subtree.resolve();

		let mut synced_tx = 0;
		for (root, txs) in self
			.pending_subtree
			.take_completed(MAX_SUBTREE_RESOLUTION_PER_CYCLE)
		{
			debug!(
				"lane {}: got {} subtree objects for root {}",
				self.lane,
				txs.len(),
				root
			);
			for mut tx in txs {
				tx.from_subtree_sync = true;
				self.verifier.add_transaction(tx);
				synced_tx += 1;
			}
			self.counters
				.subtree_responses
				.fetch_add(1, Ordering::Relaxed);
		}

		if synced_tx != 0 {
			info!("lane {}: incorporated {} txs", self.lane, synced_tx);
		}

		if counts.failed > 0 {
			warn!(
				"lane {}: failed subtree promises count {}",
				self.lane, counts.failed
			);
			for root in self
				.pending_subtree
				.take_failed(MAX_SUBTREE_RESOLUTION_PER_CYCLE)
			{
				self.roots_to_sync.push_back(root);
			}
			self.counters
				.subtree_failures
				.fetch_add(counts.failed as u64, Ordering::Relaxed);
		}

		// syncing is only complete once every root resolved and nothing is
		// in flight
		let is_subtree_sync_complete = self.roots_to_sync.is_empty() && counts.pending == 0;
		if !is_subtree_sync_complete {
			self.sm.delay(RESOLVE_DELAY);
			return State::QuerySubtree;
		}

		info!("lane {}: completed sub-tree syncing", self.lane);

		State::QueryObjects
	}

	fn on_query_objects(&mut self) -> State {
		let mut digests = DigestSet::default();
		while digests.len() < TX_FINDER_PROTO_LIMIT {
			match self.tx_finder.pop() {
				Some(digest) => {
					digests.insert(digest);
				}
				None => break,
			}
		}

		let need_to_request_specific = !digests.is_empty();
		let is_time_to_pull =
			self.fetch_object_wait_timeout.is_due() && !need_to_request_specific;

		// hold here until it is either time for a regular gossip poll or a
		// specific request is queued
		if !need_to_request_specific && !is_time_to_pull {
			self.sm.delay(RESOLVE_DELAY);
			return State::QueryObjects;
		}

		let digests: Vec<Digest> = digests.into_iter().collect();
		for peer in self.endpoint.connected_peers() {
			if is_time_to_pull {
				debug!(
					"lane {}: periodically requesting recent txs from {:?}",
					self.lane, peer
				);
				let promise = self
					.client
					.call(&peer, sync_protocol::PULL_OBJECTS, vec![]);
				self.pending_objects.add(peer, promise);
			}

			if need_to_request_specific {
				info!(
					"lane {}: explicitly requesting {} txs from {:?}",
					self.lane,
					digests.len(),
					peer
				);
				let body = ser::ser_vec(&digests).expect("in-memory serialization failed");
				let promise = self
					.client
					.call(&peer, sync_protocol::PULL_SPECIFIC_OBJECTS, body);
				self.pending_objects.add(peer, promise);
			}
		}

		self.promise_wait_timeout
			.set(self.cfg.sync.promise_wait_timeout());
		if is_time_to_pull {
			self.fetch_object_wait_timeout
				.set(self.cfg.sync.fetch_object_wait_duration());
		}

		self.is_ready.store(true, Ordering::Relaxed);

		State::ResolvingObjects
	}

	fn on_resolving_objects(&mut self) -> State {
		let counts = self.pending_objects.resolve();

		let mut synced_tx = 0;
		for (peer, txs) in self
			.pending_objects
			.take_completed(MAX_OBJECT_RESOLUTION_PER_CYCLE)
		{
			if !txs.is_empty() {
				debug!(
					"lane {}: got {} objects from {:?}",
					self.lane,
					txs.len(),
					peer
				);
			}
			for tx in txs {
				self.verifier.add_transaction(tx);
				synced_tx += 1;
			}
		}

		if synced_tx != 0 {
			debug!("lane {}: synchronised {} requested txs", self.lane, synced_tx);
		}

		if counts.pending > 0 {
			if !self.promise_wait_timeout.is_due() {
				self.sm.delay(RESOLVE_DELAY);
				return State::ResolvingObjects;
			}
			warn!(
				"lane {}: still pending object promises but timeout approached",
				self.lane
			);
		}

		if counts.failed != 0 {
			warn!("lane {}: failed promises: {}", self.lane, counts.failed);
			self.pending_objects.discard_failures();
		}

		State::TrimCache
	}

	fn on_trim_cache(&mut self) -> State {
		(self.trim_cache_callback)();
		State::QueryObjects
	}
}

impl Runnable for TransactionSyncService {
	fn name(&self) -> String {
		format!("TxSyncService-L{}", self.lane)
	}

	fn is_ready_to_execute(&self) -> bool {
		self.sm.is_ready()
	}

	fn execute(&mut self) {
		let next = match self.sm.state() {
			State::Initial => self.on_initial(),
			State::QueryObjectCounts => self.on_query_object_counts(),
			State::ResolvingObjectCounts => self.on_resolving_object_counts(),
			State::QuerySubtree => self.on_query_subtree(),
			State::ResolvingSubtree => self.on_resolving_subtree(),
			State::QueryObjects => self.on_query_objects(),
			State::ResolvingObjects => self.on_resolving_objects(),
			State::TrimCache => self.on_trim_cache(),
		};
		self.sm.transition(next);
	}
}
