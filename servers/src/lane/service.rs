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

//! One service per lane. Owns the storage engine and its on-disk files,
//! registers the intra-node and peer-facing protocols on their RPC
//! servers, wires the engine's new-transaction hook into the gossip cache
//! and drives the archiver and sync service through a reactor.

use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use weft_p2p::{
	Endpoint, LocalEndpoint, LocalNetwork, PeerAddr, RpcServer, SERVICE_CONTROLLER,
	SERVICE_MISSING_TX_FINDER, SERVICE_TX_STORE, SERVICE_TX_STORE_SYNC,
};
use weft_pool::{StoreMode, TransactionStorageEngine};
use weft_util::{Mutex, Reactor};

use crate::common::types::{Error, ShardConfig};
use crate::lane::controller::{LaneController, LaneControllerProtocol};
use crate::lane::storage_protocol::TransactionStorageProtocol;
use crate::lane::sync_protocol::TransactionSyncProtocol;
use crate::lane::sync_service::TransactionSyncService;
use crate::lane::tx_finder::TxFinderProtocol;

/// Whether the lane's database is created fresh or loaded from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
	/// Start from empty storage files
	CreateDatabase,
	/// Load existing storage files, creating them when missing
	LoadDatabase,
}

fn generate_prefix(storage_path: &str, lane: u32) -> String {
	format!("{}_lane{:03}_", storage_path, lane)
}

/// A complete lane service: storage engine, protocols, verifier and sync.
pub struct LaneService {
	cfg: ShardConfig,
	engine: Arc<TransactionStorageEngine>,
	reactor: Reactor,

	external_endpoint: Arc<LocalEndpoint>,
	controller: Arc<LaneController>,
	tx_finder: Arc<TxFinderProtocol>,
	sync_protocol: Arc<TransactionSyncProtocol>,
	sync_service: Arc<Mutex<TransactionSyncService>>,
	sync_ready: Arc<AtomicBool>,
}

impl LaneService {
	/// Build the lane service. The external network carries peer sync
	/// traffic, the internal one the node's own control RPC.
	pub fn new(
		cfg: ShardConfig,
		mode: Mode,
		external_net: &Arc<LocalNetwork>,
		internal_net: &Arc<LocalNetwork>,
	) -> Result<LaneService, Error> {
		let lane = cfg.lane_id;
		let prefix = generate_prefix(&cfg.storage_path, lane);

		let store_mode = match mode {
			Mode::CreateDatabase => StoreMode::Create,
			Mode::LoadDatabase => StoreMode::Load,
		};
		let engine = Arc::new(TransactionStorageEngine::new(
			cfg.log2_num_lanes(),
			lane,
			format!("{}transaction.db", prefix),
			format!("{}transaction_index.db", prefix),
			store_mode,
		)?);

		let external_addr = PeerAddr::random();
		let internal_addr = PeerAddr::random();
		let external_endpoint = external_net.endpoint(external_addr);
		let external_server = Arc::new(RpcServer::new());
		external_net.register(external_addr, external_server.clone());
		let internal_server = Arc::new(RpcServer::new());
		internal_net.register(internal_addr, internal_server.clone());

		// intra-node storage access for the controller
		let storage_protocol = Arc::new(TransactionStorageProtocol::new(engine.clone(), lane));
		internal_server.add_service(SERVICE_TX_STORE, storage_protocol);

		// lane controller
		let controller = Arc::new(LaneController::new(external_endpoint.clone()));
		internal_server.add_service(
			SERVICE_CONTROLLER,
			Arc::new(LaneControllerProtocol::new(controller.clone())),
		);

		// missing-transaction announcements
		let tx_finder = Arc::new(TxFinderProtocol::new());
		internal_server.add_service(SERVICE_MISSING_TX_FINDER, tx_finder.clone());

		// peer-facing sync surface
		let sync_protocol = Arc::new(TransactionSyncProtocol::new(engine.clone(), lane));
		external_server.add_service(SERVICE_TX_STORE_SYNC, sync_protocol.clone());

		// every accepted transaction becomes visible to polling peers
		let gossip = sync_protocol.clone();
		engine.set_new_tx_handler(Box::new(move |tx| gossip.on_new_tx(tx)));

		let trim = sync_protocol.clone();
		let sync_service = TransactionSyncService::new(
			cfg.clone(),
			external_endpoint.clone(),
			engine.clone(),
			tx_finder.clone(),
			Box::new(move || trim.trim_cache()),
		);
		let sync_ready = sync_service.ready_flag();
		let sync_service = Arc::new(Mutex::new(sync_service));

		let mut reactor = Reactor::new(&format!("lane-{}", lane));
		engine.attach_to_reactor(&mut reactor);
		reactor.attach(sync_service.clone());

		info!("lane {} initialised", lane);

		Ok(LaneService {
			cfg,
			engine,
			reactor,
			external_endpoint,
			controller,
			tx_finder,
			sync_protocol,
			sync_service,
			sync_ready,
		})
	}

	/// Start the verifier pipeline and the reactor workers. Idempotent.
	pub fn start(&mut self) {
		info!(
			"starting lane {} service at {:?}",
			self.cfg.lane_id,
			self.external_endpoint.local_addr()
		);
		self.sync_service.lock().start();
		self.reactor.start();
	}

	/// Stop the reactor and the verifier, joining all workers. Idempotent.
	pub fn stop(&mut self) {
		self.reactor.stop();
		self.sync_service.lock().stop();
		info!("lane {} service stopped", self.cfg.lane_id);
	}

	/// Whether the sync service has completed its subtree phase.
	pub fn is_sync_ready(&self) -> bool {
		self.sync_ready.load(Ordering::Relaxed)
	}

	/// This lane's storage engine.
	pub fn engine(&self) -> Arc<TransactionStorageEngine> {
		self.engine.clone()
	}

	/// This lane's controller.
	pub fn controller(&self) -> Arc<LaneController> {
		self.controller.clone()
	}

	/// This lane's missing-transaction finder.
	pub fn tx_finder(&self) -> Arc<TxFinderProtocol> {
		self.tx_finder.clone()
	}

	/// This lane's peer-facing sync protocol.
	pub fn sync_protocol(&self) -> Arc<TransactionSyncProtocol> {
		self.sync_protocol.clone()
	}

	/// The lane's address on the external network.
	pub fn external_addr(&self) -> PeerAddr {
		self.external_endpoint.local_addr()
	}

	/// The lane's configuration.
	pub fn config(&self) -> &ShardConfig {
		&self.cfg
	}
}
