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

//! The intra-node storage RPC surface, driven end to end over the
//! in-process transport.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use weft_core::ser;
use weft_core::{Digest, Transaction, TransactionBuilder, TransactionLayout};
use weft_p2p::{
	LocalNetwork, PeerAddr, Resolution, RpcClient, RpcServer, CHANNEL_RPC, SERVICE_TX_STORE,
};
use weft_pool::{StoreMode, TransactionStorageEngine};
use weft_servers::lane::storage_protocol::{
	TransactionStorageProtocol, ADD, GET, GET_COUNT, GET_RECENT, HAS,
};
use weft_util as util;
use weft_util::Runnable;

fn clean_output_dir(test_dir: &str) {
	let _ = fs::remove_dir_all(test_dir);
}

fn setup(test_dir: &str) {
	util::init_test_logger();
	clean_output_dir(test_dir);
	fs::create_dir_all(test_dir).unwrap();
}

fn sealed_tx(seed: u64) -> Transaction {
	TransactionBuilder::new()
		.valid_from(seed)
		.valid_until(seed + 100)
		.signatory(b"identity".to_vec(), b"signature".to_vec())
		.seal()
}

struct Harness {
	engine: Arc<TransactionStorageEngine>,
	client: RpcClient,
	server_addr: PeerAddr,
}

fn harness(test_dir: &str) -> Harness {
	let engine = Arc::new(
		TransactionStorageEngine::new(
			0,
			0,
			format!("{}/transaction.db", test_dir),
			format!("{}/transaction_index.db", test_dir),
			StoreMode::Create,
		)
		.unwrap(),
	);

	let network = LocalNetwork::new();
	let server_addr = PeerAddr::random();
	let server = Arc::new(RpcServer::new());
	server.add_service(
		SERVICE_TX_STORE,
		Arc::new(TransactionStorageProtocol::new(engine.clone(), 0)),
	);
	network.register(server_addr, server);

	let endpoint = network.endpoint(PeerAddr::random());
	let client = RpcClient::new(
		"ctrl",
		endpoint,
		SERVICE_TX_STORE,
		CHANNEL_RPC,
		Duration::from_secs(2),
	);

	Harness {
		engine,
		client,
		server_addr,
	}
}

fn resolve<T: ser::Readable>(promise: weft_p2p::PromiseOf<T>) -> Option<T> {
	for _ in 0..400 {
		match promise.poll() {
			Resolution::Pending => thread::sleep(Duration::from_millis(5)),
			Resolution::Complete(value) => return Some(value),
			Resolution::Failed => return None,
		}
	}
	panic!("promise never settled");
}

/// Empty response payloads decode into this.
struct Unit;

impl ser::Readable for Unit {
	fn read(_reader: &mut dyn ser::Reader) -> Result<Unit, ser::Error> {
		Ok(Unit)
	}
}

#[test]
fn add_has_get_count_over_rpc() {
	let test_dir = "test_output/storage_proto_roundtrip";
	setup(test_dir);
	let h = harness(test_dir);

	let tx = sealed_tx(1);
	let digest = tx.digest;

	// ADD
	let body = ser::ser_vec(&tx).unwrap();
	assert!(resolve(h.client.call::<Unit>(&h.server_addr, ADD, body)).is_some());
	assert!(h.engine.has(&digest));

	// internal adds are not fresh network arrivals
	assert!(h.engine.get_recent(100).is_empty());

	// HAS
	let body = ser::ser_vec(&digest).unwrap();
	let found = resolve::<u8>(h.client.call(&h.server_addr, HAS, body)).unwrap();
	assert_eq!(found, 1);

	// GET_COUNT
	let count = resolve::<u64>(h.client.call(&h.server_addr, GET_COUNT, vec![])).unwrap();
	assert_eq!(count, 1);

	// GET returns the stored transaction
	let body = ser::ser_vec(&digest).unwrap();
	let got = resolve::<Transaction>(h.client.call(&h.server_addr, GET, body)).unwrap();
	assert_eq!(got, tx);

	clean_output_dir(test_dir);
}

#[test]
fn get_schedules_archival() {
	let test_dir = "test_output/storage_proto_get_confirms";
	setup(test_dir);
	let h = harness(test_dir);

	let tx = sealed_tx(2);
	let digest = tx.digest;
	h.engine.add(tx, false).unwrap();
	assert!(!h.engine.is_archived(&digest));

	let body = ser::ser_vec(&digest).unwrap();
	resolve::<Transaction>(h.client.call(&h.server_addr, GET, body)).unwrap();

	// the lookup confirmed the transaction; draining the archiver moves it
	// to the durable store
	let archiver = h.engine.archiver();
	for _ in 0..10 {
		archiver.lock().execute();
		if h.engine.is_archived(&digest) {
			break;
		}
	}
	assert!(h.engine.is_archived(&digest));
	assert_eq!(h.engine.archiver_counters().additions_total(), 1);

	clean_output_dir(test_dir);
}

#[test]
fn get_missing_fails_the_promise() {
	let test_dir = "test_output/storage_proto_get_missing";
	setup(test_dir);
	let h = harness(test_dir);

	let body = ser::ser_vec(&Digest([9; 32])).unwrap();
	assert!(resolve::<Transaction>(h.client.call(&h.server_addr, GET, body)).is_none());

	clean_output_dir(test_dir);
}

#[test]
fn get_recent_returns_layouts() {
	let test_dir = "test_output/storage_proto_get_recent";
	setup(test_dir);
	let h = harness(test_dir);

	let txs: Vec<Transaction> = (0..3).map(sealed_tx).collect();
	for tx in &txs {
		h.engine.add(tx.clone(), true).unwrap();
	}

	let body = ser::ser_vec(&10u32).unwrap();
	let layouts =
		resolve::<Vec<TransactionLayout>>(h.client.call(&h.server_addr, GET_RECENT, body))
			.unwrap();

	// newest first
	assert_eq!(layouts.len(), 3);
	assert_eq!(layouts[0].digest, txs[2].digest);
	assert_eq!(layouts[2].digest, txs[0].digest);

	clean_output_dir(test_dir);
}
