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

use std::fs;
use std::sync::Arc;

use weft_core::{Digest, Transaction, TransactionBuilder};
use weft_pool::{Error, StoreMode, TransactionStorageEngine};
use weft_util as util;
use weft_util::{Mutex, Runnable};

fn clean_output_dir(test_dir: &str) {
	let _ = fs::remove_dir_all(test_dir);
}

fn setup(test_dir: &str) {
	util::init_test_logger();
	clean_output_dir(test_dir);
	fs::create_dir_all(test_dir).unwrap();
}

fn new_engine(test_dir: &str, log2_num_lanes: u32, lane: u32) -> TransactionStorageEngine {
	TransactionStorageEngine::new(
		log2_num_lanes,
		lane,
		format!("{}/transaction.db", test_dir),
		format!("{}/transaction_index.db", test_dir),
		StoreMode::Create,
	)
	.unwrap()
}

fn tx_with_digest_byte(byte: u8) -> Transaction {
	let mut bytes = [0u8; 32];
	bytes[0] = byte;
	TransactionBuilder::new()
		.valid_until(100)
		.signatory(b"id".to_vec(), b"sig".to_vec())
		.build_with_digest(Digest(bytes))
}

/// Runs archiver steps until the processed counter reaches `target`.
fn drive_archiver(engine: &TransactionStorageEngine, target: u64) {
	let archiver = engine.archiver();
	for _ in 0..1000 {
		if engine.archiver_counters().processed_total() >= target {
			return;
		}
		archiver.lock().execute();
	}
	panic!("archiver did not process {} confirmations", target);
}

#[test]
fn add_get_confirm_single() {
	let test_dir = "test_output/engine_confirm_single";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	let tx = tx_with_digest_byte(0xaa);
	let digest = tx.digest;
	engine.add(tx.clone(), true).unwrap();

	assert!(engine.has(&digest));
	assert!(!engine.is_archived(&digest));
	assert_eq!(engine.count(), 1);
	assert_eq!(engine.get(&digest).unwrap(), tx);

	engine.confirm(digest);
	assert_eq!(engine.archiver_counters().confirmed_total(), 1);

	// one step collects the batch, the next flushes the transaction
	let archiver = engine.archiver();
	archiver.lock().execute();
	archiver.lock().execute();

	assert!(engine.is_archived(&digest));
	// pool entry removed, archive entry added
	assert_eq!(engine.count(), 1);
	assert_eq!(engine.archiver_counters().additions_total(), 1);
	assert_eq!(engine.archiver_counters().lost_total(), 0);
	assert_eq!(engine.get(&digest).unwrap(), tx);

	clean_output_dir(test_dir);
}

#[test]
fn duplicate_confirmations_archive_once() {
	let test_dir = "test_output/engine_duplicate_confirm";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	let tx = tx_with_digest_byte(0x42);
	let digest = tx.digest;
	engine.add(tx, false).unwrap();

	engine.confirm(digest);
	engine.confirm(digest);
	drive_archiver(&engine, 2);

	let counters = engine.archiver_counters();
	assert_eq!(counters.confirmed_total(), 2);
	assert_eq!(counters.additions_total(), 1);
	assert_eq!(counters.duplicate_total(), 1);
	assert_eq!(counters.processed_total(), 2);
	assert!(engine.is_archived(&digest));
	assert_eq!(engine.count(), 1);

	clean_output_dir(test_dir);
}

#[test]
fn confirm_without_transaction_counts_lost() {
	let test_dir = "test_output/engine_lost";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	engine.confirm(Digest([0x77; 32]));
	drive_archiver(&engine, 1);

	assert_eq!(engine.archiver_counters().lost_total(), 1);
	assert_eq!(engine.archiver_counters().additions_total(), 0);

	clean_output_dir(test_dir);
}

#[test]
fn recent_transactions_flush_newest_first() {
	let test_dir = "test_output/engine_recent";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	for byte in 1..=10u8 {
		engine.add(tx_with_digest_byte(byte), true).unwrap();
	}

	let layouts = engine.get_recent(4);
	let first_bytes: Vec<u8> = layouts.iter().map(|l| l.digest.0[0]).collect();
	assert_eq!(first_bytes, vec![10, 9, 8, 7]);

	// flushed entries are gone
	let layouts = engine.get_recent(100);
	assert_eq!(layouts.len(), 6);

	clean_output_dir(test_dir);
}

#[test]
fn subtree_synced_transactions_skip_recent_cache() {
	let test_dir = "test_output/engine_subtree_flag";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	let mut tx = tx_with_digest_byte(0x11);
	tx.from_subtree_sync = true;
	let digest = tx.digest;

	engine.add(tx, true).unwrap();
	assert!(engine.get_recent(100).is_empty());
	assert!(engine.has(&digest));

	clean_output_dir(test_dir);
}

#[test]
fn add_not_recent_skips_recent_cache() {
	let test_dir = "test_output/engine_not_recent";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	engine.add(tx_with_digest_byte(0x12), false).unwrap();
	assert!(engine.get_recent(100).is_empty());

	clean_output_dir(test_dir);
}

#[test]
fn foreign_lane_transactions_are_rejected() {
	let test_dir = "test_output/engine_foreign_lane";
	setup(test_dir);
	// two lanes, this engine owns lane 0
	let engine = new_engine(test_dir, 1, 0);

	// top bit set routes to lane 1
	let tx = tx_with_digest_byte(0x80);
	let digest = tx.digest;
	match engine.add(tx, true) {
		Err(Error::ShardMismatch { tx_lane, lane }) => {
			assert_eq!(tx_lane, 1);
			assert_eq!(lane, 0);
		}
		other => panic!("expected shard mismatch, got {:?}", other),
	}
	assert!(!engine.has(&digest));
	assert_eq!(engine.count(), 0);

	// and a native one is accepted
	engine.add(tx_with_digest_byte(0x01), true).unwrap();
	assert_eq!(engine.count(), 1);

	clean_output_dir(test_dir);
}

#[test]
fn get_missing_is_not_found() {
	let test_dir = "test_output/engine_not_found";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	match engine.get(&Digest([0x01; 32])) {
		Err(Error::NotFound) => (),
		other => panic!("expected not found, got {:?}", other),
	}

	clean_output_dir(test_dir);
}

#[test]
fn new_tx_handler_sees_every_add() {
	let test_dir = "test_output/engine_hook";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	let seen: Arc<Mutex<Vec<Digest>>> = Arc::new(Mutex::new(vec![]));
	let seen_by_hook = seen.clone();
	engine.set_new_tx_handler(Box::new(move |tx| {
		seen_by_hook.lock().push(tx.digest);
	}));

	let mut subtree_tx = tx_with_digest_byte(2);
	subtree_tx.from_subtree_sync = true;

	engine.add(tx_with_digest_byte(1), true).unwrap();
	engine.add(subtree_tx, true).unwrap();
	engine.add(tx_with_digest_byte(3), false).unwrap();

	// the hook fires for every accepted transaction, recent or not
	let seen = seen.lock();
	assert_eq!(seen.len(), 3);
	assert_eq!(seen[0].0[0], 1);
	assert_eq!(seen[1].0[0], 2);
	assert_eq!(seen[2].0[0], 3);

	clean_output_dir(test_dir);
}

#[test]
fn idle_archiver_delays_itself() {
	let test_dir = "test_output/engine_idle";
	setup(test_dir);
	let engine = new_engine(test_dir, 0, 0);

	let archiver = engine.archiver();
	{
		let mut archiver = archiver.lock();
		assert!(archiver.is_ready_to_execute());
		archiver.execute();
		// nothing queued, the archiver deferred its next run
		assert!(!archiver.is_ready_to_execute());
		assert_eq!(archiver.state(), weft_pool::archiver::State::Collecting);
	}
	assert_eq!(engine.archiver_counters().processed_total(), 0);

	clean_output_dir(test_dir);
}
