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

use weft_core::ser;
use weft_core::transaction::Error;
use weft_core::{
	Address, BitVector, ContractPayload, Digest, Transaction, TransactionBuilder,
	TransactionLayout,
};

fn sample_tx() -> Transaction {
	let mut mask = BitVector::new(4);
	mask.set(1);
	mask.set(2);
	TransactionBuilder::new()
		.from(Address::from_vec(b"sender"))
		.transfer(Address::from_vec(b"receiver-one"), 250)
		.transfer(Address::from_vec(b"receiver-two"), 17)
		.valid_from(10)
		.valid_until(110)
		.charge_rate(2)
		.charge_limit(500)
		.contract(ContractPayload::ChainCode {
			name: "token.transfer".to_owned(),
		})
		.action(b"transfer".to_vec())
		.shard_mask(mask)
		.data(b"opaque-payload".to_vec())
		.signatory(b"identity-a".to_vec(), b"signature-a".to_vec())
		.seal()
}

#[test]
fn seal_computes_matching_digest() {
	let tx = sample_tx();
	assert_eq!(tx.digest, tx.compute_digest());
	assert!(tx.verify().is_ok());
}

#[test]
fn wire_round_trip() {
	let tx = sample_tx();
	let buf = ser::ser_vec(&tx).unwrap();
	let restored: Transaction = ser::deserialize(&mut &buf[..]).unwrap();

	assert_eq!(restored, tx);
	assert_eq!(restored.digest, tx.digest);
	assert_eq!(restored.transfers.len(), 2);
	assert_eq!(restored.transfers[1].amount, 17);
	assert_eq!(restored.signatories, tx.signatories);
	assert!(!restored.from_subtree_sync);
	assert!(restored.verify().is_ok());
}

#[test]
fn subtree_sync_flag_not_serialized() {
	let mut tx = sample_tx();
	tx.from_subtree_sync = true;
	let buf = ser::ser_vec(&tx).unwrap();
	let restored: Transaction = ser::deserialize(&mut &buf[..]).unwrap();
	assert!(!restored.from_subtree_sync);
}

#[test]
fn verify_rejects_tampered_payload() {
	let mut tx = sample_tx();
	tx.charge_limit += 1;
	assert_eq!(tx.verify(), Err(Error::DigestMismatch));
}

#[test]
fn verify_rejects_missing_signatories() {
	let tx = TransactionBuilder::new()
		.valid_from(0)
		.valid_until(100)
		.seal();
	assert_eq!(tx.verify(), Err(Error::NoSignatories));
}

#[test]
fn verify_rejects_empty_validity_window() {
	let tx = TransactionBuilder::new()
		.valid_from(50)
		.valid_until(50)
		.signatory(b"id".to_vec(), b"sig".to_vec())
		.seal();
	assert_eq!(tx.verify(), Err(Error::InvalidValidityWindow));
}

#[test]
fn layout_projection() {
	let tx = sample_tx();
	let layout = TransactionLayout::new(&tx, 2);

	assert_eq!(layout.digest, tx.digest);
	assert_eq!(layout.charge_rate, 2);
	assert_eq!(layout.valid_from, 10);
	assert_eq!(layout.valid_until, 110);
	assert_eq!(layout.mask.len(), 4);
	assert!(layout.mask.bit(1) && layout.mask.bit(2));

	// layouts travel over the recent-transaction RPC
	let buf = ser::ser_vec(&layout).unwrap();
	let restored: TransactionLayout = ser::deserialize(&mut &buf[..]).unwrap();
	assert_eq!(restored, layout);
}

#[test]
fn builder_with_supplied_digest() {
	let digest = Digest::from_vec(&[0xaa; 32]);
	let tx = TransactionBuilder::new()
		.valid_until(1)
		.build_with_digest(digest);
	assert_eq!(tx.digest, digest);
}
