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

//! Transactions and their metadata-only layout projection.
//!
//! A transaction is stored and forwarded as an opaque verified record plus
//! its digest. The digest is the blake2b-256 hash of the canonical payload
//! (every field below except the digest itself and the transient
//! `from_subtree_sync` marker) and the wire encoding carries it explicitly
//! so every copy of a transaction is byte-stable.

use crate::bitvec::BitVector;
use crate::digest::{digest_of, Digest, ZERO_DIGEST};
use crate::ser::{self, BinWriter, Readable, Reader, Writeable, Writer};
use failure::Fail;
use std::fmt;

use weft_util as util;

/// Size of an account address in bytes.
pub const ADDRESS_SIZE: usize = 32;

/// Errors from structural transaction validation.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// The digest field doesn't match the hash of the payload
	#[fail(display = "transaction digest does not match its payload")]
	DigestMismatch,
	/// No signatories attached
	#[fail(display = "transaction carries no signatories")]
	NoSignatories,
	/// The validity window is empty or inverted
	#[fail(display = "transaction validity window is empty")]
	InvalidValidityWindow,
}

/// An account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
	/// Builds an Address from a byte slice, zero-padding or truncating.
	pub fn from_vec(v: &[u8]) -> Address {
		let mut bytes = [0; ADDRESS_SIZE];
		let copy_len = v.len().min(ADDRESS_SIZE);
		bytes[..copy_len].copy_from_slice(&v[..copy_len]);
		Address(bytes)
	}

	/// The address as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", util::to_hex(&self.0))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &util::to_hex(&self.0)[..12])
	}
}

impl Writeable for Address {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Address {
	fn read(reader: &mut dyn Reader) -> Result<Address, ser::Error> {
		let bytes = reader.read_fixed_bytes(ADDRESS_SIZE)?;
		Ok(Address::from_vec(&bytes))
	}
}

/// A single token transfer inside a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
	/// Receiving address
	pub to: Address,
	/// Amount moved
	pub amount: u64,
}

impl Writeable for Transfer {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.to.write(writer)?;
		writer.write_u64(self.amount)
	}
}

impl Readable for Transfer {
	fn read(reader: &mut dyn Reader) -> Result<Transfer, ser::Error> {
		Ok(Transfer {
			to: Address::read(reader)?,
			amount: reader.read_u64()?,
		})
	}
}

/// An identity that signed the transaction, with its signature over the
/// canonical payload. The engine treats both fields as opaque bytes;
/// checking the signature is the verifier backend's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signatory {
	/// Public identity of the signer
	pub identity: Vec<u8>,
	/// Signature bytes
	pub signature: Vec<u8>,
}

impl Writeable for Signatory {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_bytes(&self.identity)?;
		writer.write_bytes(&self.signature)
	}
}

impl Readable for Signatory {
	fn read(reader: &mut dyn Reader) -> Result<Signatory, ser::Error> {
		Ok(Signatory {
			identity: reader.read_bytes_len_prefix()?,
			signature: reader.read_bytes_len_prefix()?,
		})
	}
}

/// What kind of contract, if any, the transaction targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractPayload {
	/// Plain transfer, no contract involved
	None,
	/// A chain-code contract addressed by name
	ChainCode {
		/// Registered chain-code name
		name: String,
	},
	/// A deployed smart contract addressed by code digest and owner
	SmartContract {
		/// Digest of the contract code
		digest: Digest,
		/// Address the contract instance lives at
		address: Address,
	},
}

const CONTRACT_NONE: u8 = 0;
const CONTRACT_CHAIN_CODE: u8 = 1;
const CONTRACT_SMART_CONTRACT: u8 = 2;

impl Writeable for ContractPayload {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self {
			ContractPayload::None => writer.write_u8(CONTRACT_NONE),
			ContractPayload::ChainCode { name } => {
				writer.write_u8(CONTRACT_CHAIN_CODE)?;
				writer.write_bytes(name.as_bytes())
			}
			ContractPayload::SmartContract { digest, address } => {
				writer.write_u8(CONTRACT_SMART_CONTRACT)?;
				digest.write(writer)?;
				address.write(writer)
			}
		}
	}
}

impl Readable for ContractPayload {
	fn read(reader: &mut dyn Reader) -> Result<ContractPayload, ser::Error> {
		match reader.read_u8()? {
			CONTRACT_NONE => Ok(ContractPayload::None),
			CONTRACT_CHAIN_CODE => {
				let name = reader.read_bytes_len_prefix()?;
				let name =
					String::from_utf8(name).map_err(|_| ser::Error::CorruptedData)?;
				Ok(ContractPayload::ChainCode { name })
			}
			CONTRACT_SMART_CONTRACT => Ok(ContractPayload::SmartContract {
				digest: Digest::read(reader)?,
				address: Address::read(reader)?,
			}),
			_ => Err(ser::Error::CorruptedData),
		}
	}
}

/// A verified ledger transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
	/// Canonical hash of the payload, primary key everywhere
	pub digest: Digest,
	/// Originating address
	pub from: Address,
	/// Token transfers carried by this transaction
	pub transfers: Vec<Transfer>,
	/// First block index at which the transaction is valid
	pub valid_from: u64,
	/// Block index after which the transaction expires
	pub valid_until: u64,
	/// Fee rate the sender is willing to pay
	pub charge_rate: u64,
	/// Upper bound on the total charge
	pub charge_limit: u64,
	/// Contract targeted by the transaction, if any
	pub contract: ContractPayload,
	/// Contract action to invoke
	pub action: Vec<u8>,
	/// Lanes this transaction touches
	pub shard_mask: BitVector,
	/// Opaque payload handed to the contract
	pub data: Vec<u8>,
	/// Signing identities and their signatures
	pub signatories: Vec<Signatory>,
	/// Set when the transaction was obtained through bulk subtree sync.
	/// Transient: never serialized, suppresses recent-cache insertion.
	pub from_subtree_sync: bool,
}

impl Default for Transaction {
	fn default() -> Transaction {
		Transaction {
			digest: ZERO_DIGEST,
			from: Address([0; ADDRESS_SIZE]),
			transfers: vec![],
			valid_from: 0,
			valid_until: 0,
			charge_rate: 0,
			charge_limit: 0,
			contract: ContractPayload::None,
			action: vec![],
			shard_mask: BitVector::new(1),
			data: vec![],
			signatories: vec![],
			from_subtree_sync: false,
		}
	}
}

impl Transaction {
	/// Serializes the canonical payload (everything except the digest and
	/// the transient sync marker) into the provided writer.
	fn write_payload<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.from.write(writer)?;
		self.transfers.write(writer)?;
		writer.write_u64(self.valid_from)?;
		writer.write_u64(self.valid_until)?;
		writer.write_u64(self.charge_rate)?;
		writer.write_u64(self.charge_limit)?;
		self.contract.write(writer)?;
		writer.write_bytes(&self.action)?;
		self.shard_mask.write(writer)?;
		writer.write_bytes(&self.data)?;
		self.signatories.write(writer)
	}

	/// The hash of the canonical payload.
	pub fn compute_digest(&self) -> Digest {
		let mut buf: Vec<u8> = vec![];
		{
			let mut writer = BinWriter::new(&mut buf);
			self.write_payload(&mut writer)
				.expect("in-memory serialization failed");
		}
		digest_of(&buf)
	}

	/// Structural validation: the digest must match the payload, the
	/// validity window must be non-empty and at least one signatory must be
	/// present. Cryptographic signature checks live behind the verifier
	/// backend, not here.
	pub fn verify(&self) -> Result<(), Error> {
		if self.signatories.is_empty() {
			return Err(Error::NoSignatories);
		}
		if self.valid_until <= self.valid_from {
			return Err(Error::InvalidValidityWindow);
		}
		if self.digest != self.compute_digest() {
			return Err(Error::DigestMismatch);
		}
		Ok(())
	}
}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.digest.write(writer)?;
		self.write_payload(writer)
	}
}

impl Readable for Transaction {
	fn read(reader: &mut dyn Reader) -> Result<Transaction, ser::Error> {
		Ok(Transaction {
			digest: Digest::read(reader)?,
			from: Address::read(reader)?,
			transfers: Readable::read(reader)?,
			valid_from: reader.read_u64()?,
			valid_until: reader.read_u64()?,
			charge_rate: reader.read_u64()?,
			charge_limit: reader.read_u64()?,
			contract: ContractPayload::read(reader)?,
			action: reader.read_bytes_len_prefix()?,
			shard_mask: BitVector::read(reader)?,
			data: reader.read_bytes_len_prefix()?,
			signatories: Readable::read(reader)?,
			from_subtree_sync: false,
		})
	}
}

/// Metadata-only projection of a transaction, enough for the block packer
/// to schedule it without hauling the full body around.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionLayout {
	/// Digest of the projected transaction
	pub digest: Digest,
	/// Shard mask resized to the current lane count
	pub mask: BitVector,
	/// Fee rate
	pub charge_rate: u64,
	/// First valid block index
	pub valid_from: u64,
	/// Expiry block index
	pub valid_until: u64,
}

impl TransactionLayout {
	/// Projects a transaction into its layout for a system of
	/// `2^log2_num_lanes` lanes.
	pub fn new(tx: &Transaction, log2_num_lanes: u32) -> TransactionLayout {
		TransactionLayout {
			digest: tx.digest,
			mask: tx.shard_mask.resized(1 << log2_num_lanes),
			charge_rate: tx.charge_rate,
			valid_from: tx.valid_from,
			valid_until: tx.valid_until,
		}
	}
}

impl Writeable for TransactionLayout {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.digest.write(writer)?;
		self.mask.write(writer)?;
		writer.write_u64(self.charge_rate)?;
		writer.write_u64(self.valid_from)?;
		writer.write_u64(self.valid_until)
	}
}

impl Readable for TransactionLayout {
	fn read(reader: &mut dyn Reader) -> Result<TransactionLayout, ser::Error> {
		Ok(TransactionLayout {
			digest: Digest::read(reader)?,
			mask: BitVector::read(reader)?,
			charge_rate: reader.read_u64()?,
			valid_from: reader.read_u64()?,
			valid_until: reader.read_u64()?,
		})
	}
}

/// Incremental builder for transactions. `seal()` computes the digest from
/// the accumulated payload; `build_with_digest()` trusts a digest already
/// produced by an upstream serializer.
pub struct TransactionBuilder {
	tx: Transaction,
}

impl Default for TransactionBuilder {
	fn default() -> TransactionBuilder {
		TransactionBuilder::new()
	}
}

impl TransactionBuilder {
	/// New builder over an empty transaction.
	pub fn new() -> TransactionBuilder {
		TransactionBuilder {
			tx: Transaction::default(),
		}
	}

	/// Sets the sending address.
	pub fn from(mut self, address: Address) -> TransactionBuilder {
		self.tx.from = address;
		self
	}

	/// Appends a transfer.
	pub fn transfer(mut self, to: Address, amount: u64) -> TransactionBuilder {
		self.tx.transfers.push(Transfer { to, amount });
		self
	}

	/// Sets the first valid block index.
	pub fn valid_from(mut self, block_index: u64) -> TransactionBuilder {
		self.tx.valid_from = block_index;
		self
	}

	/// Sets the expiry block index.
	pub fn valid_until(mut self, block_index: u64) -> TransactionBuilder {
		self.tx.valid_until = block_index;
		self
	}

	/// Sets the fee rate.
	pub fn charge_rate(mut self, rate: u64) -> TransactionBuilder {
		self.tx.charge_rate = rate;
		self
	}

	/// Sets the charge limit.
	pub fn charge_limit(mut self, limit: u64) -> TransactionBuilder {
		self.tx.charge_limit = limit;
		self
	}

	/// Sets the contract target.
	pub fn contract(mut self, contract: ContractPayload) -> TransactionBuilder {
		self.tx.contract = contract;
		self
	}

	/// Sets the contract action.
	pub fn action(mut self, action: Vec<u8>) -> TransactionBuilder {
		self.tx.action = action;
		self
	}

	/// Sets the shard mask.
	pub fn shard_mask(mut self, mask: BitVector) -> TransactionBuilder {
		self.tx.shard_mask = mask;
		self
	}

	/// Sets the opaque data payload.
	pub fn data(mut self, data: Vec<u8>) -> TransactionBuilder {
		self.tx.data = data;
		self
	}

	/// Appends a signatory.
	pub fn signatory(mut self, identity: Vec<u8>, signature: Vec<u8>) -> TransactionBuilder {
		self.tx.signatories.push(Signatory {
			identity,
			signature,
		});
		self
	}

	/// Finalizes the transaction, computing its digest from the payload.
	pub fn seal(mut self) -> Transaction {
		self.tx.digest = self.tx.compute_digest();
		self.tx
	}

	/// Finalizes the transaction with a digest supplied by an upstream
	/// serializer.
	pub fn build_with_digest(mut self, digest: Digest) -> Transaction {
		self.tx.digest = digest;
		self.tx
	}
}
