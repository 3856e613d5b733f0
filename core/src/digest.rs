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

//! Transaction digests. The digest is the canonical hash of a transaction
//! payload, used pervasively as its primary key. The leading bits of a
//! digest, read MSB-first, route the transaction to a lane and drive
//! subtree synchronization between peers.

use crate::ser::{self, FixedLength, Readable, Reader, Writeable, Writer};
use blake2_rfc::blake2b::blake2b;
use std::collections::{HashMap, HashSet};
use std::fmt;

use weft_util as util;

/// Size of a digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A digest to uniquely identify a single transaction. The hash of the
/// transaction's canonical payload, and its key in every store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; DIGEST_SIZE]);

/// The "zero" digest, all bytes zero.
pub const ZERO_DIGEST: Digest = Digest([0; DIGEST_SIZE]);

/// A set of digests.
pub type DigestSet = HashSet<Digest>;

/// A map keyed by digest.
pub type DigestMap<T> = HashMap<Digest, T>;

impl fmt::Display for Digest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl fmt::Debug for Digest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &self.to_hex()[..12])
	}
}

impl AsRef<[u8]> for Digest {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl Digest {
	/// Builds a Digest from a byte slice. If the slice is too short the
	/// remaining bytes stay zero, if too long it gets truncated.
	pub fn from_vec(v: &[u8]) -> Digest {
		let mut bytes = [0; DIGEST_SIZE];
		let copy_len = v.len().min(DIGEST_SIZE);
		bytes[..copy_len].copy_from_slice(&v[..copy_len]);
		Digest(bytes)
	}

	/// The digest as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// The digest as an owned byte vector.
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// Renders the digest as lowercase hex.
	pub fn to_hex(&self) -> String {
		util::to_hex(&self.0)
	}

	/// Parses a digest from a hex string (64 hex chars, optional 0x prefix).
	pub fn from_hex(hex: &str) -> Result<Digest, ser::Error> {
		let bytes = util::from_hex(hex).map_err(|_| ser::Error::CorruptedData)?;
		if bytes.len() != DIGEST_SIZE {
			return Err(ser::Error::CorruptedData);
		}
		Ok(Digest::from_vec(&bytes))
	}

	/// The bit at `index`, counting MSB-first from the front of the digest.
	pub fn bit(&self, index: usize) -> bool {
		debug_assert!(index < DIGEST_SIZE * 8);
		self.0[index / 8] & (0x80 >> (index % 8)) != 0
	}

	/// The lane this digest belongs to, taken from its top `log2_num_lanes`
	/// bits.
	pub fn lane(&self, log2_num_lanes: u32) -> u32 {
		debug_assert!(log2_num_lanes <= 32);
		if log2_num_lanes == 0 {
			return 0;
		}
		let top = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
		top >> (32 - log2_num_lanes)
	}

	/// Whether the top `bit_count` bits of this digest equal the top
	/// `bit_count` bits of `prefix`.
	pub fn matches_prefix(&self, prefix: &Digest, bit_count: u64) -> bool {
		let bit_count = bit_count.min((DIGEST_SIZE * 8) as u64) as usize;
		let full = bit_count / 8;
		let rem = bit_count % 8;
		if self.0[..full] != prefix.0[..full] {
			return false;
		}
		if rem == 0 {
			return true;
		}
		let mask = 0xffu8 << (8 - rem);
		(self.0[full] & mask) == (prefix.0[full] & mask)
	}

	/// Builds the partial digest identifying a sync subtree: the `root`
	/// index encoded MSB-first into the top `root_size` bits, all other bits
	/// zero.
	pub fn from_subtree_root(root: u64, root_size: u64) -> Digest {
		let root_size = root_size.min(64);
		let mut bytes = [0; DIGEST_SIZE];
		for i in 0..root_size {
			if (root >> (root_size - 1 - i)) & 1 == 1 {
				bytes[(i / 8) as usize] |= 0x80 >> (i % 8);
			}
		}
		Digest(bytes)
	}

	/// The inclusive digest range covering every digest sharing this
	/// digest's top `bit_count` bits. Used for ordered prefix scans.
	pub fn subtree_range(&self, bit_count: u64) -> (Digest, Digest) {
		let bit_count = bit_count.min((DIGEST_SIZE * 8) as u64) as usize;
		let full = bit_count / 8;
		let rem = bit_count % 8;
		let mut lo = [0x00; DIGEST_SIZE];
		let mut hi = [0xff; DIGEST_SIZE];
		lo[..full].copy_from_slice(&self.0[..full]);
		hi[..full].copy_from_slice(&self.0[..full]);
		if rem > 0 {
			let mask = 0xffu8 << (8 - rem);
			lo[full] = self.0[full] & mask;
			hi[full] = (self.0[full] & mask) | !mask;
		}
		(Digest(lo), Digest(hi))
	}
}

impl FixedLength for Digest {
	const LEN: usize = DIGEST_SIZE;
}

impl Writeable for Digest {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for Digest {
	fn read(reader: &mut dyn Reader) -> Result<Digest, ser::Error> {
		let bytes = reader.read_fixed_bytes(DIGEST_SIZE)?;
		Ok(Digest::from_vec(&bytes))
	}
}

/// Hashes arbitrary bytes down to a digest (blake2b-256).
pub fn digest_of(data: &[u8]) -> Digest {
	let hash = blake2b(DIGEST_SIZE, &[], data);
	Digest::from_vec(hash.as_bytes())
}

/// Smallest `k` such that `2^k >= value`. Zero for values of one or less.
pub fn log2_ceil(value: u64) -> u64 {
	if value <= 1 {
		return 0;
	}
	64 - u64::from((value - 1).leading_zeros())
}
