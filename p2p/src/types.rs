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

//! Peer addressing, the endpoint abstraction over the overlay network and
//! the crate error type.

use failure::Fail;
use rand::RngCore;
use std::fmt;

use weft_core::ser::{self, Readable, Reader, Writeable, Writer};

use crate::promise::Promise;

use weft_util as util;

/// Size of a peer address in bytes.
pub const PEER_ADDR_SIZE: usize = 32;

/// Opaque identity of a peer on the overlay network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddr(pub [u8; PEER_ADDR_SIZE]);

impl PeerAddr {
	/// A freshly generated random address.
	pub fn random() -> PeerAddr {
		let mut bytes = [0; PEER_ADDR_SIZE];
		rand::thread_rng().fill_bytes(&mut bytes);
		PeerAddr(bytes)
	}

	/// Builds an address from a byte slice, zero-padding or truncating.
	pub fn from_vec(v: &[u8]) -> PeerAddr {
		let mut bytes = [0; PEER_ADDR_SIZE];
		let copy_len = v.len().min(PEER_ADDR_SIZE);
		bytes[..copy_len].copy_from_slice(&v[..copy_len]);
		PeerAddr(bytes)
	}

	/// The address as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for PeerAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", util::to_hex(&self.0))
	}
}

impl fmt::Debug for PeerAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", &util::to_hex(&self.0)[..12])
	}
}

impl Writeable for PeerAddr {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

impl Readable for PeerAddr {
	fn read(reader: &mut dyn Reader) -> Result<PeerAddr, ser::Error> {
		let bytes = reader.read_fixed_bytes(PEER_ADDR_SIZE)?;
		Ok(PeerAddr::from_vec(&bytes))
	}
}

/// Main error type for this crate.
#[derive(Debug, Fail)]
pub enum Error {
	/// The target peer is not reachable over this transport
	#[fail(display = "peer {} not reachable", _0)]
	PeerUnreachable(PeerAddr),
	/// No protocol registered for the requested service
	#[fail(display = "unknown service id {}", _0)]
	UnknownService(u16),
	/// The protocol doesn't expose the requested method
	#[fail(display = "unknown method {} on service {}", method, service)]
	UnknownMethod {
		/// Service the call targeted
		service: u16,
		/// Offending method id
		method: u8,
	},
	/// The remote handler rejected the call
	#[fail(display = "request failed: {}", _0)]
	Request(String),
	/// A malformed frame or argument payload
	#[fail(display = "serialization error: {}", _0)]
	Ser(ser::Error),
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Ser(e)
	}
}

/// The opaque overlay the lane talks through: it knows which peers are
/// directly connected and can issue framed RPC requests against them.
/// Implementations resolve the returned promise from their own delivery
/// machinery; callers poll, they never block.
pub trait Endpoint: Send + Sync {
	/// This node's own address on the overlay.
	fn local_addr(&self) -> PeerAddr;
	/// Addresses of all directly connected peers.
	fn connected_peers(&self) -> Vec<PeerAddr>;
	/// Add a peer to the directly connected set.
	fn connect(&self, peer: PeerAddr);
	/// Drop a peer from the directly connected set.
	fn disconnect(&self, peer: &PeerAddr);
	/// Issue a framed request to the given peer. The promise resolves with
	/// the response payload, or fails on delivery or handler errors.
	fn request(&self, peer: &PeerAddr, frame: Vec<u8>) -> Promise;
}
