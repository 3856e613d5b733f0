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

//! Message framing for RPC calls: a fixed header carrying the service,
//! channel and method ids followed by the argument payload. Method ids are
//! owned by the individual protocols; the stable service ids live here.

use weft_core::ser::{self, Readable, Reader, Writeable, Writer};

use crate::types::Error;

/// Current latest version of the protocol
pub const PROTOCOL_VERSION: u16 = 1;

/// Magic number expected in the header of every message
const MAGIC: [u8; 2] = [0x77, 0x46];

/// The single RPC channel id.
pub const CHANNEL_RPC: u16 = 1;

/// Intra-node transaction store service.
pub const SERVICE_TX_STORE: u16 = 1;
/// Intra-node lane controller service.
pub const SERVICE_CONTROLLER: u16 = 2;
/// Intra-node missing-transaction finder service.
pub const SERVICE_MISSING_TX_FINDER: u16 = 3;
/// Peer-facing transaction store synchronization service.
pub const SERVICE_TX_STORE_SYNC: u16 = 4;

/// Largest body a single frame may carry.
const MAX_MSG_LEN: u32 = 1 << 26;

/// Header of any protocol message, used to identify incoming messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgHeader {
	/// Protocol version of the sender
	pub version: u16,
	/// Target service
	pub service: u16,
	/// Target channel
	pub channel: u16,
	/// Method within the service
	pub method: u8,
	/// Length of the body that follows the header
	pub msg_len: u32,
}

impl MsgHeader {
	/// Serialized size of the header in bytes.
	pub const LEN: usize = 2 + 2 + 2 + 2 + 1 + 4;
}

impl Writeable for MsgHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(MAGIC[0])?;
		writer.write_u8(MAGIC[1])?;
		writer.write_u16(self.version)?;
		writer.write_u16(self.service)?;
		writer.write_u16(self.channel)?;
		writer.write_u8(self.method)?;
		writer.write_u32(self.msg_len)
	}
}

impl Readable for MsgHeader {
	fn read(reader: &mut dyn Reader) -> Result<MsgHeader, ser::Error> {
		reader.expect_u8(MAGIC[0])?;
		reader.expect_u8(MAGIC[1])?;
		let version = reader.read_u16()?;
		let service = reader.read_u16()?;
		let channel = reader.read_u16()?;
		let method = reader.read_u8()?;
		let msg_len = reader.read_u32()?;
		if msg_len > MAX_MSG_LEN {
			return Err(ser::Error::TooLargeReadErr(u64::from(msg_len)));
		}
		Ok(MsgHeader {
			version,
			service,
			channel,
			method,
			msg_len,
		})
	}
}

/// Frames an RPC request: header followed by the argument payload.
pub fn encode_request(service: u16, channel: u16, method: u8, body: &[u8]) -> Vec<u8> {
	let header = MsgHeader {
		version: PROTOCOL_VERSION,
		service,
		channel,
		method,
		msg_len: body.len() as u32,
	};
	let mut frame = ser::ser_vec(&header).expect("in-memory serialization failed");
	frame.extend_from_slice(body);
	frame
}

/// Splits a frame back into its header and body.
pub fn decode_request(frame: &[u8]) -> Result<(MsgHeader, Vec<u8>), Error> {
	let mut cursor = frame;
	let header: MsgHeader = ser::deserialize(&mut cursor)?;
	if cursor.len() != header.msg_len as usize {
		return Err(Error::Ser(ser::Error::CorruptedData));
	}
	Ok((header, cursor.to_vec()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_round_trip() {
		let body = vec![1, 2, 3, 4, 5];
		let frame = encode_request(SERVICE_TX_STORE_SYNC, CHANNEL_RPC, 3, &body);
		assert_eq!(frame.len(), MsgHeader::LEN + body.len());

		let (header, decoded_body) = decode_request(&frame).unwrap();
		assert_eq!(header.version, PROTOCOL_VERSION);
		assert_eq!(header.service, SERVICE_TX_STORE_SYNC);
		assert_eq!(header.channel, CHANNEL_RPC);
		assert_eq!(header.method, 3);
		assert_eq!(decoded_body, body);
	}

	#[test]
	fn bad_magic_is_rejected() {
		let mut frame = encode_request(SERVICE_TX_STORE, CHANNEL_RPC, 0, &[]);
		frame[0] = 0x00;
		assert!(decode_request(&frame).is_err());
	}

	#[test]
	fn truncated_body_is_rejected() {
		let frame = encode_request(SERVICE_TX_STORE, CHANNEL_RPC, 0, &[1, 2, 3]);
		assert!(decode_request(&frame[..frame.len() - 1]).is_err());
	}
}
