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

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use weft_core::ser;
use weft_p2p::{
	CallContext, Endpoint, Error, LocalNetwork, PeerAddr, Protocol, Resolution, RpcClient,
	RpcServer, CHANNEL_RPC, SERVICE_TX_STORE,
};
use weft_util as util;

const ECHO: u8 = 1;
const DOUBLE: u8 = 2;

struct EchoProtocol;

impl Protocol for EchoProtocol {
	fn dispatch(&self, method: u8, body: &[u8], _ctx: &CallContext) -> Result<Vec<u8>, Error> {
		match method {
			ECHO => Ok(body.to_vec()),
			DOUBLE => {
				let value: u64 = ser::deserialize(&mut &body[..])?;
				Ok(ser::ser_vec(&(value * 2))?)
			}
			_ => Err(Error::UnknownMethod {
				service: SERVICE_TX_STORE,
				method,
			}),
		}
	}
}

fn wait_for<T>(poll: impl Fn() -> Resolution<T>) -> Resolution<T> {
	for _ in 0..200 {
		match poll() {
			Resolution::Pending => thread::sleep(Duration::from_millis(5)),
			settled => return settled,
		}
	}
	panic!("promise never settled");
}

#[test]
fn request_response_round_trip() {
	util::init_test_logger();

	let network = LocalNetwork::new();
	let server_addr = PeerAddr::random();
	let client_addr = PeerAddr::random();

	let server = Arc::new(RpcServer::new());
	server.add_service(SERVICE_TX_STORE, Arc::new(EchoProtocol));
	network.register(server_addr, server);

	let endpoint = network.endpoint(client_addr);
	let client = RpcClient::new(
		"test-client",
		endpoint,
		SERVICE_TX_STORE,
		CHANNEL_RPC,
		Duration::from_secs(2),
	);

	let promise = client.call::<u64>(&server_addr, DOUBLE, ser::ser_vec(&21u64).unwrap());
	match wait_for(|| promise.poll()) {
		Resolution::Complete(value) => assert_eq!(value, 42),
		_ => panic!("expected completion"),
	}
}

#[test]
fn unknown_service_fails_the_promise() {
	util::init_test_logger();

	let network = LocalNetwork::new();
	let server_addr = PeerAddr::random();

	// server registered without any services
	network.register(server_addr, Arc::new(RpcServer::new()));

	let endpoint = network.endpoint(PeerAddr::random());
	let client = RpcClient::new(
		"test-client",
		endpoint,
		SERVICE_TX_STORE,
		CHANNEL_RPC,
		Duration::from_secs(2),
	);

	let promise = client.call::<u64>(&server_addr, ECHO, vec![]);
	assert!(matches!(
		wait_for(|| promise.poll()),
		Resolution::Failed
	));
}

#[test]
fn unregistered_peer_fails_the_promise() {
	util::init_test_logger();

	let network = LocalNetwork::new();
	let endpoint = network.endpoint(PeerAddr::random());
	let client = RpcClient::new(
		"test-client",
		endpoint,
		SERVICE_TX_STORE,
		CHANNEL_RPC,
		Duration::from_secs(2),
	);

	let promise = client.call::<u64>(&PeerAddr::random(), ECHO, vec![]);
	assert!(matches!(
		wait_for(|| promise.poll()),
		Resolution::Failed
	));
}

#[test]
fn endpoint_tracks_connected_peers() {
	let network = LocalNetwork::new();
	let endpoint = network.endpoint(PeerAddr::random());

	let peer = PeerAddr::random();
	assert!(endpoint.connected_peers().is_empty());
	endpoint.connect(peer);
	endpoint.connect(peer); // duplicate ignored
	assert_eq!(endpoint.connected_peers(), vec![peer]);
	endpoint.disconnect(&peer);
	assert!(endpoint.connected_peers().is_empty());
}
