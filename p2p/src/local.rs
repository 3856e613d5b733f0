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

//! In-process transport. Frames are delivered on a dedicated thread so
//! promises resolve asynchronously exactly as they would over a socket.
//! This backs the intra-node RPC channel between the controller and the
//! storage engine, and stands in for the overlay when lanes are wired
//! together inside one process.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use weft_util::{BoundedQueue, RwLock};

use crate::promise::Promise;
use crate::protocol::{CallContext, RpcServer};
use crate::types::{Endpoint, PeerAddr};

/// Pending deliveries the network will buffer before producers block.
const DELIVERY_QUEUE_SIZE: usize = 1 << 12;

/// How long the delivery worker waits for traffic before re-checking
/// whether the network is still alive.
const DELIVERY_POLL: Duration = Duration::from_millis(50);

struct Delivery {
	from: PeerAddr,
	to: PeerAddr,
	frame: Vec<u8>,
	promise: Promise,
}

/// An in-process network joining a set of registered RPC servers.
pub struct LocalNetwork {
	servers: RwLock<HashMap<PeerAddr, Arc<RpcServer>>>,
	deliveries: BoundedQueue<Delivery>,
}

impl LocalNetwork {
	/// New network with its delivery worker running. The worker winds
	/// itself down once the network is dropped.
	pub fn new() -> Arc<LocalNetwork> {
		let deliveries: BoundedQueue<Delivery> = BoundedQueue::new(DELIVERY_QUEUE_SIZE);
		let network = Arc::new(LocalNetwork {
			servers: RwLock::new(HashMap::new()),
			deliveries: deliveries.clone(),
		});

		let weak: Weak<LocalNetwork> = Arc::downgrade(&network);
		let _ = thread::Builder::new()
			.name("local-net".to_owned())
			.spawn(move || loop {
				match deliveries.pop(DELIVERY_POLL) {
					Some(delivery) => match weak.upgrade() {
						Some(network) => network.deliver(delivery),
						None => {
							delivery.promise.fail();
							break;
						}
					},
					None => {
						if weak.upgrade().is_none() {
							break;
						}
					}
				}
			});

		network
	}

	/// Register the server answering for `addr`.
	pub fn register(&self, addr: PeerAddr, server: Arc<RpcServer>) {
		self.servers.write().insert(addr, server);
	}

	/// Build an endpoint speaking through this network as `addr`.
	pub fn endpoint(self: &Arc<Self>, addr: PeerAddr) -> Arc<LocalEndpoint> {
		Arc::new(LocalEndpoint {
			addr,
			network: self.clone(),
			peers: RwLock::new(vec![]),
		})
	}

	fn deliver(&self, delivery: Delivery) {
		let server = self.servers.read().get(&delivery.to).cloned();
		match server {
			None => {
				warn!("no server registered for {:?}, failing request", delivery.to);
				delivery.promise.fail();
			}
			Some(server) => {
				let ctx = CallContext {
					sender: delivery.from,
				};
				match server.handle(&delivery.frame, &ctx) {
					Ok(payload) => delivery.promise.fulfill(payload),
					Err(e) => {
						debug!("request to {:?} failed: {}", delivery.to, e);
						delivery.promise.fail();
					}
				}
			}
		}
	}
}

/// One node's endpoint onto a [`LocalNetwork`].
pub struct LocalEndpoint {
	addr: PeerAddr,
	network: Arc<LocalNetwork>,
	peers: RwLock<Vec<PeerAddr>>,
}

impl Endpoint for LocalEndpoint {
	fn local_addr(&self) -> PeerAddr {
		self.addr
	}

	fn connected_peers(&self) -> Vec<PeerAddr> {
		self.peers.read().clone()
	}

	fn connect(&self, peer: PeerAddr) {
		let mut peers = self.peers.write();
		if !peers.contains(&peer) {
			peers.push(peer);
		}
	}

	fn disconnect(&self, peer: &PeerAddr) {
		self.peers.write().retain(|p| p != peer);
	}

	fn request(&self, peer: &PeerAddr, frame: Vec<u8>) -> Promise {
		let promise = Promise::new();
		self.network.deliveries.push(Delivery {
			from: self.addr,
			to: *peer,
			frame,
			promise: promise.clone(),
		});
		promise
	}
}
