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

//! The seam between the verifier and whatever consumes verified
//! transactions.

use weft_core::Transaction;

/// A capability to receive transactions that passed verification. The
/// verifier's dispatcher hands each verified transaction to exactly one
/// sink.
pub trait TransactionSink: Send + Sync {
	/// Accept one verified transaction.
	fn on_transaction(&self, tx: Transaction);
}
