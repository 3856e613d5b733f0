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

//! Core types for the weft ledger: transaction digests, the transaction
//! record itself and the binary serialization framework shared by storage
//! and the wire protocols.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

pub mod bitvec;
pub mod digest;
pub mod ser;
pub mod transaction;

pub use crate::bitvec::BitVector;
pub use crate::digest::{log2_ceil, Digest, DigestMap, DigestSet, DIGEST_SIZE, ZERO_DIGEST};
pub use crate::transaction::{
	Address, ContractPayload, Signatory, Transaction, TransactionBuilder, TransactionLayout,
	Transfer,
};
