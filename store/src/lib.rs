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

//! Persistent storage of confirmed transactions, keyed by digest and backed
//! by a document/index file pair per lane.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

use failure::Fail;
use std::io;

use weft_core::ser;

pub mod archive;
pub mod types;

pub use crate::archive::TransactionArchive;
pub use crate::types::{AppendOnlyFile, IndexEntry};

/// Main error type for this crate.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// An I/O failure from the underlying files
	#[fail(display = "store io error: {}", _0)]
	Io(String),
	/// On-disk data didn't have the expected shape
	#[fail(display = "store corrupted: {}", _0)]
	Corrupted(String),
	/// Wraps a serialization error for Writeable or Readable
	#[fail(display = "store serialization error: {}", _0)]
	Ser(ser::Error),
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::Io(format!("{}", e))
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Ser(e)
	}
}
