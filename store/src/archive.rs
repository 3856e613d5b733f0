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

//! The durable transaction archive: a content-addressed map from digest to
//! transaction, persisted as a document file of records plus an index file
//! of fixed-width entries. The full index is kept in memory as an ordered
//! map, which makes digest-prefix range scans cheap.

use log::debug;
use std::collections::BTreeMap;
use std::path::Path;

use weft_core::ser::{self, FixedLength};
use weft_core::{Digest, Transaction};
use weft_util::Mutex;

use crate::types::{AppendOnlyFile, IndexEntry};
use crate::Error;

/// Bytes preceding the payload inside a document record: the digest plus
/// the u32 payload length.
const RECORD_HEADER_LEN: u64 = (Digest::LEN + 4) as u64;

struct Inner {
	doc: AppendOnlyFile,
	idx: AppendOnlyFile,
	index: BTreeMap<Digest, IndexEntry>,
}

/// Persistent content-addressed store of transactions. Internally
/// thread-safe; all file access is serialized behind one lock.
pub struct TransactionArchive {
	inner: Mutex<Inner>,
}

impl TransactionArchive {
	/// Create a fresh archive. With `overwrite` any existing files at the
	/// provided paths are discarded; without it their presence is an
	/// error, so an accidental re-create cannot clobber a populated
	/// archive.
	pub fn new<P>(doc_path: P, idx_path: P, overwrite: bool) -> Result<TransactionArchive, Error>
	where
		P: AsRef<Path>,
	{
		if !overwrite && (doc_path.as_ref().exists() || idx_path.as_ref().exists()) {
			return Err(Error::Io(format!(
				"refusing to overwrite existing archive at {:?}",
				doc_path.as_ref()
			)));
		}
		let doc = AppendOnlyFile::open(doc_path, true, true)?;
		let idx = AppendOnlyFile::open(idx_path, true, true)?;
		Ok(TransactionArchive {
			inner: Mutex::new(Inner {
				doc,
				idx,
				index: BTreeMap::new(),
			}),
		})
	}

	/// Load an existing archive, rebuilding the in-memory index from the
	/// index file. Missing files are created when `create` is set and an
	/// error otherwise.
	pub fn load<P>(doc_path: P, idx_path: P, create: bool) -> Result<TransactionArchive, Error>
	where
		P: AsRef<Path>,
	{
		let doc = AppendOnlyFile::open(doc_path, create, false)?;
		let mut idx = AppendOnlyFile::open(idx_path, create, false)?;

		let idx_size = idx.size();
		if idx_size % IndexEntry::LEN as u64 != 0 {
			return Err(Error::Corrupted(format!(
				"index file {:?} has trailing bytes",
				idx.path()
			)));
		}

		let mut index = BTreeMap::new();
		let raw = idx.read_at(0, idx_size as usize)?;
		let mut cursor = &raw[..];
		for _ in 0..idx_size / IndexEntry::LEN as u64 {
			let entry: IndexEntry = ser::deserialize(&mut cursor)?;
			if entry.offset + RECORD_HEADER_LEN + u64::from(entry.size) > doc.size() {
				return Err(Error::Corrupted(format!(
					"index entry for {} points past the document file",
					entry.digest
				)));
			}
			index.insert(entry.digest, entry);
		}

		debug!(
			"loaded transaction archive from {:?}, {} entries",
			doc.path(),
			index.len()
		);

		Ok(TransactionArchive {
			inner: Mutex::new(Inner { doc, idx, index }),
		})
	}

	/// Write the transaction under its digest. Re-adding an existing digest
	/// is an idempotent overwrite.
	pub fn add(&self, tx: &Transaction) -> Result<(), Error> {
		let payload = ser::ser_vec(tx)?;

		let mut record = Vec::with_capacity(RECORD_HEADER_LEN as usize + payload.len());
		record.extend_from_slice(tx.digest.as_bytes());
		record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
		record.extend_from_slice(&payload);

		let mut inner = self.inner.lock();
		let offset = inner.doc.append(&record)?;
		let entry = IndexEntry {
			digest: tx.digest,
			offset,
			size: payload.len() as u32,
		};
		let entry_bytes = ser::ser_vec(&entry)?;
		inner.idx.append(&entry_bytes)?;
		inner.index.insert(entry.digest, entry);
		Ok(())
	}

	/// Whether a transaction with the given digest is archived.
	pub fn has(&self, digest: &Digest) -> bool {
		self.inner.lock().index.contains_key(digest)
	}

	/// Fetch a transaction by digest. A missing digest is `None`, not an
	/// error.
	pub fn get(&self, digest: &Digest) -> Result<Option<Transaction>, Error> {
		let mut inner = self.inner.lock();
		let entry = match inner.index.get(digest) {
			Some(entry) => *entry,
			None => return Ok(None),
		};
		read_record(&mut inner.doc, &entry).map(Some)
	}

	/// Number of archived transactions.
	pub fn count(&self) -> u64 {
		self.inner.lock().index.len() as u64
	}

	/// Return up to `limit` transactions whose digest's top `bit_count`
	/// bits equal the top `bit_count` bits of `prefix`. A `bit_count` of
	/// zero scans the whole archive. Results come back in ascending digest
	/// order, so equal inputs yield equal outputs.
	pub fn pull_subtree(
		&self,
		prefix: &Digest,
		bit_count: u64,
		limit: usize,
	) -> Result<Vec<Transaction>, Error> {
		let mut guard = self.inner.lock();
		let inner = &mut *guard;
		let doc = &mut inner.doc;
		let index = &inner.index;

		let mut txs = Vec::new();
		if bit_count == 0 {
			for entry in index.values().take(limit) {
				txs.push(read_record(doc, entry)?);
			}
		} else {
			let (lo, hi) = prefix.subtree_range(bit_count);
			for (_, entry) in index.range(lo..=hi).take(limit) {
				txs.push(read_record(doc, entry)?);
			}
		}
		Ok(txs)
	}

	/// Durability fence. Flushes both files; with `sync` the data is forced
	/// to disk before returning.
	pub fn flush(&self, sync: bool) -> Result<(), Error> {
		let mut inner = self.inner.lock();
		inner.doc.flush(sync)?;
		inner.idx.flush(sync)?;
		Ok(())
	}
}

fn read_record(doc: &mut AppendOnlyFile, entry: &IndexEntry) -> Result<Transaction, Error> {
	let data = doc.read_at(entry.offset + RECORD_HEADER_LEN, entry.size as usize)?;
	let tx: Transaction = ser::deserialize(&mut &data[..])?;
	if tx.digest != entry.digest {
		return Err(Error::Corrupted(format!(
			"document record for {} holds digest {}",
			entry.digest, tx.digest
		)));
	}
	Ok(tx)
}
