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

//! Common storage-related types: the append-only file primitive backing the
//! archive's document and index files, and the fixed-width index record.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use weft_core::ser::{self, FixedLength, Readable, Reader, Writeable, Writer};
use weft_core::Digest;

/// Represents a single entry in the index file: where in the corresponding
/// document file the payload for a digest lives.
#[derive(Clone, Copy, Debug)]
pub struct IndexEntry {
	/// Digest of the stored transaction
	pub digest: Digest,
	/// Offset (bytes) of the record in the document file
	pub offset: u64,
	/// Size (bytes) of the serialized transaction payload
	pub size: u32,
}

impl FixedLength for IndexEntry {
	const LEN: usize = Digest::LEN + 8 + 4;
}

impl Writeable for IndexEntry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.digest.write(writer)?;
		writer.write_u64(self.offset)?;
		writer.write_u32(self.size)
	}
}

impl Readable for IndexEntry {
	fn read(reader: &mut dyn Reader) -> Result<IndexEntry, ser::Error> {
		Ok(IndexEntry {
			digest: Digest::read(reader)?,
			offset: reader.read_u64()?,
			size: reader.read_u32()?,
		})
	}
}

/// Wrapper around a file that only ever grows, tracking its logical size so
/// appends never have to stat the file. Reads may seek anywhere; the next
/// append always lands at the tracked end.
pub struct AppendOnlyFile {
	path: PathBuf,
	file: File,
	size: u64,
}

impl AppendOnlyFile {
	/// Open (or create) a file at the provided path on disk. With
	/// `truncate` any existing content is discarded; without `create` a
	/// missing file is an error.
	pub fn open<P>(path: P, create: bool, truncate: bool) -> io::Result<AppendOnlyFile>
	where
		P: AsRef<Path>,
	{
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(create)
			.truncate(truncate)
			.open(&path)?;
		let size = file.metadata()?.len();
		Ok(AppendOnlyFile {
			path: path.as_ref().to_path_buf(),
			file,
			size,
		})
	}

	/// Append the provided bytes, returning the offset they were written at.
	pub fn append(&mut self, data: &[u8]) -> io::Result<u64> {
		let offset = self.size;
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(data)?;
		self.size += data.len() as u64;
		Ok(offset)
	}

	/// Read `len` bytes starting at `offset`.
	pub fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
		self.file.seek(SeekFrom::Start(offset))?;
		let mut buf = vec![0; len];
		self.file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Current logical size of the file in bytes.
	pub fn size(&self) -> u64 {
		self.size
	}

	/// Path this file lives at.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Flushes pending writes; with `sync` also forces them to disk.
	pub fn flush(&mut self, sync: bool) -> io::Result<()> {
		self.file.flush()?;
		if sync {
			self.file.sync_all()?;
		}
		Ok(())
	}
}
