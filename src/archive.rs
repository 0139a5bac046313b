//! ZIP packaging of raw chunk payloads.
//!
//! Entries are named `chunk_1.wav`, `chunk_2.wav`, ... in chunk order and
//! stored without compression, since the payloads are already audio.

use std::io::{Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SpeechError;

/// Archive entry name for the chunk at 0-based `index`.
pub fn chunk_entry_name(index: usize) -> String {
    format!("chunk_{}.wav", index + 1)
}

/// Write `payloads` into a new ZIP archive on `writer` and return the writer.
pub fn write_chunk_archive<W, P>(payloads: &[P], writer: W) -> Result<W, SpeechError>
where
    W: Write + Seek,
    P: AsRef<[u8]>,
{
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (index, payload) in payloads.iter().enumerate() {
        zip.start_file(chunk_entry_name(index), options)?;
        zip.write_all(payload.as_ref())?;
    }

    let writer = zip.finish()?;
    log::info!("Packed {} chunks into archive", payloads.len());
    Ok(writer)
}

/// Read every file entry of a chunk archive as `(name, bytes)`, in archive
/// order. Directory entries are skipped.
pub fn read_chunk_archive<R>(reader: R) -> Result<Vec<(String, Vec<u8>)>, SpeechError>
where
    R: Read + Seek,
{
    let mut zip = ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push((name, data));
    }

    Ok(entries)
}
