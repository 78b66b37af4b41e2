//! Encrypted table database decoding.
//!
//! The container is a stream-ciphered hash table of linked chains. The
//! cipher key is one of 256 rotations of a fixed 256-byte table; the
//! right rotation is found by testing the known 5-byte plaintext magic.
//! Chain entries form a flat name -> bytes map from which the logical
//! table (rows, columns, cell values) is reassembled.

use std::collections::HashMap;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};
use hex_literal::hex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::reader::BufferReader;

const MAGIC: &[u8; 5] = b"PLPcK";
const HEADER_SIZE: u16 = 0x26;

pub(crate) static KEY: [u8; 256] = hex!(
    "91AE4ED4644F585162EC1BD5EF24ADDBAF838242AEF51E97804B134FFD8CE5BB"
    "4F6E3E6451147CDF56C318E5E964C999C0D95CC860822E6B418BE465D79A036D"
    "BF67AB3DA72AB1023A4561F444E5CE858D23EA10FEB4899151AD7E43FF3E2419"
    "A97B4DD3AF4EF5C829E5AF4ACE9436F6B6B6382E9DFD26642099011A4899089C"
    "9D4B9F80BBB00A4CC73255CE1F78646E91C9C12313F5D840DC51457010D37D19"
    "615BB69888B42B19E749F993C00337E9332F89B320C173A5653848788798A771"
    "739E72DBC84C7946597149BDDAE4E3BD1A17856C85A555CFA24F6352D005933B"
    "50042BE0BA4C708DE8EBB52059B2059C9BFE90D8923DF74B43911BBC00BB6BFA"
);

/// Find the key rotation whose XOR of the first five input bytes yields
/// the plaintext magic, then decrypt the whole input with it.
pub fn decrypt(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < MAGIC.len() {
        return None;
    }
    for rotation in 0..KEY.len() {
        let matches = MAGIC
            .iter()
            .enumerate()
            .all(|(j, &m)| data[j] ^ KEY[(rotation + j) % KEY.len()] == m);
        if matches {
            tracing::debug!(rotation, "table key rotation found");
            return Some(
                data.iter()
                    .enumerate()
                    .map(|(j, &b)| b ^ KEY[(rotation + j) % KEY.len()])
                    .collect(),
            );
        }
    }
    None
}

/// The flat entry map recovered from the hash-table chains, plus the
/// logical table shape.
struct Entries {
    by_name: HashMap<String, Vec<u8>>,
}

impl Entries {
    fn u32_entry(&self, name: &str) -> u32 {
        match self.by_name.get(name) {
            Some(bytes) if bytes.len() >= 4 => LittleEndian::read_u32(bytes),
            _ => 0,
        }
    }

    fn string_entry(&self, name: &str) -> Option<String> {
        self.by_name
            .get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

fn parse_entries(decrypted: &[u8]) -> Result<Entries> {
    let mut r = BufferReader::new(decrypted);
    if decrypted.len() < HEADER_SIZE as usize {
        return Err(Error::BadTable("shorter than the header"));
    }

    r.skip(5)?; // magic, already verified by the key probe
    let _version = r.read_u8()?;
    let header_size = r.read_u16()?;
    if header_size != HEADER_SIZE {
        return Err(Error::BadTable("unexpected header size"));
    }
    let _ = r.read_u8()?;
    let _ = r.read_u64()?;
    let _default_file_count = r.read_u32()?;
    let hash_table_count = r.read_u32()?;
    let hash_table_offset = r.read_u40()?;
    let _ = r.read_u64()?;

    r.seek(hash_table_offset as usize)?;
    let root_size = r.read_u32()?;
    let root_sentinel = r.read_u8()?;
    if root_sentinel != 1 {
        return Err(Error::BadTable("root entry sentinel is not 1"));
    }
    if root_size != 5 * (hash_table_count + 1) {
        return Err(Error::BadTable("root entry size mismatch"));
    }

    let mut by_name = HashMap::new();
    for _ in 0..hash_table_count {
        let bucket_offset = r.read_u40()?;
        if bucket_offset == 0 {
            continue;
        }
        walk_chain(decrypted, bucket_offset as usize, &mut by_name);
    }

    Ok(Entries { by_name })
}

/// Walk one bucket's linked chain. Every read is bounds-checked; a
/// truncated or out-of-range entry aborts the walk, keeping whatever
/// was collected so far.
fn walk_chain(decrypted: &[u8], start: usize, by_name: &mut HashMap<String, Vec<u8>>) {
    let mut r = BufferReader::new(decrypted);
    if r.seek(start).is_err() {
        return;
    }
    loop {
        let Ok(_entry_size) = r.read_u32() else { return };
        let Ok(_entry_type) = r.read_u8() else { return };
        let Ok(name_len) = r.read_u8() else { return };
        let Ok(data_len) = r.read_u32() else { return };
        let Ok(next) = r.read_u40() else { return };
        let Ok(name) = r.read_sized_string(name_len as usize) else { return };
        let Ok(data) = r.read_bytes(data_len as usize) else { return };

        by_name.insert(name, data.to_vec());

        if next == 0 {
            return;
        }
        if r.seek(next as usize).is_err() {
            return;
        }
    }
}

fn build_rows(entries: &Entries) -> Vec<Map<String, Value>> {
    let rows = entries.u32_entry("\trows");
    let cols = entries.u32_entry("\tcols");

    let mut column_names = Vec::new();
    for col in 0..cols {
        if let Some(name) = entries.string_entry(&format!("\t{}", col)) {
            column_names.push(name);
        }
    }

    let mut out = Vec::new();
    for row in 0..rows {
        let Some(row_name) = entries.string_entry(&format!("\t\t{}", row)) else {
            continue;
        };
        let Some(payload) = entries.by_name.get(&row_name) else {
            continue;
        };

        // Cell values are NUL-separated, in column order; a trailing
        // unterminated segment is dropped.
        let mut values = Vec::new();
        let mut start = 0;
        for (i, &b) in payload.iter().enumerate() {
            if b == 0 {
                values.push(String::from_utf8_lossy(&payload[start..i]).into_owned());
                start = i + 1;
            }
        }

        let mut object = Map::new();
        for (name, value) in column_names.iter().zip(values) {
            object.insert(name.clone(), Value::String(value));
        }
        out.push(object);
    }

    out
}

/// Decrypt and decode a table database into a JSON array of flat
/// string-valued objects.
pub fn to_json(data: &[u8]) -> Result<String> {
    let decrypted = decrypt(data).ok_or(Error::TableKeyNotFound)?;
    let entries = parse_entries(&decrypted)?;
    let rows = build_rows(&entries);
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Streaming variant: rows are serialized one at a time so very large
/// tables never materialize a second full JSON string.
pub fn to_json_writer<W: Write>(data: &[u8], out: &mut W) -> Result<()> {
    let decrypted = decrypt(data).ok_or(Error::TableKeyNotFound)?;
    let entries = parse_entries(&decrypted)?;
    let rows = build_rows(&entries);

    out.write_all(b"[\n")?;
    let total = rows.len();
    for (i, row) in rows.into_iter().enumerate() {
        if i > 0 && i % 1000 == 0 {
            tracing::debug!(rows_written = i, "table JSON streaming progress");
        }
        out.write_all(b"  ")?;
        serde_json::to_writer(&mut *out, &row)?;
        if i + 1 < total {
            out.write_all(b",")?;
        }
        out.write_all(b"\n")?;
    }
    out.write_all(b"]")?;
    Ok(())
}
