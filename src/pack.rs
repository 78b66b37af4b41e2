//! Pack archive: variant detection, record scanning, file tree, reads.
//!
//! A pack has no index. Every named sub-file is a record (15-byte
//! header, name, payload) somewhere in the stream, so the tree is
//! rebuilt by sweeping the whole file for record headers and
//! resynchronizing byte-by-byte past anything that does not validate.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::keystream;
use crate::progress::Progress;

pub const ENCRYPTED_MAGIC: [u8; 5] = [0x71, 0x40, 0xBD, 0x73, 0x93];
pub const DECRYPTED_MAGIC: [u8; 5] = *b"PLPcK";

const RECORD_HEADER_LEN: usize = 15;
/// Header bytes plus four trailing overhead bytes baked into the
/// container-length arithmetic.
const RECORD_OVERHEAD: usize = 19;
const RECORD_MARKER: u8 = 0x02;
const MAX_NAME_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    Encrypted,
    Decrypted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub offset: u64,
    pub size: u64,
    /// Lowercased extension without the dot; empty when the name has none.
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderInfo {
    pub children: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    File(FileInfo),
    Folder(FolderInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub name: String,
    pub full_path: String,
    pub data: NodeData,
}

impl FileNode {
    fn folder(name: impl Into<String>, full_path: impl Into<String>) -> Self {
        FileNode {
            name: name.into(),
            full_path: full_path.into(),
            data: NodeData::Folder(FolderInfo::default()),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.data, NodeData::File(_))
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        match &self.data {
            NodeData::File(info) => Some(info),
            NodeData::Folder(_) => None,
        }
    }

    pub fn children(&self) -> &[FileNode] {
        match &self.data {
            NodeData::Folder(folder) => &folder.children,
            NodeData::File(_) => &[],
        }
    }
}

pub struct PackArchive {
    map: Mmap,
    kind: PackKind,
    root: FileNode,
}

impl PackArchive {
    /// Open and map a pack read-only. The first five bytes decide the
    /// variant; anything unrecognized (including files shorter than
    /// five bytes) is terminal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let map = unsafe { Mmap::map(&file)? };

        let kind = if map.len() >= 5 && map[..5] == ENCRYPTED_MAGIC {
            PackKind::Encrypted
        } else if map.len() >= 5 && map[..5] == DECRYPTED_MAGIC {
            PackKind::Decrypted
        } else {
            return Err(Error::UnknownPackKind);
        };

        tracing::info!(path = %path.as_ref().display(), ?kind, size = map.len(), "opened pack");
        Ok(PackArchive {
            map,
            kind,
            root: FileNode::folder("root", ""),
        })
    }

    pub fn kind(&self) -> PackKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn tree(&self) -> &FileNode {
        &self.root
    }

    /// Sweep the pack for record headers and rebuild the file tree.
    /// Invalid headers are skipped by advancing a single byte; a scan
    /// that recovers zero records still succeeds.
    pub fn scan(&mut self, progress: &Progress) {
        let mut root = FileNode::folder("root", "");
        match self.kind {
            PackKind::Encrypted => self.scan_encrypted(&mut root, progress),
            PackKind::Decrypted => self.scan_decrypted(&mut root, progress),
        }
        progress.set(1.0);
        tracing::info!(files = count_files(&root), "scan complete");
        self.root = root;
    }

    fn scan_encrypted(&self, root: &mut FileNode, progress: &Progress) {
        let data = &self.map[..];
        let size = data.len();
        let mut cursor = 0usize;

        while cursor < size {
            if cursor & 0xFFFF == 0 {
                progress.set(cursor as f32 / size as f32);
            }

            if keystream::decrypt_byte(data[cursor], cursor as u64) == RECORD_MARKER && cursor >= 4
            {
                if let Some(record) = try_record(data, cursor - 4, true) {
                    let end = record.payload_offset + record.payload_len;
                    add_file_to_tree(root, &record.name, record.payload_offset as u64, record.payload_len as u64);
                    cursor = end;
                    continue;
                }
            }
            cursor += 1;
        }
    }

    fn scan_decrypted(&self, root: &mut FileNode, progress: &Progress) {
        let data = &self.map[..];
        let size = data.len();
        let mut cursor = 0usize;

        while cursor < size {
            progress.set(cursor as f32 / size as f32);

            let Some(found) = data[cursor..].iter().position(|&b| b == RECORD_MARKER) else {
                break;
            };
            cursor += found;

            if cursor < 4 {
                cursor += 1;
                continue;
            }
            if let Some(record) = try_record(data, cursor - 4, false) {
                let end = record.payload_offset + record.payload_len;
                add_file_to_tree(root, &record.name, record.payload_offset as u64, record.payload_len as u64);
                cursor = end;
            } else {
                cursor += 1;
            }
        }
    }

    /// Copy a leaf's byte range out of the pack, decrypting with the
    /// leaf's absolute offset as keystream phase when needed.
    pub fn read(&self, node: &FileNode) -> Result<Vec<u8>> {
        let info = node.file_info().ok_or(Error::NotAFile)?;
        let pack_size = self.size();
        let end = info.offset.checked_add(info.size).filter(|&e| e <= pack_size).ok_or(
            Error::BadFileRange {
                offset: info.offset,
                size: info.size,
                pack_size,
            },
        )?;

        let mut buf = self.map[info.offset as usize..end as usize].to_vec();
        if self.kind == PackKind::Encrypted {
            keystream::apply(&mut buf, info.offset);
        }
        Ok(buf)
    }
}

struct Record {
    name: String,
    payload_offset: usize,
    payload_len: usize,
}

/// Validate a candidate record whose marker byte sits at
/// `header_offset + 4`. Any failed check means "not a record here" and
/// the caller resynchronizes.
fn try_record(data: &[u8], header_offset: usize, encrypted: bool) -> Option<Record> {
    if header_offset + RECORD_HEADER_LEN > data.len() {
        return None;
    }
    let mut header = [0u8; RECORD_HEADER_LEN];
    header.copy_from_slice(&data[header_offset..header_offset + RECORD_HEADER_LEN]);
    if encrypted {
        keystream::apply(&mut header, header_offset as u64);
    }

    if header[4] != RECORD_MARKER {
        return None;
    }
    let container_len = LittleEndian::read_u32(&header[0..4]) as usize;
    let name_len = header[5] as usize;
    let payload_len = LittleEndian::read_u32(&header[6..10]) as usize;

    if container_len > data.len() || name_len == 0 || name_len > MAX_NAME_LEN || payload_len > data.len() {
        return None;
    }
    if container_len != name_len + payload_len + RECORD_OVERHEAD {
        return None;
    }

    let name_offset = header_offset + RECORD_HEADER_LEN;
    if name_offset + name_len > data.len() {
        return None;
    }
    let mut name_bytes = data[name_offset..name_offset + name_len].to_vec();
    if encrypted {
        keystream::apply(&mut name_bytes, name_offset as u64);
    }

    let payload_offset = name_offset + name_len;
    if payload_offset + payload_len > data.len() {
        return None;
    }

    Some(Record {
        name: String::from_utf8_lossy(&name_bytes).into_owned(),
        payload_offset,
        payload_len,
    })
}

/// Insert a leaf, creating intermediate folders in insertion order.
/// Duplicate names are appended verbatim; the tree is a reconstructed
/// view, not an authority.
fn add_file_to_tree(root: &mut FileNode, path: &str, offset: u64, size: u64) {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let Some(file_name) = parts.pop() else {
        return;
    };

    let mut current = root;
    let mut current_path = String::new();
    for part in parts {
        current_path.push_str(part);
        current_path.push('/');

        let NodeData::Folder(folder) = &mut current.data else {
            return;
        };
        let index = folder
            .children
            .iter()
            .position(|n| n.name == part && !n.is_file());
        let index = match index {
            Some(i) => i,
            None => {
                folder
                    .children
                    .push(FileNode::folder(part, current_path.clone()));
                folder.children.len() - 1
            }
        };
        current = &mut folder.children[index];
    }

    let format = match file_name.rfind('.') {
        Some(i) if i > 0 => file_name[i + 1..].to_ascii_lowercase(),
        _ => String::new(),
    };

    if let NodeData::Folder(folder) = &mut current.data {
        folder.children.push(FileNode {
            name: file_name.to_string(),
            full_path: path.to_string(),
            data: NodeData::File(FileInfo { offset, size, format }),
        });
    }
}

fn count_files(node: &FileNode) -> usize {
    if node.is_file() {
        1
    } else {
        node.children().iter().map(count_files).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record_bytes(name: &str, payload: &[u8]) -> Vec<u8> {
        let container = name.len() + payload.len() + RECORD_OVERHEAD;
        let mut out = Vec::new();
        out.extend_from_slice(&(container as u32).to_le_bytes());
        out.push(RECORD_MARKER);
        out.push(name.len() as u8);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 5]);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn write_pack(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn decrypted_pack(records: &[(&str, &[u8])]) -> Vec<u8> {
        let mut bytes = DECRYPTED_MAGIC.to_vec();
        for (name, payload) in records {
            bytes.extend_from_slice(&record_bytes(name, payload));
        }
        bytes
    }

    fn encrypted_pack(records: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, payload) in records {
            body.extend_from_slice(&record_bytes(name, payload));
        }
        keystream::apply(&mut body, ENCRYPTED_MAGIC.len() as u64);
        let mut bytes = ENCRYPTED_MAGIC.to_vec();
        bytes.extend_from_slice(&body);
        bytes
    }

    fn leaves(node: &FileNode) -> Vec<&FileNode> {
        if node.is_file() {
            vec![node]
        } else {
            node.children().iter().flat_map(leaves).collect()
        }
    }

    #[test]
    fn detects_pack_kinds() {
        let f = write_pack(&encrypted_pack(&[]));
        assert_eq!(PackArchive::open(f.path()).unwrap().kind(), PackKind::Encrypted);

        let f = write_pack(&decrypted_pack(&[]));
        assert_eq!(PackArchive::open(f.path()).unwrap().kind(), PackKind::Decrypted);

        let f = write_pack(b"ZZZZZZZZ");
        assert!(matches!(PackArchive::open(f.path()), Err(Error::UnknownPackKind)));

        let f = write_pack(b"PLP");
        assert!(matches!(PackArchive::open(f.path()), Err(Error::UnknownPackKind)));
    }

    #[test]
    fn minimal_decrypted_pack_yields_one_leaf() {
        let f = write_pack(&decrypted_pack(&[("a", &[0x7F])]));
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());

        let leaves = leaves(pack.tree());
        assert_eq!(leaves.len(), 1);
        let info = leaves[0].file_info().unwrap();
        assert_eq!(leaves[0].name, "a");
        // Payload sits after the 15-byte header and the 1-byte name.
        assert_eq!(info.offset, 5 + 15 + 1);
        assert_eq!(info.size, 1);
        assert_eq!(pack.read(leaves[0]).unwrap(), vec![0x7F]);
    }

    #[test]
    fn off_by_one_container_length_is_rejected() {
        let mut bytes = DECRYPTED_MAGIC.to_vec();
        let mut rec = record_bytes("a", &[0x7F]);
        // container_length = name + data + 18 instead of + 19.
        let bad = (1 + 1 + RECORD_OVERHEAD - 1) as u32;
        rec[0..4].copy_from_slice(&bad.to_le_bytes());
        bytes.extend_from_slice(&rec);

        let f = write_pack(&bytes);
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());
        assert!(leaves(pack.tree()).is_empty());
    }

    #[test]
    fn encrypted_pack_scans_and_reads() {
        let f = write_pack(&encrypted_pack(&[
            ("textures/icon.sct", b"abc"),
            ("data/master.db", &[1, 2, 3, 4]),
        ]));
        let mut pack = PackArchive::open(f.path()).unwrap();
        let progress = Progress::new();
        pack.scan(&progress);
        assert_eq!(progress.get(), 1.0);

        let leaves = leaves(pack.tree());
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].name, "icon.sct");
        assert_eq!(leaves[0].full_path, "textures/icon.sct");
        assert_eq!(leaves[0].file_info().unwrap().format, "sct");
        assert_eq!(pack.read(leaves[0]).unwrap(), b"abc");
        assert_eq!(leaves[1].file_info().unwrap().format, "db");
        assert_eq!(pack.read(leaves[1]).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn tree_nests_folders_in_insertion_order() {
        let f = write_pack(&decrypted_pack(&[
            ("ui/a.png", b"x"),
            ("ui/icons/b.png", b"y"),
            ("ui/a.png", b"z"),
        ]));
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());

        let root = pack.tree();
        assert_eq!(root.name, "root");
        assert_eq!(root.full_path, "");
        assert_eq!(root.children().len(), 1);

        let ui = &root.children()[0];
        assert_eq!(ui.name, "ui");
        assert_eq!(ui.full_path, "ui/");
        let names: Vec<&str> = ui.children().iter().map(|n| n.name.as_str()).collect();
        // Duplicates are appended verbatim, no dedup.
        assert_eq!(names, ["a.png", "icons", "a.png"]);
    }

    #[test]
    fn scan_is_deterministic() {
        let f = write_pack(&encrypted_pack(&[("a/b.sct", b"one"), ("c.db", b"two")]));
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());
        let first = pack.tree().clone();
        pack.scan(&Progress::new());
        assert_eq!(*pack.tree(), first);
    }

    #[test]
    fn every_leaf_is_inside_the_pack() {
        let f = write_pack(&encrypted_pack(&[("a", b"1234"), ("b/c", b"56")]));
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());
        for leaf in leaves(pack.tree()) {
            let info = leaf.file_info().unwrap();
            assert!(info.offset + info.size <= pack.size());
        }
    }

    #[test]
    fn garbage_between_records_is_skipped() {
        let mut bytes = DECRYPTED_MAGIC.to_vec();
        bytes.extend_from_slice(&[0x02, 0x02, 0x02, 0x99, 0x02, 0x00]);
        bytes.extend_from_slice(&record_bytes("ok.bin", b"data"));
        let f = write_pack(&bytes);
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());
        let leaves = leaves(pack.tree());
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].name, "ok.bin");
        assert_eq!(pack.read(leaves[0]).unwrap(), b"data");
    }

    #[test]
    fn read_rejects_out_of_range_leaf() {
        let f = write_pack(&decrypted_pack(&[]));
        let pack = PackArchive::open(f.path()).unwrap();
        let node = FileNode {
            name: "bogus".into(),
            full_path: "bogus".into(),
            data: NodeData::File(FileInfo { offset: 3, size: 100, format: String::new() }),
        };
        assert!(matches!(pack.read(&node), Err(Error::BadFileRange { .. })));
        let folder = FileNode::folder("f", "f/");
        assert!(matches!(pack.read(&folder), Err(Error::NotAFile)));
    }
}
