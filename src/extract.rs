//! Bulk extraction: walk the file tree, convert what has a converter,
//! dump the rest verbatim.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::pack::{FileNode, NodeData, PackArchive};
use crate::progress::Progress;
use crate::{table, texture};

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub convert_textures: bool,
    pub convert_tables: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions { convert_textures: true, convert_tables: true }
    }
}

/// Extract every leaf under `node` into `dest`, mirroring the folder
/// tree. Per-file failures are logged and skipped; extraction is
/// best-effort by design.
pub fn extract_all(
    pack: &PackArchive,
    node: &FileNode,
    dest: &Path,
    progress: &Progress,
    options: ExtractOptions,
) -> Result<()> {
    let total = total_leaf_bytes(node);
    if total == 0 {
        progress.set(1.0);
        return Ok(());
    }
    let mut extracted = 0u64;
    extract_node(pack, node, dest, &mut extracted, total, progress, options)?;
    progress.set(1.0);
    Ok(())
}

fn total_leaf_bytes(node: &FileNode) -> u64 {
    match &node.data {
        NodeData::File(info) => info.size,
        NodeData::Folder(folder) => folder.children.iter().map(total_leaf_bytes).sum(),
    }
}

fn extract_node(
    pack: &PackArchive,
    node: &FileNode,
    current: &Path,
    extracted: &mut u64,
    total: u64,
    progress: &Progress,
    options: ExtractOptions,
) -> Result<()> {
    match &node.data {
        NodeData::File(info) => {
            if let Err(err) = extract_file(pack, node, current, options) {
                tracing::warn!(path = %node.full_path, %err, "extraction failed, skipping");
            }
            *extracted += info.size;
            progress.set(*extracted as f32 / total as f32);
        }
        NodeData::Folder(folder) => {
            // The synthetic root folder is not materialized.
            let dir = if node.name == "root" {
                current.to_path_buf()
            } else {
                let dir = current.join(&node.name);
                fs::create_dir_all(&dir)?;
                dir
            };
            for child in &folder.children {
                extract_node(pack, child, &dir, extracted, total, progress, options)?;
            }
        }
    }
    Ok(())
}

fn extract_file(pack: &PackArchive, node: &FileNode, dir: &Path, options: ExtractOptions) -> Result<()> {
    let info = node.file_info().expect("leaf node");
    let data = pack.read(node)?;

    let (name, body) = if options.convert_textures && matches!(info.format.as_str(), "sct" | "sct2")
    {
        // A texture that will not decode writes nothing at all.
        let png = texture::to_png(&data)?;
        (Path::new(&node.name).with_extension("png"), png)
    } else if options.convert_tables && info.format == "db" {
        let body = match table::to_json(&data) {
            Ok(json) => json.into_bytes(),
            Err(err) => {
                tracing::warn!(path = %node.full_path, %err, "table decode failed, writing stub");
                b"{}".to_vec()
            }
        };
        (Path::new(&node.name).with_extension("json"), body)
    } else {
        (Path::new(&node.name).to_path_buf(), data)
    };

    fs::create_dir_all(dir)?;
    let target = dir.join(name);
    fs::write(&target, body)?;
    tracing::debug!(path = %target.display(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystream;
    use crate::pack::{PackArchive, DECRYPTED_MAGIC, ENCRYPTED_MAGIC};
    use std::io::Write;

    fn record_bytes(name: &str, payload: &[u8]) -> Vec<u8> {
        let container = name.len() + payload.len() + 19;
        let mut out = Vec::new();
        out.extend_from_slice(&(container as u32).to_le_bytes());
        out.push(0x02);
        out.push(name.len() as u8);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 5]);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn sct_l8_texture(width: u16, height: u16, gray: u8) -> Vec<u8> {
        let pixels = vec![gray; width as usize * height as usize];
        let compressed = lz4_flex::block::compress(&pixels);
        let mut data = b"SCT\x00".to_vec();
        data.push(102);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&(pixels.len() as i32).to_le_bytes());
        data.extend_from_slice(&(compressed.len() as i32).to_le_bytes());
        data.extend_from_slice(&compressed);
        data
    }

    /// A one-row, one-column table, stream-ciphered with rotation 0.
    fn table_bytes() -> Vec<u8> {
        let entries: [(&str, &[u8]); 5] = [
            ("\trows", &[1, 0, 0, 0]),
            ("\tcols", &[1, 0, 0, 0]),
            ("\t0", b"name"),
            ("\t\t0", b"row0"),
            ("row0", b"alice\0"),
        ];

        let mut plain = Vec::new();
        plain.extend_from_slice(b"PLPcK");
        plain.push(1);
        plain.extend_from_slice(&0x26u16.to_le_bytes());
        plain.push(0);
        plain.extend_from_slice(&0u64.to_le_bytes());
        plain.extend_from_slice(&0u32.to_le_bytes());
        plain.extend_from_slice(&1u32.to_le_bytes());
        plain.push(0);
        plain.extend_from_slice(&0x26u32.to_le_bytes());
        plain.extend_from_slice(&0u64.to_le_bytes());

        plain.extend_from_slice(&10u32.to_le_bytes());
        plain.push(1);
        let chain_start = 0x26u64 + 10;
        plain.push((chain_start >> 32) as u8);
        plain.extend_from_slice(&(chain_start as u32).to_le_bytes());

        let mut offset = chain_start;
        for (i, (name, data)) in entries.iter().enumerate() {
            // 15-byte chain header plus name and data.
            let size = (15 + name.len() + data.len()) as u64;
            let next = if i + 1 < entries.len() { offset + size } else { 0 };
            plain.extend_from_slice(&((15 + name.len() + data.len()) as u32).to_le_bytes());
            plain.push(1);
            plain.push(name.len() as u8);
            plain.extend_from_slice(&(data.len() as u32).to_le_bytes());
            plain.push((next >> 32) as u8);
            plain.extend_from_slice(&(next as u32).to_le_bytes());
            plain.extend_from_slice(name.as_bytes());
            plain.extend_from_slice(data);
            offset += size;
        }

        plain
            .iter()
            .enumerate()
            .map(|(j, &b)| b ^ table::KEY[j % table::KEY.len()])
            .collect()
    }

    fn build_pack(records: &[(&str, &[u8])], encrypted: bool) -> tempfile::NamedTempFile {
        let mut body = Vec::new();
        for (name, payload) in records {
            body.extend_from_slice(&record_bytes(name, payload));
        }
        let mut bytes = if encrypted {
            keystream::apply(&mut body, 5);
            ENCRYPTED_MAGIC.to_vec()
        } else {
            DECRYPTED_MAGIC.to_vec()
        };
        bytes.extend_from_slice(&body);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn extracts_converts_and_mirrors_folders() {
        let texture = sct_l8_texture(4, 4, 0x55);
        let db = table_bytes();
        let raw: &[u8] = b"plain contents";
        let f = build_pack(
            &[
                ("gfx/icon.sct", &texture),
                ("data/master.db", &db),
                ("notes/readme.txt", raw),
            ],
            true,
        );

        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());

        let out = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        extract_all(&pack, pack.tree(), out.path(), &progress, ExtractOptions::default()).unwrap();
        assert_eq!(progress.get(), 1.0);

        let png = fs::read(out.path().join("gfx/icon.png")).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert!(img.pixels().all(|p| p.0 == [0x55, 0x55, 0x55, 255]));

        let json = fs::read_to_string(out.path().join("data/master.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, serde_json::json!([{ "name": "alice" }]));

        assert_eq!(fs::read(out.path().join("notes/readme.txt")).unwrap(), raw);

        // The synthetic root folder is not materialized as "root".
        assert!(!out.path().join("root").exists());
    }

    #[test]
    fn conversions_can_be_disabled() {
        let texture = sct_l8_texture(2, 2, 0x10);
        let db = table_bytes();
        let f = build_pack(&[("icon.sct", &texture), ("master.db", &db)], false);

        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());

        let out = tempfile::tempdir().unwrap();
        let options = ExtractOptions { convert_textures: false, convert_tables: false };
        extract_all(&pack, pack.tree(), out.path(), &Progress::new(), options).unwrap();

        assert_eq!(fs::read(out.path().join("icon.sct")).unwrap(), texture);
        assert_eq!(fs::read(out.path().join("master.db")).unwrap(), db);
        assert!(!out.path().join("icon.png").exists());
    }

    #[test]
    fn failed_table_writes_stub_and_failed_texture_writes_nothing() {
        let f = build_pack(
            &[("bad.db", b"not a database"), ("bad.sct", b"not a texture file")],
            false,
        );

        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());

        let out = tempfile::tempdir().unwrap();
        extract_all(&pack, pack.tree(), out.path(), &Progress::new(), ExtractOptions::default())
            .unwrap();

        assert_eq!(fs::read(out.path().join("bad.json")).unwrap(), b"{}");
        assert!(!out.path().join("bad.sct").exists());
        assert!(!out.path().join("bad.png").exists());
    }

    #[test]
    fn empty_tree_completes_immediately() {
        let f = build_pack(&[], false);
        let mut pack = PackArchive::open(f.path()).unwrap();
        pack.scan(&Progress::new());
        let out = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        extract_all(&pack, pack.tree(), out.path(), &progress, ExtractOptions::default()).unwrap();
        assert_eq!(progress.get(), 1.0);
    }
}
