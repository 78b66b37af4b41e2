use std::fs;
use std::io::Write;

use pack_ripper::extract::{extract_all, ExtractOptions};
use pack_ripper::pack::{PackArchive, PackKind, DECRYPTED_MAGIC, ENCRYPTED_MAGIC};
use pack_ripper::{keystream, skeleton, texture, Error, Progress};

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

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(bytes).unwrap();
    f.flush().unwrap();
    f
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

/// An SCSP container with a magic header, empty string table and all
/// eight sections empty.
fn empty_scsp() -> Vec<u8> {
    let sections_start = 0x6A;
    let mut plain = vec![0u8; sections_start];
    let body: Vec<u8> = vec![0; 16]; // eight zero section counts
    plain[0..4].copy_from_slice(&((sections_start + body.len() - 8) as u32).to_le_bytes());
    plain[8..12].copy_from_slice(b"scsp");
    for field in [0x52usize, 0x56, 0x62, 0x66] {
        plain[field..field + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    }
    plain.extend_from_slice(&body);

    let compressed = lz4_flex::block::compress(&plain);
    let mut data = Vec::new();
    data.extend_from_slice(&(plain.len() as i32).to_le_bytes());
    data.extend_from_slice(&(compressed.len() as i32).to_le_bytes());
    data.extend_from_slice(&compressed);
    data
}

#[test]
fn keystream_invariants_hold() {
    // The keystream's leading bytes are fixed constants.
    assert_eq!(
        &keystream::KEY[..16],
        &[
            0x67, 0x75, 0x4E, 0xBC, 0x89, 0xF5, 0x66, 0xDD, 0x34, 0x6E, 0x12, 0xA3, 0xC4, 0x77,
            0x25, 0x57
        ]
    );

    let original: Vec<u8> = (0u8..=255).collect();
    let mut buf = original.clone();
    keystream::apply(&mut buf, 31337);
    keystream::apply(&mut buf, 31337);
    assert_eq!(buf, original);
}

#[test]
fn short_or_foreign_files_are_unknown_packs() {
    let f = write_temp(b"abc");
    assert!(matches!(PackArchive::open(f.path()), Err(Error::UnknownPackKind)));

    let f = write_temp(b"RIFF\x00\x00\x00\x00");
    assert!(matches!(PackArchive::open(f.path()), Err(Error::UnknownPackKind)));
}

#[test]
fn end_to_end_scan_read_convert_extract() {
    let icon = sct_l8_texture(8, 8, 0x33);
    let scsp = empty_scsp();
    let raw: &[u8] = b"shader source here";
    let pack_bytes = encrypted_pack(&[
        ("gfx/icon.sct", &icon),
        ("anim/hero.scsp", &scsp),
        ("src/light.glsl", raw),
        ("data/broken.db", b"zzz not encrypted zzz"),
    ]);
    let f = write_temp(&pack_bytes);

    let mut pack = PackArchive::open(f.path()).unwrap();
    assert_eq!(pack.kind(), PackKind::Encrypted);

    let progress = Progress::new();
    pack.scan(&progress);
    assert_eq!(progress.get(), 1.0);

    // Every recovered leaf lies inside the pack and reads back to the
    // exact bytes that were packed.
    fn leaves<'n>(node: &'n pack_ripper::FileNode, out: &mut Vec<&'n pack_ripper::FileNode>) {
        if node.is_file() {
            out.push(node);
        }
        for child in node.children() {
            leaves(child, out);
        }
    }
    let mut all = Vec::new();
    leaves(pack.tree(), &mut all);
    assert_eq!(all.len(), 4);
    for leaf in &all {
        let info = leaf.file_info().unwrap();
        assert!(info.offset + info.size <= pack.size());
    }
    assert_eq!(pack.read(all[0]).unwrap(), icon);
    assert_eq!(pack.read(all[2]).unwrap(), raw);

    // Library-level conversions on the recovered bytes.
    let png = texture::to_png(&pack.read(all[0]).unwrap()).unwrap();
    let img = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (8, 8));

    let skeleton_json = skeleton::to_json(&pack.read(all[1]).unwrap()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&skeleton_json).unwrap();
    assert_eq!(doc["skeleton"]["spine"], serde_json::json!("3.8.79"));
    assert_eq!(skeleton_json, skeleton::to_json(&pack.read(all[1]).unwrap()).unwrap());

    // Bulk extraction mirrors the tree and applies the converters.
    let out = tempfile::tempdir().unwrap();
    extract_all(&pack, pack.tree(), out.path(), &progress, ExtractOptions::default()).unwrap();

    assert!(out.path().join("gfx/icon.png").exists());
    assert!(out.path().join("anim/hero.scsp").exists());
    assert_eq!(fs::read(out.path().join("src/light.glsl")).unwrap(), raw);
    // A table that does not decrypt degrades to the `{}` stub.
    assert_eq!(fs::read(out.path().join("data/broken.json")).unwrap(), b"{}");
}

#[test]
fn decrypted_and_encrypted_scans_agree() {
    let records: [(&str, &[u8]); 2] = [("a/b.bin", b"0123456789"), ("c.bin", b"xyz")];

    let mut plain = DECRYPTED_MAGIC.to_vec();
    for (name, payload) in &records {
        plain.extend_from_slice(&record_bytes(name, payload));
    }
    let f_plain = write_temp(&plain);
    let f_enc = write_temp(&encrypted_pack(&records));

    let mut a = PackArchive::open(f_plain.path()).unwrap();
    let mut b = PackArchive::open(f_enc.path()).unwrap();
    a.scan(&Progress::new());
    b.scan(&Progress::new());

    assert_eq!(a.tree(), b.tree());
}
