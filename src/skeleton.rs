//! SCSP skeletal-animation binary to Spine-3.x-shaped JSON.
//!
//! The container is an LZ4 block whose decompressed form is a string
//! table plus fixed-order sections: bones, IK constraints, slots,
//! transform constraints, path constraints, skins, events, animations.
//! All cross-references on disk are indices into earlier sections, so
//! the parser captures index -> name maps as it walks and resolves
//! references through them; nothing owns anything else.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::lz4;
use crate::reader::BufferReader;

const MAGIC: &[u8; 4] = b"scsp";
const ABSENT: u32 = 0xFFFF_FFFF;
const SECTIONS_START: usize = 0x08 + 0x62;
/// Header versions past this carry linked-mesh and deform skin
/// references as indices instead of inline names.
const SKIN_INDEX_VERSION: u32 = 0x7530;
/// One stored curve block: a type tag plus nine sampled (x, y) points.
const CURVE_BLOCK_LEN: usize = 19;

/// Decompress and convert an SCSP container to a JSON string.
pub fn to_json(data: &[u8]) -> Result<String> {
    let decompressed = lz4::decompress_sized(data)?;
    let doc = parse(&decompressed)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

struct Header {
    version: u32,
    width: f32,
    height: f32,
    hash: String,
    version_str: String,
    images_path: String,
    audio_path: String,
}

struct Walker<'a> {
    r: BufferReader<'a>,
    strings_base: usize,
    strings_end: usize,
}

impl<'a> Walker<'a> {
    fn resolve(&self, rel: u32) -> String {
        if rel == ABSENT {
            return String::new();
        }
        let off = self.strings_base + rel as usize;
        if off >= self.strings_end {
            return String::new();
        }
        self.r.cstr_at(off, self.strings_end)
    }

    fn read_string(&mut self) -> Result<String> {
        let rel = self.r.read_u32()?;
        Ok(self.resolve(rel))
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.r.read_u8()? != 0)
    }

    fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.r.read_f32()?);
        }
        Ok(out)
    }

    /// A u16-counted f32 array, the layout every timeline uses for its
    /// value and curve streams.
    fn read_counted_f32(&mut self) -> Result<Vec<f32>> {
        let count = self.r.read_u16()? as usize;
        self.read_f32_array(count)
    }
}

struct AttachmentMeta {
    weighted: bool,
    setup: Vec<f32>,
}

type AttachmentMetaMap = HashMap<(String, u16, String), AttachmentMeta>;

#[derive(Default)]
struct Names {
    bones: HashMap<i16, String>,
    slots: HashMap<i16, String>,
    iks: Vec<String>,
    transforms: Vec<String>,
    paths: Vec<String>,
    skins: Vec<String>,
}

fn parse(buf: &[u8]) -> Result<Value> {
    if buf.is_empty() {
        return Err(Error::BadSkeleton("empty after decompression"));
    }
    if buf.len() < SECTIONS_START {
        return Err(Error::BadSkeleton("shorter than the fixed header"));
    }

    let mut r = BufferReader::new(buf);
    let string_offset = r.read_u32()? as usize;
    let string_length = r.read_u32()? as usize;
    let strings_base = string_offset + 8;
    let strings_end = strings_base + string_length;
    if strings_end > buf.len() {
        return Err(Error::BadSkeleton("string table exceeds buffer"));
    }
    if &buf[0x08..0x0C] != MAGIC {
        return Err(Error::BadSkeleton("bad magic"));
    }

    let mut w = Walker { r, strings_base, strings_end };

    let header = parse_header(&mut w)?;
    w.r.seek(SECTIONS_START)?;

    let mut names = Names::default();
    let bones = parse_bones(&mut w, &mut names);
    let iks = parse_ik_constraints(&mut w, &mut names);
    let slots = parse_slots(&mut w, &mut names);
    let transforms = parse_transform_constraints(&mut w, &mut names);
    let paths = parse_path_constraints(&mut w, &mut names);
    let mut attachment_meta = AttachmentMetaMap::new();
    let skins = parse_skins(&mut w, &mut names, &mut attachment_meta, header.version);
    let events = parse_events(&mut w);
    let animations = parse_animations(&mut w, &names, &attachment_meta, header.version);

    let mut skeleton = Map::new();
    let spine = if header.version_str.is_empty() {
        "3.8.79".to_string()
    } else {
        header.version_str.clone()
    };
    skeleton.insert("spine".into(), Value::String(spine));
    skeleton.insert("x".into(), jnum(0.0));
    skeleton.insert("y".into(), jnum(0.0));
    if header.width != 0.0 {
        skeleton.insert("width".into(), jnum(header.width));
    }
    if header.height != 0.0 {
        skeleton.insert("height".into(), jnum(header.height));
    }
    if !header.hash.is_empty() {
        skeleton.insert("hash".into(), Value::String(header.hash));
    }
    if !header.images_path.is_empty() {
        skeleton.insert("images".into(), Value::String(header.images_path));
    }
    if !header.audio_path.is_empty() {
        skeleton.insert("audio".into(), Value::String(header.audio_path));
    }

    let mut doc = Map::new();
    doc.insert("skeleton".into(), Value::Object(skeleton));
    doc.insert("bones".into(), bones);
    doc.insert("ik".into(), iks);
    doc.insert("slots".into(), slots);
    doc.insert("transform".into(), transforms);
    doc.insert("path".into(), paths);
    doc.insert("skins".into(), skins);
    doc.insert("events".into(), events);
    doc.insert("animations".into(), animations);
    Ok(Value::Object(doc))
}

fn parse_header(w: &mut Walker) -> Result<Header> {
    w.r.seek(0x0C)?;
    let version = w.r.read_u32()?;

    w.r.seek(0x08 + 0x0E)?;
    let width = w.r.read_f32()?;
    let height = w.r.read_f32()?;

    w.r.seek(0x08 + 0x4A)?;
    let hash = w.read_string()?;
    let mut version_str = w.read_string()?;

    w.r.seek(0x08 + 0x5A)?;
    let images_path = w.read_string()?;
    let audio_path = w.read_string()?;

    if let Some(stripped) = version_str.strip_suffix(".scsp") {
        version_str = stripped.to_string();
    }

    Ok(Header { version, width, height, hash, version_str, images_path, audio_path })
}

// ---------------------------------------------------------------------------
// numeric / color emission

/// JSON number with re-export-stable rounding: six decimals, and values
/// within 1e-5 of an integer collapse to the integer.
fn jnum(v: f32) -> Value {
    let v = v as f64;
    let nearest = v.round();
    if (v - nearest).abs() < 1e-5 {
        return Value::from(nearest as i64);
    }
    Value::from((v * 1e6).round() / 1e6)
}

fn quantize(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn rgba_to_hex(r: f32, g: f32, b: f32, a: f32) -> String {
    format!("{:02X}{:02X}{:02X}{:02X}", quantize(r), quantize(g), quantize(b), quantize(a))
}

fn rgb_to_hex(r: f32, g: f32, b: f32) -> String {
    format!("{:02X}{:02X}{:02X}", quantize(r), quantize(g), quantize(b))
}

// ---------------------------------------------------------------------------
// Bézier reconstruction

/// Recover the two Bézier control points from a stored curve block.
///
/// The block holds nine forward-difference samples of the curve at
/// t = 1/10 steps; the first three x (and y) samples pin down the
/// initial difference terms, which invert back to the control points.
fn bezier_from_samples(block: &[f32]) -> Option<(f32, f32, f32, f32)> {
    if block.len() < CURVE_BLOCK_LEN {
        return None;
    }
    let (x0, y0) = (block[1], block[2]);
    let (x1, y1) = (block[3], block[4]);
    let (x2, y2) = (block[5], block[6]);

    let ddfx = x1 - 2.0 * x0;
    let dddfx = x2 - 3.0 * x1 + 3.0 * x0;
    let ddfy = y1 - 2.0 * y0;
    let dddfy = y2 - 3.0 * y1 + 3.0 * y0;

    let h = 1.0f32 / 10.0;
    let a = 3.0 * h * h;
    let b = 6.0 * h * h * h;

    let ux = (dddfx / b - 1.0) / 3.0;
    let vx = (ddfx - dddfx) / (2.0 * a);
    let uy = (dddfy / b - 1.0) / 3.0;
    let vy = (ddfy - dddfy) / (2.0 * a);

    let clamp = |v: f32| v.clamp(0.0, 1.0);
    Some((
        clamp(-vx - ux),
        clamp(-vy - uy),
        clamp(-vx - 2.0 * ux),
        clamp(-vy - 2.0 * uy),
    ))
}

/// Attach frame `i`'s curve to the frame object: 1 is a stepped curve,
/// 2 a Bézier block, anything else linear (no key emitted).
fn maybe_add_curve(i: usize, curves: &[f32], frame: &mut Map<String, Value>) {
    let start = i * CURVE_BLOCK_LEN;
    let end = start + CURVE_BLOCK_LEN;
    if end > curves.len() {
        return;
    }
    let block = &curves[start..end];
    if block[0] == 1.0 {
        frame.insert("curve".into(), Value::String("stepped".into()));
    } else if block[0] == 2.0 {
        if let Some((cx1, cy1, cx2, cy2)) = bezier_from_samples(block) {
            frame.insert("curve".into(), jnum(cx1));
            frame.insert("c2".into(), jnum(cy1));
            frame.insert("c3".into(), jnum(cx2));
            frame.insert("c4".into(), jnum(cy2));
        }
    }
}

// ---------------------------------------------------------------------------
// sections

fn parse_bones(w: &mut Walker, names: &mut Names) -> Value {
    let transform_modes = [
        "normal",
        "onlyTranslation",
        "noRotationOrReflection",
        "noScale",
        "noScaleOrReflection",
    ];

    let mut bones = Vec::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Array(bones);
    };

    for _ in 0..count {
        let parsed: Result<()> = (|| {
            let index = w.r.read_i16()?;
            let name = w.read_string()?;
            let parent = w.r.read_i16()?;
            let fields = w.read_f32_array(8)?;
            let tmode = w.r.read_u16()?;
            let skin = w.read_bool()?;

            if name.is_empty() {
                return Ok(());
            }
            names.bones.insert(index, name.clone());

            let [length, x, y, rotation, scale_x, scale_y, shear_x, shear_y] =
                [fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7]];

            let mut bone = Map::new();
            bone.insert("name".into(), Value::String(name));
            if parent >= 0 {
                if let Some(parent_name) = names.bones.get(&parent) {
                    bone.insert("parent".into(), Value::String(parent_name.clone()));
                }
            }
            if length != 0.0 {
                bone.insert("length".into(), jnum(length));
            }
            if x != 0.0 {
                bone.insert("x".into(), jnum(x));
            }
            if y != 0.0 {
                bone.insert("y".into(), jnum(y));
            }
            if rotation != 0.0 {
                bone.insert("rotation".into(), jnum(rotation));
            }
            if scale_x != 1.0 {
                bone.insert("scaleX".into(), jnum(scale_x));
            }
            if scale_y != 1.0 {
                bone.insert("scaleY".into(), jnum(scale_y));
            }
            if shear_x != 0.0 {
                bone.insert("shearX".into(), jnum(shear_x));
            }
            if shear_y != 0.0 {
                bone.insert("shearY".into(), jnum(shear_y));
            }
            if let Some(mode) = transform_modes.get(tmode as usize) {
                bone.insert("transform".into(), Value::String((*mode).into()));
            }
            if skin {
                bone.insert("skin".into(), Value::Bool(true));
            }
            bones.push(Value::Object(bone));
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Array(bones)
}

fn parse_ik_constraints(w: &mut Walker, names: &mut Names) -> Value {
    let mut iks = Vec::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Array(iks);
    };

    for i in 0..count {
        let parsed: Result<()> = (|| {
            let mut name = w.read_string()?;
            if name.is_empty() {
                name = format!("ik{}", i);
            }
            let order = w.r.read_u32()?;
            let skin_required = w.read_bool()?;
            let bend_direction = w.r.read_i32()?;
            let compress = w.read_bool()?;
            let mix = w.r.read_f32()?;
            let softness = w.r.read_f32()?;
            let stretch = w.read_bool()?;
            let uniform = w.read_bool()?;
            let target = w.r.read_i16()?;

            let bone_count = w.r.read_u16()?;
            let mut bones = Vec::new();
            for _ in 0..bone_count {
                let idx = w.r.read_i16()?;
                if idx >= 0 {
                    if let Some(bone) = names.bones.get(&idx) {
                        bones.push(Value::String(bone.clone()));
                    }
                }
            }

            let target_name = if target >= 0 {
                names.bones.get(&target).cloned().unwrap_or_default()
            } else {
                String::new()
            };

            let mut ik = Map::new();
            ik.insert("name".into(), Value::String(name.clone()));
            ik.insert("order".into(), Value::from(order));
            ik.insert("skin".into(), Value::Bool(skin_required));
            ik.insert("bones".into(), Value::Array(bones));
            ik.insert("target".into(), Value::String(target_name));
            ik.insert("mix".into(), jnum(mix));
            ik.insert("softness".into(), jnum(softness));
            ik.insert("bendPositive".into(), Value::Bool(bend_direction >= 0));
            if compress {
                ik.insert("compress".into(), Value::Bool(true));
            }
            if stretch {
                ik.insert("stretch".into(), Value::Bool(true));
            }
            if uniform {
                ik.insert("uniform".into(), Value::Bool(true));
            }

            names.iks.push(name);
            iks.push(Value::Object(ik));
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Array(iks)
}

fn parse_slots(w: &mut Walker, names: &mut Names) -> Value {
    let blend_modes = ["normal", "additive", "multiply", "screen"];

    let mut slots = Vec::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Array(slots);
    };

    for _ in 0..count {
        let parsed: Result<()> = (|| {
            let slot_index = w.r.read_i16()?;
            let mut name = w.read_string()?;
            let bone_index = w.r.read_i16()?;
            let light = w.read_f32_array(4)?;
            let dark = w.read_f32_array(4)?;
            let has_dark = w.read_bool()?;
            let attachment = w.read_string()?;
            let blend_raw = w.r.read_u16()?;

            if name.is_empty() {
                name = format!("slot{}", slot_index);
            }
            names.slots.insert(slot_index, name.clone());

            let bone_name = names.bones.get(&bone_index).cloned().unwrap_or_default();

            let mut slot = Map::new();
            slot.insert("name".into(), Value::String(name));
            slot.insert("bone".into(), Value::String(bone_name));

            let color = rgba_to_hex(light[0], light[1], light[2], light[3]);
            if color != "FFFFFFFF" {
                slot.insert("color".into(), Value::String(color));
            }
            if has_dark {
                slot.insert("dark".into(), Value::String(rgb_to_hex(dark[0], dark[1], dark[2])));
            }
            if !attachment.is_empty() {
                slot.insert("attachment".into(), Value::String(attachment));
            }
            let blend = blend_modes.get(blend_raw as usize).copied().unwrap_or("normal");
            if blend != "normal" {
                slot.insert("blend".into(), Value::String(blend.into()));
            }

            slots.push(Value::Object(slot));
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Array(slots)
}

fn parse_transform_constraints(w: &mut Walker, names: &mut Names) -> Value {
    let mut transforms = Vec::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Array(transforms);
    };

    for i in 0..count {
        let parsed: Result<()> = (|| {
            let mut name = w.read_string()?;
            if name.is_empty() {
                name = format!("transform{}", i);
            }
            let order = w.r.read_u32()?;
            let skin_required = w.read_bool()?;
            let mixes = w.read_f32_array(10)?;
            let relative = w.read_bool()?;
            let local = w.read_bool()?;
            let target = w.r.read_i16()?;

            let target_name = if target >= 0 {
                names.bones.get(&target).cloned().unwrap_or_else(|| "root".into())
            } else {
                "root".into()
            };

            let bone_count = w.r.read_u16()?;
            let mut bones = Vec::new();
            for _ in 0..bone_count {
                let idx = w.r.read_i16()?;
                let bone = if idx >= 0 {
                    names.bones.get(&idx).cloned().unwrap_or_else(|| "root".into())
                } else {
                    "root".into()
                };
                bones.push(Value::String(bone));
            }

            let mut tr = Map::new();
            tr.insert("name".into(), Value::String(name.clone()));
            tr.insert("order".into(), Value::from(order));
            tr.insert("skin".into(), Value::Bool(skin_required));
            tr.insert("target".into(), Value::String(target_name));
            tr.insert("bones".into(), Value::Array(bones));
            tr.insert("rotateMix".into(), jnum(mixes[0]));
            tr.insert("translateMix".into(), jnum(mixes[1]));
            tr.insert("scaleMix".into(), jnum(mixes[2]));
            tr.insert("shearMix".into(), jnum(mixes[3]));
            tr.insert("rotation".into(), jnum(mixes[4]));
            tr.insert("x".into(), jnum(mixes[5]));
            tr.insert("y".into(), jnum(mixes[6]));
            tr.insert("scaleX".into(), jnum(mixes[7]));
            tr.insert("scaleY".into(), jnum(mixes[8]));
            tr.insert("shearY".into(), jnum(mixes[9]));
            tr.insert("relative".into(), Value::Bool(relative));
            tr.insert("local".into(), Value::Bool(local));

            names.transforms.push(name);
            transforms.push(Value::Object(tr));
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Array(transforms)
}

fn parse_path_constraints(w: &mut Walker, names: &mut Names) -> Value {
    let position_modes = ["fixed", "percent"];
    let spacing_modes = ["length", "fixed", "percent"];
    let rotate_modes = ["tangent", "chain", "chainScale"];

    let mut paths = Vec::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Array(paths);
    };

    for i in 0..count {
        let parsed: Result<()> = (|| {
            let mut name = w.read_string()?;
            if name.is_empty() {
                name = format!("path{}", i);
            }
            let order = w.r.read_u32()?;
            let skin_required = w.read_bool()?;
            let position_mode = w.r.read_u16()?;
            let spacing_mode = w.r.read_u16()?;
            let rotate_mode = w.r.read_u16()?;
            let rotation = w.r.read_f32()?;
            let position = w.r.read_f32()?;
            let spacing = w.r.read_f32()?;
            let rotate_mix = w.r.read_f32()?;
            let translate_mix = w.r.read_f32()?;
            let target = w.r.read_i16()?;

            let target_name = if target >= 0 {
                names.slots.get(&target).cloned().unwrap_or_else(|| "slot0".into())
            } else {
                "slot0".into()
            };

            let bone_count = w.r.read_u16()?;
            let mut bones = Vec::new();
            for _ in 0..bone_count {
                let idx = w.r.read_i16()?;
                let bone = if idx >= 0 {
                    names.bones.get(&idx).cloned().unwrap_or_else(|| "root".into())
                } else {
                    "root".into()
                };
                bones.push(Value::String(bone));
            }

            let mut pc = Map::new();
            pc.insert("name".into(), Value::String(name.clone()));
            pc.insert("order".into(), Value::from(order));
            pc.insert("skin".into(), Value::Bool(skin_required));
            pc.insert(
                "positionMode".into(),
                Value::String(position_modes.get(position_mode as usize).copied().unwrap_or("percent").into()),
            );
            pc.insert(
                "spacingMode".into(),
                Value::String(spacing_modes.get(spacing_mode as usize).copied().unwrap_or("length").into()),
            );
            pc.insert(
                "rotateMode".into(),
                Value::String(rotate_modes.get(rotate_mode as usize).copied().unwrap_or("tangent").into()),
            );
            pc.insert("rotation".into(), jnum(rotation));
            pc.insert("position".into(), jnum(position));
            pc.insert("spacing".into(), jnum(spacing));
            pc.insert("rotateMix".into(), jnum(rotate_mix));
            pc.insert("translateMix".into(), jnum(translate_mix));
            pc.insert("target".into(), Value::String(target_name));
            pc.insert("bones".into(), Value::Array(bones));

            names.paths.push(name);
            paths.push(Value::Object(pc));
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Array(paths)
}

// ---------------------------------------------------------------------------
// skins and attachments

struct VertexStream {
    bones: Vec<i16>,
    verts: Vec<f32>,
    world_vertex_len: u32,
    path: String,
}

impl VertexStream {
    fn weighted(&self) -> bool {
        !self.bones.is_empty()
    }

    /// Weighted streams re-emit the packed `[count, (bone, x, y, w)…]`
    /// form; unweighted streams are a flat float array.
    fn vertices_json(&self) -> Value {
        if !self.weighted() {
            return Value::Array(self.verts.iter().map(|&v| jnum(v)).collect());
        }
        let mut arr = Vec::new();
        let mut i = 0;
        let mut vf = 0;
        while i < self.bones.len() {
            let count = self.bones[i] as usize;
            i += 1;
            arr.push(Value::from(count as i64));
            for _ in 0..count {
                if i >= self.bones.len() || vf + 3 > self.verts.len() {
                    return Value::Array(arr);
                }
                arr.push(Value::from(self.bones[i] as i64));
                arr.push(jnum(self.verts[vf]));
                arr.push(jnum(self.verts[vf + 1]));
                arr.push(jnum(self.verts[vf + 2]));
                i += 1;
                vf += 3;
            }
        }
        Value::Array(arr)
    }

    fn record_meta(&self, meta: &mut AttachmentMetaMap, skin: &str, slot: u16, name: &str) {
        meta.insert(
            (skin.to_string(), slot, name.to_string()),
            AttachmentMeta {
                weighted: self.weighted(),
                setup: if self.weighted() { Vec::new() } else { self.verts.clone() },
            },
        );
    }
}

fn parse_vertex_stream(w: &mut Walker) -> Result<VertexStream> {
    let bone_count = w.r.read_u16()? as usize;
    let mut bones = Vec::with_capacity(bone_count);
    for _ in 0..bone_count {
        bones.push(w.r.read_i16()?);
    }
    let verts = w.read_counted_f32()?;
    let world_vertex_len = w.r.read_u32()?;
    let path_rel = w.r.read_u32()?;
    let path = w.resolve(path_rel);
    Ok(VertexStream { bones, verts, world_vertex_len, path })
}

fn parse_skins(
    w: &mut Walker,
    names: &mut Names,
    meta: &mut AttachmentMetaMap,
    hdr_version: u32,
) -> Value {
    let mut skins = Vec::new();
    let Ok(skin_count) = w.r.read_u16() else {
        return Value::Array(skins);
    };

    'skins: for _ in 0..skin_count {
        let Ok(raw_name) = w.read_string() else { break };
        let name = if raw_name.is_empty() { "default".to_string() } else { raw_name };
        names.skins.push(name.clone());

        // Skin-scoped bone and constraint index lists are not part of
        // the JSON export; skip them.
        let Ok(bone_count) = w.r.read_u16() else { break };
        if w.r.skip(2 * bone_count as usize).is_err() {
            break;
        }
        let Ok(constraint_count) = w.r.read_u16() else { break };
        if w.r.skip(4 * constraint_count as usize).is_err() {
            break;
        }

        let mut attachments = Map::new();
        let Ok(attachment_count) = w.r.read_u16() else { break };

        for a in 0..attachment_count {
            let parsed = parse_attachment(w, names, meta, hdr_version, &name, a);
            let Ok(entry) = parsed else { break 'skins };
            let Some((slot_name, att_name, att)) = entry else { continue };
            attachments
                .entry(slot_name)
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .expect("slot entry is an object")
                .insert(att_name, att);
        }

        let mut skin = Map::new();
        skin.insert("name".into(), Value::String(name));
        skin.insert("attachments".into(), Value::Object(attachments));
        skins.push(Value::Object(skin));
    }

    let mut skins = Value::Array(skins);
    resolve_linked_mesh_skins(&mut skins, &names.skins);
    skins
}

fn parse_attachment(
    w: &mut Walker,
    names: &Names,
    meta: &mut AttachmentMetaMap,
    hdr_version: u32,
    skin_name: &str,
    index: u16,
) -> Result<Option<(String, String, Value)>> {
    let slot_index = w.r.read_u16()?;
    let slot_name = names
        .slots
        .get(&(slot_index as i16))
        .cloned()
        .unwrap_or_else(|| format!("slot{}", slot_index));

    let raw_name = w.read_string()?;
    let att_name = if raw_name.is_empty() { format!("att{}", index) } else { raw_name };

    let kind = w.r.read_i16()?;
    let _constructor_name = w.r.read_u32()?;

    let mut att = Map::new();
    match kind {
        0 => {
            // Region
            let x = w.r.read_f32()?;
            let y = w.r.read_f32()?;
            let rotation = w.r.read_f32()?;
            let scale_x = w.r.read_f32()?;
            let scale_y = w.r.read_f32()?;
            let width = w.r.read_f32()?;
            let height = w.r.read_f32()?;
            w.r.skip(24)?;

            let vertex_count = w.r.read_u16()? as usize;
            w.r.skip(4 * vertex_count)?;
            let uv_count = w.r.read_u16()? as usize;
            w.r.skip(4 * uv_count)?;

            let path = w.read_string()?;
            let color = w.read_f32_array(4)?;

            att.insert("type".into(), Value::String("region".into()));
            att.insert("x".into(), jnum(x));
            att.insert("y".into(), jnum(y));
            att.insert("rotation".into(), jnum(rotation));
            att.insert("scaleX".into(), jnum(scale_x));
            att.insert("scaleY".into(), jnum(scale_y));
            att.insert("width".into(), jnum(width));
            att.insert("height".into(), jnum(height));
            if !path.is_empty() {
                att.insert("path".into(), Value::String(path));
            }
            let hex = rgba_to_hex(color[0], color[1], color[2], color[3]);
            if hex != "FFFFFFFF" {
                att.insert("color".into(), Value::String(hex));
            }
        }
        1 => {
            // Bounding box
            let stream = parse_vertex_stream(w)?;
            stream.record_meta(meta, skin_name, slot_index, &att_name);

            att.insert("type".into(), Value::String("boundingbox".into()));
            att.insert("vertexCount".into(), Value::from(stream.world_vertex_len >> 1));
            att.insert("vertices".into(), stream.vertices_json());
            if !stream.path.is_empty() {
                att.insert("path".into(), Value::String(stream.path.clone()));
            }
        }
        2 | 3 => {
            // Mesh / linked mesh
            let stream = parse_vertex_stream(w)?;
            stream.record_meta(meta, skin_name, slot_index, &att_name);
            w.r.skip(24)?;

            let _uvs = w.read_counted_f32()?;
            let region_uvs = w.read_counted_f32()?;

            let triangle_count = w.r.read_u16()? as usize;
            let mut triangles = Vec::with_capacity(triangle_count);
            for _ in 0..triangle_count {
                triangles.push(Value::from(w.r.read_u16()?));
            }
            let edge_count = w.r.read_u16()? as usize;
            let mut edges = Vec::with_capacity(edge_count);
            for _ in 0..edge_count {
                edges.push(Value::from(w.r.read_u16()?));
            }

            let mesh_path = {
                let overriding = w.read_string()?;
                if overriding.is_empty() { stream.path.clone() } else { overriding }
            };

            let _region = w.read_f32_array(4)?;
            let width = w.r.read_f32()?;
            let height = w.r.read_f32()?;
            let _color = w.read_f32_array(4)?;
            let hull = w.r.read_u32()?;
            let _region_rotate = w.read_bool()?;
            w.r.skip(4)?;
            let parent_name = w.read_string()?;

            let vertices = stream.vertices_json();
            let region_uvs: Vec<Value> = region_uvs.iter().map(|&v| jnum(v)).collect();

            if kind == 3 {
                let mut legacy_skin_name = String::new();
                if hdr_version > SKIN_INDEX_VERSION {
                    w.r.skip(2)?;
                } else {
                    let _legacy_index = w.r.read_i16()?;
                    legacy_skin_name = w.read_string()?;
                }
                let skin_index = w.r.read_i16()?;
                let deform = w.read_bool()?;

                att.insert("type".into(), Value::String("linkedmesh".into()));
                let parent = if parent_name.is_empty() { att_name.clone() } else { parent_name };
                att.insert("parent".into(), Value::String(parent));
                att.insert("deform".into(), Value::Bool(deform));
                att.insert("uvs".into(), Value::Array(region_uvs));
                att.insert("triangles".into(), Value::Array(triangles));
                att.insert("vertices".into(), vertices);
                att.insert("hull".into(), Value::from(hull));
                att.insert("edges".into(), Value::Array(edges));
                att.insert("width".into(), jnum(width));
                att.insert("height".into(), jnum(height));
                if hdr_version > SKIN_INDEX_VERSION {
                    att.insert("skinIndex".into(), Value::from(skin_index));
                } else {
                    let skin = if legacy_skin_name.is_empty() { "default".into() } else { legacy_skin_name };
                    att.insert("skin".into(), Value::String(skin));
                }
                if !mesh_path.is_empty() {
                    att.insert("path".into(), Value::String(mesh_path));
                }
            } else {
                w.r.skip(5)?;
                att.insert("type".into(), Value::String("mesh".into()));
                att.insert("uvs".into(), Value::Array(region_uvs));
                att.insert("triangles".into(), Value::Array(triangles));
                att.insert("vertices".into(), vertices);
                att.insert("hull".into(), Value::from(hull));
                att.insert("edges".into(), Value::Array(edges));
                att.insert("width".into(), jnum(width));
                att.insert("height".into(), jnum(height));
                if !mesh_path.is_empty() {
                    att.insert("path".into(), Value::String(mesh_path));
                }
            }
        }
        4 => {
            // Path
            let stream = parse_vertex_stream(w)?;
            stream.record_meta(meta, skin_name, slot_index, &att_name);

            let lengths = w.read_counted_f32()?;
            let closed = w.read_bool()?;
            let constant_speed = w.read_bool()?;

            att.insert("type".into(), Value::String("path".into()));
            att.insert("closed".into(), Value::Bool(closed));
            att.insert("constantSpeed".into(), Value::Bool(constant_speed));
            att.insert("lengths".into(), Value::Array(lengths.iter().map(|&v| jnum(v)).collect()));
            att.insert("vertexCount".into(), Value::from(stream.world_vertex_len >> 1));
            att.insert("vertices".into(), stream.vertices_json());
            if !stream.path.is_empty() {
                att.insert("path".into(), Value::String(stream.path.clone()));
            }
        }
        5 => {
            // Point
            let x = w.r.read_f32()?;
            let y = w.r.read_f32()?;
            let rotation = w.r.read_f32()?;
            w.r.skip(4)?;

            att.insert("type".into(), Value::String("point".into()));
            att.insert("x".into(), jnum(x));
            att.insert("y".into(), jnum(y));
            att.insert("rotation".into(), jnum(rotation));
        }
        6 => {
            // Clipping
            let stream = parse_vertex_stream(w)?;
            stream.record_meta(meta, skin_name, slot_index, &att_name);

            let end_slot = w.r.read_i16()?;
            let end_name = names
                .slots
                .get(&end_slot)
                .cloned()
                .unwrap_or_else(|| format!("slot{}", end_slot));

            att.insert("type".into(), Value::String("clipping".into()));
            att.insert("end".into(), Value::String(end_name));
            att.insert("vertexCount".into(), Value::from(stream.world_vertex_len >> 1));
            att.insert("vertices".into(), stream.vertices_json());
            if !stream.path.is_empty() {
                att.insert("path".into(), Value::String(stream.path.clone()));
            }
        }
        _ => {}
    }

    if att.is_empty() {
        Ok(None)
    } else {
        Ok(Some((slot_name, att_name, Value::Object(att))))
    }
}

/// Post-pass: linked meshes written by newer exporters carry a skin
/// index; replace it with the resolved skin name.
fn resolve_linked_mesh_skins(skins: &mut Value, skin_names: &[String]) {
    let Some(skins) = skins.as_array_mut() else { return };
    for skin in skins {
        let Some(attachments) = skin.get_mut("attachments").and_then(Value::as_object_mut) else {
            continue;
        };
        for (_, slot) in attachments.iter_mut() {
            let Some(slot) = slot.as_object_mut() else { continue };
            for (_, att) in slot.iter_mut() {
                let Some(att) = att.as_object_mut() else { continue };
                if att.get("type").and_then(Value::as_str) != Some("linkedmesh") {
                    continue;
                }
                let Some(index) = att.get("skinIndex").and_then(Value::as_i64) else {
                    continue;
                };
                let skin_name = usize::try_from(index)
                    .ok()
                    .and_then(|i| skin_names.get(i))
                    .cloned()
                    .unwrap_or_else(|| "default".to_string());
                att.insert("skin".into(), Value::String(skin_name));
                att.remove("skinIndex");
            }
        }
    }
}

fn parse_events(w: &mut Walker) -> Value {
    let mut events = Map::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Object(events);
    };

    for _ in 0..count {
        let parsed: Result<()> = (|| {
            let name = w.read_string()?;
            let int_data = w.r.read_u32()?;
            let float_data = w.r.read_f32()?;
            let string_data = w.read_string()?;
            let audio_data = w.read_string()?;
            let volume = w.r.read_f32()?;
            let balance = w.r.read_f32()?;

            if !name.is_empty() {
                let mut evt = Map::new();
                evt.insert("int".into(), Value::from(int_data));
                evt.insert("float".into(), jnum(float_data));
                evt.insert("string".into(), Value::String(string_data));
                evt.insert("audio".into(), Value::String(audio_data));
                evt.insert("volume".into(), jnum(volume));
                evt.insert("balance".into(), jnum(balance));
                events.insert(name, Value::Object(evt));
            }
            Ok(())
        })();
        if parsed.is_err() {
            break;
        }
    }

    Value::Object(events)
}

// ---------------------------------------------------------------------------
// animations

fn parse_animations(
    w: &mut Walker,
    names: &Names,
    meta: &AttachmentMetaMap,
    hdr_version: u32,
) -> Value {
    let mut animations = Map::new();
    let Ok(count) = w.r.read_u16() else {
        return Value::Object(animations);
    };

    for ai in 0..count {
        let Ok(name_raw) = w.read_string() else { break };
        let Ok(duration) = w.r.read_f32() else { break };
        let name = if name_raw.is_empty() { format!("anim{}", ai) } else { name_raw };

        let mut anim = Map::new();
        anim.insert("bones".into(), Value::Object(Map::new()));
        anim.insert("slots".into(), Value::Object(Map::new()));
        anim.insert("ik".into(), Value::Object(Map::new()));
        anim.insert("transform".into(), Value::Object(Map::new()));
        anim.insert("path".into(), Value::Object(Map::new()));
        anim.insert("deform".into(), Value::Object(Map::new()));
        anim.insert("events".into(), Value::Array(Vec::new()));

        let Ok(timeline_count) = w.r.read_u16() else { break };
        for _ in 0..timeline_count {
            let Ok(kind) = w.r.read_u16() else { break };
            let parsed = parse_timeline(w, names, meta, hdr_version, kind, &mut anim);
            match parsed {
                Ok(true) => {}
                // An unknown timeline kind: nothing past this point can
                // be framed, stop walking this animation.
                Ok(false) => break,
                Err(_) => break,
            }
        }

        if anim.get("events").map(|e| e.as_array().is_some_and(|a| a.is_empty())).unwrap_or(false) {
            anim.remove("events");
        }
        anim.insert("duration".into(), jnum(duration));
        animations.insert(name, Value::Object(anim));
    }

    Value::Object(animations)
}

fn ensure_object<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    map.entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("section is an object")
}

fn ensure_array<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Vec<Value> {
    map.entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .expect("frames are an array")
}

/// Parse one timeline into `anim`. Returns Ok(false) when the kind is
/// unknown and the walk must stop.
fn parse_timeline(
    w: &mut Walker,
    names: &Names,
    meta: &AttachmentMetaMap,
    hdr_version: u32,
    kind: u16,
    anim: &mut Map<String, Value>,
) -> Result<bool> {
    match kind {
        0..=3 => {
            let bone_index = w.r.read_u16()?;
            let values = w.read_counted_f32()?;
            let curves = w.read_counted_f32()?;

            let bone_key = names
                .bones
                .get(&(bone_index as i16))
                .cloned()
                .unwrap_or_else(|| bone_index.to_string());
            let timeline_name = ["rotate", "translate", "scale", "shear"][kind as usize];
            let stride = if kind == 0 { 2 } else { 3 };

            let bones = ensure_object(anim, "bones");
            let bone = ensure_object(bones, &bone_key);
            let frames = ensure_array(bone, timeline_name);

            for i in 0..values.len() / stride {
                let base = i * stride;
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(values[base]));
                if kind == 0 {
                    frame.insert("angle".into(), jnum(values[base + 1]));
                } else {
                    frame.insert("x".into(), jnum(values[base + 1]));
                    frame.insert("y".into(), jnum(values[base + 2]));
                }
                maybe_add_curve(i, &curves, &mut frame);
                frames.push(Value::Object(frame));
            }
        }
        4 => {
            // Attachment visibility
            let slot_index = w.r.read_u16()?;
            let times = w.read_counted_f32()?;
            let name_count = w.r.read_u16()? as usize;
            let mut attachment_names = Vec::with_capacity(name_count);
            for _ in 0..name_count {
                attachment_names.push(w.read_string()?);
            }

            let slot_key = names
                .slots
                .get(&(slot_index as i16))
                .cloned()
                .unwrap_or_else(|| slot_index.to_string());
            let slots = ensure_object(anim, "slots");
            let slot = ensure_object(slots, &slot_key);
            let frames = ensure_array(slot, "attachment");

            for i in 0..times.len().min(attachment_names.len()) {
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(times[i]));
                let name = &attachment_names[i];
                frame.insert(
                    "name".into(),
                    if name.is_empty() { Value::Null } else { Value::String(name.clone()) },
                );
                frames.push(Value::Object(frame));
            }
        }
        6 => parse_deform_timeline(w, names, meta, hdr_version, anim)?,
        7 => {
            // Event timeline: consumed to keep the walker in sync, but
            // not exported.
            let _times = w.read_counted_f32()?;
            let event_count = w.r.read_u16()? as usize;
            w.r.skip(4 * event_count)?;
        }
        8 => parse_draw_order_timeline(w, names, anim)?,
        5 | 9 | 10 | 11 | 12 | 13 | 14 => parse_indexed_timeline(w, names, kind, anim)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_deform_timeline(
    w: &mut Walker,
    names: &Names,
    meta: &AttachmentMetaMap,
    hdr_version: u32,
    anim: &mut Map<String, Value>,
) -> Result<()> {
    let slot_index = w.r.read_u16()?;
    let times = w.read_counted_f32()?;
    let curves = w.read_counted_f32()?;

    let frame_count = w.r.read_u16()? as usize;
    let mut frame_vertices = Vec::with_capacity(frame_count);
    for _ in 0..frame_count {
        frame_vertices.push(w.read_counted_f32()?);
    }

    let attachment_name = w.read_string()?;

    let mut skin_name = "default".to_string();
    if hdr_version > SKIN_INDEX_VERSION && w.r.remaining() >= 2 {
        let skin_index = w.r.read_u16()? as usize;
        if let Some(name) = names.skins.get(skin_index) {
            skin_name = name.clone();
        }
    }

    let (unweighted, setup) = match meta.get(&(skin_name.clone(), slot_index, attachment_name.clone())) {
        Some(m) => (!m.weighted, m.setup.as_slice()),
        None => (true, &[][..]),
    };

    let slot_key = names
        .slots
        .get(&(slot_index as i16))
        .cloned()
        .unwrap_or_else(|| slot_index.to_string());

    let deform = ensure_object(anim, "deform");
    let skin = ensure_object(deform, &skin_name);
    let slot = ensure_object(skin, &slot_key);
    let frames = ensure_array(slot, &attachment_name);

    for i in 0..times.len().min(frame_vertices.len()) {
        let mut frame = Map::new();
        frame.insert("time".into(), jnum(times[i]));

        let verts = &frame_vertices[i];
        if !verts.is_empty() {
            // Deltas against the setup pose are only meaningful for
            // unweighted attachments with a matching vertex count;
            // weighted streams are emitted raw.
            let diffs: Vec<f32> = if unweighted && setup.len() == verts.len() {
                verts.iter().zip(setup).map(|(v, s)| v - s).collect()
            } else {
                verts.clone()
            };

            let mut start = 0;
            while start < diffs.len() && diffs[start].abs() < 1e-6 {
                start += 1;
            }
            if start < diffs.len() {
                let mut end = diffs.len();
                while end > start && diffs[end - 1].abs() < 1e-6 {
                    end -= 1;
                }
                frame.insert("vertices".into(), Value::Array(diffs[start..end].iter().map(|&v| jnum(v)).collect()));
                if start > 0 {
                    frame.insert("offset".into(), Value::from(start));
                }
            }
        }
        maybe_add_curve(i, &curves, &mut frame);
        frames.push(Value::Object(frame));
    }
    Ok(())
}

fn parse_draw_order_timeline(w: &mut Walker, names: &Names, anim: &mut Map<String, Value>) -> Result<()> {
    let slot_count = names.slots.len();
    let times = w.read_counted_f32()?;
    let group_count = w.r.read_u16()? as usize;

    let mut draw_order = Vec::new();
    for i in 0..group_count {
        let entry_count = w.r.read_u16()? as usize;
        let mut frame = Map::new();
        frame.insert("time".into(), jnum(times.get(i).copied().unwrap_or(0.0)));

        let mut offsets = Vec::new();
        if entry_count == slot_count {
            // Full permutation: new_order[p] is the slot drawn at
            // position p; emit an offset for every slot that moved.
            let mut new_order = Vec::with_capacity(entry_count);
            for _ in 0..entry_count {
                new_order.push(w.r.read_u32()? as usize);
            }
            for original in 0..slot_count {
                let Some(new_pos) = new_order.iter().position(|&s| s == original) else {
                    continue;
                };
                if new_pos != original {
                    let slot = names
                        .slots
                        .get(&(original as i16))
                        .cloned()
                        .unwrap_or_else(|| original.to_string());
                    let mut off = Map::new();
                    off.insert("slot".into(), Value::String(slot));
                    off.insert("offset".into(), Value::from(new_pos as i64 - original as i64));
                    offsets.push(Value::Object(off));
                }
            }
        } else {
            // Sparse list of explicit (slot, offset) pairs.
            for _ in 0..entry_count {
                let slot_index = w.r.read_u32()?;
                let offset = w.r.read_i32()?;
                if offset != 0 {
                    let slot = names
                        .slots
                        .get(&(slot_index as i16))
                        .cloned()
                        .unwrap_or_else(|| slot_index.to_string());
                    let mut off = Map::new();
                    off.insert("slot".into(), Value::String(slot));
                    off.insert("offset".into(), Value::from(offset));
                    offsets.push(Value::Object(off));
                }
            }
        }

        if !offsets.is_empty() {
            frame.insert("offsets".into(), Value::Array(offsets));
            draw_order.push(Value::Object(frame));
        }
    }

    if !draw_order.is_empty() {
        anim.insert("drawOrder".into(), Value::Array(draw_order));
    }
    Ok(())
}

/// Timelines that share the `index, values, curves` layout: slot color
/// and two-color, IK, transform, and the path trio.
fn parse_indexed_timeline(
    w: &mut Walker,
    names: &Names,
    kind: u16,
    anim: &mut Map<String, Value>,
) -> Result<()> {
    let index = w.r.read_u16()?;
    let values = w.read_counted_f32()?;
    let curves = w.read_counted_f32()?;

    match kind {
        5 => {
            let slot_key = names
                .slots
                .get(&(index as i16))
                .cloned()
                .unwrap_or_else(|| index.to_string());
            let slots = ensure_object(anim, "slots");
            let slot = ensure_object(slots, &slot_key);
            let frames = ensure_array(slot, "color");

            for i in 0..values.len() / 5 {
                let b = i * 5;
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(values[b]));
                frame.insert(
                    "color".into(),
                    Value::String(rgba_to_hex(values[b + 1], values[b + 2], values[b + 3], values[b + 4])),
                );
                maybe_add_curve(i, &curves, &mut frame);
                frames.push(Value::Object(frame));
            }
        }
        9 => {
            let key = names
                .iks
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| format!("ik{}", index));
            let ik = ensure_object(anim, "ik");
            let frames = ensure_array(ik, &key);

            for i in 0..values.len() / 6 {
                let b = i * 6;
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(values[b]));
                frame.insert("mix".into(), jnum(values[b + 1]));
                frame.insert("softness".into(), jnum(values[b + 2]));
                frame.insert("bendPositive".into(), Value::Bool(values[b + 3] >= 0.0));
                if values[b + 4] != 0.0 {
                    frame.insert("compress".into(), Value::Bool(true));
                }
                if values[b + 5] != 0.0 {
                    frame.insert("stretch".into(), Value::Bool(true));
                }
                maybe_add_curve(i, &curves, &mut frame);
                frames.push(Value::Object(frame));
            }
        }
        10 => {
            let key = names
                .transforms
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| format!("transform{}", index));
            let transform = ensure_object(anim, "transform");
            let frames = ensure_array(transform, &key);

            for i in 0..values.len() / 5 {
                let b = i * 5;
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(values[b]));
                frame.insert("rotateMix".into(), jnum(values[b + 1]));
                frame.insert("translateMix".into(), jnum(values[b + 2]));
                frame.insert("scaleMix".into(), jnum(values[b + 3]));
                frame.insert("shearMix".into(), jnum(values[b + 4]));
                maybe_add_curve(i, &curves, &mut frame);
                frames.push(Value::Object(frame));
            }
        }
        11 | 12 | 13 => {
            let key = names
                .paths
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| format!("path{}", index));
            let path = ensure_object(anim, "path");
            let constraint = ensure_object(path, &key);

            if kind == 13 {
                let frames = ensure_array(constraint, "mix");
                for i in 0..values.len() / 3 {
                    let b = i * 3;
                    let mut frame = Map::new();
                    frame.insert("time".into(), jnum(values[b]));
                    frame.insert("rotateMix".into(), jnum(values[b + 1]));
                    frame.insert("translateMix".into(), jnum(values[b + 2]));
                    maybe_add_curve(i, &curves, &mut frame);
                    frames.push(Value::Object(frame));
                }
            } else {
                let field = if kind == 11 { "position" } else { "spacing" };
                let frames = ensure_array(constraint, field);
                for i in 0..values.len() / 2 {
                    let b = i * 2;
                    let mut frame = Map::new();
                    frame.insert("time".into(), jnum(values[b]));
                    frame.insert(field.into(), jnum(values[b + 1]));
                    maybe_add_curve(i, &curves, &mut frame);
                    frames.push(Value::Object(frame));
                }
            }
        }
        14 => {
            let slot_key = names
                .slots
                .get(&(index as i16))
                .cloned()
                .unwrap_or_else(|| index.to_string());
            let slots = ensure_object(anim, "slots");
            let slot = ensure_object(slots, &slot_key);
            let frames = ensure_array(slot, "twoColor");

            for i in 0..values.len() / 8 {
                let b = i * 8;
                let mut frame = Map::new();
                frame.insert("time".into(), jnum(values[b]));
                frame.insert(
                    "light".into(),
                    Value::String(rgba_to_hex(values[b + 1], values[b + 2], values[b + 3], values[b + 4])),
                );
                frame.insert(
                    "dark".into(),
                    Value::String(rgb_to_hex(values[b + 5], values[b + 6], values[b + 7])),
                );
                maybe_add_curve(i, &curves, &mut frame);
                frames.push(Value::Object(frame));
            }
        }
        _ => unreachable!("caller dispatches only known indexed kinds"),
    }
    Ok(())
}
