//! NIfTI-1 volume files (`.nii` / `.nii.gz`)
//!
//! Every field of the 348-byte header is mirrored into [`HeaderAttributes`]
//! under its standard field name, so a file can be rebuilt from a container
//! without interpreting the header beyond `dim` and the orientation fields.
//! Stored values are read as-is: `scl_slope`/`scl_inter` stay in the header
//! and are not applied to the samples.

use crate::compression::CompressionLevel;
use crate::error::{Result, VolchunkError};
use crate::metadata::{set_dim, shape_from_header, voxel_count, DIM_KEY};
use crate::pipeline::SourceVolume;
use crate::reader::DecodedVolume;
use crate::types::{AffineTransform, HeaderAttributes, HeaderValue};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as FlateCompression;
use ndarray::{Array3, ShapeBuilder};
use num_traits::NumCast;
use std::io::{Read, Write};

/// Reads and writes one dense-volume file format
pub trait VolumeFileCodec: Send + Sync {
    /// Parse a complete file
    fn read(&self, bytes: &[u8]) -> Result<SourceVolume>;

    /// Serialize a decoded volume to a complete file
    fn write(&self, volume: &DecodedVolume) -> Result<Vec<u8>>;

    /// File extension, including the leading dot
    fn extension(&self) -> &'static str;
}

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_INT16: i16 = 4;
const NIFTI_XFORM_ALIGNED_ANAT: i16 = 2;

#[derive(Debug, Clone, Copy)]
enum Field {
    I32,
    I16,
    U8,
    F32,
    Text(usize),
    I16s(usize),
    F32s(usize),
}

/// Header layout in file order: name, byte offset, encoding
const FIELDS: &[(&str, usize, Field)] = &[
    ("sizeof_hdr", 0, Field::I32),
    ("data_type", 4, Field::Text(10)),
    ("db_name", 14, Field::Text(18)),
    ("extents", 32, Field::I32),
    ("session_error", 36, Field::I16),
    ("regular", 38, Field::Text(1)),
    ("dim_info", 39, Field::U8),
    ("dim", 40, Field::I16s(8)),
    ("intent_p1", 56, Field::F32),
    ("intent_p2", 60, Field::F32),
    ("intent_p3", 64, Field::F32),
    ("intent_code", 68, Field::I16),
    ("datatype", 70, Field::I16),
    ("bitpix", 72, Field::I16),
    ("slice_start", 74, Field::I16),
    ("pixdim", 76, Field::F32s(8)),
    ("vox_offset", 108, Field::F32),
    ("scl_slope", 112, Field::F32),
    ("scl_inter", 116, Field::F32),
    ("slice_end", 120, Field::I16),
    ("slice_code", 122, Field::U8),
    ("xyzt_units", 123, Field::U8),
    ("cal_max", 124, Field::F32),
    ("cal_min", 128, Field::F32),
    ("slice_duration", 132, Field::F32),
    ("toffset", 136, Field::F32),
    ("glmax", 140, Field::I32),
    ("glmin", 144, Field::I32),
    ("descrip", 148, Field::Text(80)),
    ("aux_file", 228, Field::Text(24)),
    ("qform_code", 252, Field::I16),
    ("sform_code", 254, Field::I16),
    ("quatern_b", 256, Field::F32),
    ("quatern_c", 260, Field::F32),
    ("quatern_d", 264, Field::F32),
    ("qoffset_x", 268, Field::F32),
    ("qoffset_y", 272, Field::F32),
    ("qoffset_z", 276, Field::F32),
    ("srow_x", 280, Field::F32s(4)),
    ("srow_y", 296, Field::F32s(4)),
    ("srow_z", 312, Field::F32s(4)),
    ("intent_name", 328, Field::Text(16)),
    ("magic", 344, Field::Text(4)),
];

/// Storage types the reader accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NiftiType {
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl NiftiType {
    fn from_code(code: i64) -> Result<Self> {
        match code {
            2 => Ok(NiftiType::U8),
            4 => Ok(NiftiType::I16),
            8 => Ok(NiftiType::I32),
            16 => Ok(NiftiType::F32),
            64 => Ok(NiftiType::F64),
            256 => Ok(NiftiType::I8),
            512 => Ok(NiftiType::U16),
            768 => Ok(NiftiType::U32),
            1024 => Ok(NiftiType::I64),
            1280 => Ok(NiftiType::U64),
            other => Err(VolchunkError::InvalidFormat(format!(
                "unsupported NIfTI datatype {}",
                other
            ))),
        }
    }

    fn byte_size(self) -> usize {
        match self {
            NiftiType::U8 | NiftiType::I8 => 1,
            NiftiType::I16 | NiftiType::U16 => 2,
            NiftiType::I32 | NiftiType::U32 | NiftiType::F32 => 4,
            NiftiType::I64 | NiftiType::U64 | NiftiType::F64 => 8,
        }
    }

    fn decode<E: ByteOrder>(self, c: &[u8]) -> f64 {
        match self {
            NiftiType::U8 => c[0] as f64,
            NiftiType::I8 => c[0] as i8 as f64,
            NiftiType::I16 => E::read_i16(c) as f64,
            NiftiType::U16 => E::read_u16(c) as f64,
            NiftiType::I32 => E::read_i32(c) as f64,
            NiftiType::U32 => E::read_u32(c) as f64,
            NiftiType::I64 => E::read_i64(c) as f64,
            NiftiType::U64 => E::read_u64(c) as f64,
            NiftiType::F32 => E::read_f32(c) as f64,
            NiftiType::F64 => E::read_f64(c),
        }
    }
}

/// Single-file NIfTI-1 codec
#[derive(Debug, Clone, Copy)]
pub struct Nifti1Codec {
    gzip: bool,
    level: CompressionLevel,
}

impl Nifti1Codec {
    /// Gzip-compressed `.nii.gz` files
    pub fn gzipped() -> Self {
        Self {
            gzip: true,
            level: CompressionLevel::default(),
        }
    }

    /// Uncompressed `.nii` files
    pub fn plain() -> Self {
        Self {
            gzip: false,
            level: CompressionLevel::default(),
        }
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }
}

impl Default for Nifti1Codec {
    fn default() -> Self {
        Self::gzipped()
    }
}

impl VolumeFileCodec for Nifti1Codec {
    fn read(&self, bytes: &[u8]) -> Result<SourceVolume> {
        let inflated;
        let bytes = if is_gzip(bytes) {
            let mut out = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| VolchunkError::InvalidFormat(format!("bad gzip stream: {}", e)))?;
            inflated = out;
            &inflated[..]
        } else {
            bytes
        };

        if bytes.len() < HEADER_SIZE {
            return Err(VolchunkError::InvalidFormat(format!(
                "file too small for a NIfTI-1 header ({} bytes)",
                bytes.len()
            )));
        }

        if LittleEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
            read_volume::<LittleEndian>(bytes)
        } else if BigEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
            read_volume::<BigEndian>(bytes)
        } else {
            Err(VolchunkError::InvalidFormat(
                "sizeof_hdr is not 348; not a NIfTI-1 file".to_string(),
            ))
        }
    }

    fn write(&self, volume: &DecodedVolume) -> Result<Vec<u8>> {
        let shape = volume.grid.shape();
        let mut header = volume.header.clone();
        if shape_from_header(&header).ok() != Some(shape) {
            set_dim(&mut header, shape);
        }

        let mut out = encode_header(&header, &volume.affine)?;
        out.reserve(volume.grid.len() * 2);
        // NIfTI stores x fastest: iterate the transposed view.
        for sample in volume.grid.view().t().iter() {
            out.extend_from_slice(&sample.to_le_bytes());
        }

        if !self.gzip {
            return Ok(out);
        }
        let mut encoder = GzEncoder::new(
            Vec::new(),
            FlateCompression::new(self.level.value() as u32),
        );
        encoder.write_all(&out)?;
        Ok(encoder.finish()?)
    }

    fn extension(&self) -> &'static str {
        if self.gzip {
            ".nii.gz"
        } else {
            ".nii"
        }
    }
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn read_volume<E: ByteOrder>(bytes: &[u8]) -> Result<SourceVolume> {
    let header = parse_header::<E>(bytes);

    let magic = header.get("magic").and_then(HeaderValue::as_text).unwrap_or("");
    if magic != "n+1" {
        return Err(VolchunkError::InvalidFormat(format!(
            "unsupported NIfTI magic {:?}; only single-file n+1 is handled",
            magic
        )));
    }

    let shape = shape_from_header(&header)?;
    let code = header.get("datatype").and_then(HeaderValue::as_int).unwrap_or(0);
    let dtype = NiftiType::from_code(code)?;
    let offset = match header.get("vox_offset").and_then(HeaderValue::as_float) {
        Some(v) if v.is_finite() && v >= 0.0 && v <= bytes.len() as f64 => {
            (v as usize).max(HEADER_SIZE)
        }
        Some(v) => {
            return Err(VolchunkError::InvalidFormat(format!(
                "vox_offset {} lies outside the {}-byte file",
                v,
                bytes.len()
            )))
        }
        None => VOX_OFFSET,
    };

    let needed = voxel_count(shape)?
        .checked_mul(dtype.byte_size())
        .ok_or_else(|| VolchunkError::InvalidFormat(format!("{:?} data size overflows", shape)))?;
    let end = offset.checked_add(needed).ok_or_else(|| {
        VolchunkError::InvalidFormat(format!("data end past offset {} overflows", offset))
    })?;
    let data = bytes.get(offset..end).ok_or_else(|| {
        VolchunkError::InvalidFormat(format!(
            "expected {} data bytes at offset {}, file has {}",
            needed,
            offset,
            bytes.len()
        ))
    })?;

    let fortran: Vec<f64> = data
        .chunks_exact(dtype.byte_size())
        .map(|c| dtype.decode::<E>(c))
        .collect();
    let array = Array3::from_shape_vec((shape[0], shape[1], shape[2]).f(), fortran)?;
    let samples: Vec<f64> = array.iter().copied().collect();

    Ok(SourceVolume {
        shape,
        samples,
        affine: affine_from_header(&header),
        header,
    })
}

fn parse_header<E: ByteOrder>(bytes: &[u8]) -> HeaderAttributes {
    let mut header = HeaderAttributes::new();
    for &(name, off, field) in FIELDS {
        let value = match field {
            Field::I32 => HeaderValue::Int(E::read_i32(&bytes[off..]) as i64),
            Field::I16 => HeaderValue::Int(E::read_i16(&bytes[off..]) as i64),
            Field::U8 => HeaderValue::Int(bytes[off] as i64),
            Field::F32 => HeaderValue::Float(E::read_f32(&bytes[off..]) as f64),
            Field::Text(len) => {
                let raw = &bytes[off..off + len];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
                HeaderValue::Text(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
            Field::I16s(n) => HeaderValue::IntVector(
                (0..n).map(|i| E::read_i16(&bytes[off + 2 * i..]) as i64).collect(),
            ),
            Field::F32s(n) => HeaderValue::FloatVector(
                (0..n).map(|i| E::read_f32(&bytes[off + 4 * i..]) as f64).collect(),
            ),
        };
        header.insert(name, value);
    }
    header
}

fn narrow<T: NumCast>(name: &str, value: f64) -> Result<T> {
    <T as NumCast>::from(value).ok_or_else(|| {
        VolchunkError::InvalidFormat(format!("header field {} out of range: {}", name, value))
    })
}

/// Little-endian header plus the 4 empty extension bytes
fn encode_header(header: &HeaderAttributes, affine: &AffineTransform) -> Result<Vec<u8>> {
    let mut header = header.clone();
    header.insert("sizeof_hdr", HeaderValue::Int(HEADER_SIZE as i64));
    header.insert("datatype", HeaderValue::Int(DT_INT16 as i64));
    header.insert("bitpix", HeaderValue::Int(16));
    header.insert("vox_offset", HeaderValue::Float(VOX_OFFSET as f64));
    header.insert("magic", HeaderValue::Text("n+1".to_string()));
    for (n, key) in ["srow_x", "srow_y", "srow_z"].iter().enumerate() {
        header.insert(*key, HeaderValue::FloatVector(affine.row(n).to_vec()));
    }
    let sform = header.get("sform_code").and_then(HeaderValue::as_int).unwrap_or(0);
    if sform <= 0 {
        header.insert("sform_code", HeaderValue::Int(NIFTI_XFORM_ALIGNED_ANAT as i64));
    }
    if !header.contains_key("scl_slope") {
        header.insert("scl_slope", HeaderValue::Float(1.0));
    }

    let mut out = vec![0u8; VOX_OFFSET];
    for &(name, off, field) in FIELDS {
        let Some(value) = header.get(name) else {
            continue;
        };
        let mismatch =
            || VolchunkError::InvalidFormat(format!("header field {} has value {}", name, value));
        match field {
            Field::I32 => {
                let v = value.as_float().ok_or_else(mismatch)?;
                LittleEndian::write_i32(&mut out[off..], narrow(name, v)?);
            }
            Field::I16 => {
                let v = value.as_float().ok_or_else(mismatch)?;
                LittleEndian::write_i16(&mut out[off..], narrow(name, v)?);
            }
            Field::U8 => {
                let v = value.as_float().ok_or_else(mismatch)?;
                out[off] = narrow(name, v)?;
            }
            Field::F32 => {
                let v = value.as_float().ok_or_else(mismatch)?;
                LittleEndian::write_f32(&mut out[off..], v as f32);
            }
            Field::Text(len) => {
                let text = value.as_text().ok_or_else(mismatch)?.as_bytes();
                let n = text.len().min(len);
                out[off..off + n].copy_from_slice(&text[..n]);
            }
            Field::I16s(n) => {
                let values = value.as_float_vector().ok_or_else(mismatch)?;
                for (i, &v) in values.iter().take(n).enumerate() {
                    LittleEndian::write_i16(&mut out[off + 2 * i..], narrow(name, v)?);
                }
            }
            Field::F32s(n) => {
                let values = value.as_float_vector().ok_or_else(mismatch)?;
                for (i, &v) in values.iter().take(n).enumerate() {
                    LittleEndian::write_f32(&mut out[off + 4 * i..], v as f32);
                }
            }
        }
    }
    Ok(out)
}

fn float_field(header: &HeaderAttributes, key: &str) -> f64 {
    header.get(key).and_then(HeaderValue::as_float).unwrap_or(0.0)
}

fn vector_field(header: &HeaderAttributes, key: &str, len: usize) -> Vec<f64> {
    let mut values = header
        .get(key)
        .and_then(HeaderValue::as_float_vector)
        .unwrap_or_default();
    values.resize(len, 0.0);
    values
}

/// Voxel-to-world affine: sform, then qform, then the Analyze base affine
pub fn affine_from_header(header: &HeaderAttributes) -> AffineTransform {
    let code = |key: &str| header.get(key).and_then(HeaderValue::as_int).unwrap_or(0);
    let pixdim = vector_field(header, "pixdim", 8);

    if code("sform_code") > 0 {
        let mut rows = [[0.0, 0.0, 0.0, 1.0]; 4];
        for (n, key) in ["srow_x", "srow_y", "srow_z"].iter().enumerate() {
            let row = vector_field(header, key, 4);
            rows[n].copy_from_slice(&row);
        }
        return AffineTransform::new(rows);
    }

    if code("qform_code") > 0 {
        let b = float_field(header, "quatern_b");
        let c = float_field(header, "quatern_c");
        let d = float_field(header, "quatern_d");
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let zooms = [pixdim[1], pixdim[2], pixdim[3] * qfac];
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let offsets = [
            float_field(header, "qoffset_x"),
            float_field(header, "qoffset_y"),
            float_field(header, "qoffset_z"),
        ];
        let mut rows = [[0.0, 0.0, 0.0, 1.0]; 4];
        for i in 0..3 {
            for j in 0..3 {
                rows[i][j] = r[i][j] * zooms[j];
            }
            rows[i][3] = offsets[i];
        }
        return AffineTransform::new(rows);
    }

    // Analyze convention: x flipped, origin at the volume centre.
    let dims = header
        .get(DIM_KEY)
        .and_then(HeaderValue::as_int_vector)
        .unwrap_or_default();
    let extent = |axis: usize| dims.get(axis + 1).copied().unwrap_or(1).max(1) as f64;
    let zooms = [-pixdim[1], pixdim[2], pixdim[3]];
    let mut rows = [[0.0, 0.0, 0.0, 1.0]; 4];
    for axis in 0..3 {
        rows[axis][axis] = zooms[axis];
        rows[axis][3] = -(extent(axis) - 1.0) / 2.0 * zooms[axis];
    }
    AffineTransform::new(rows)
}
