//! GeoPackage binary geometry: an 8 byte header, an optional envelope and a
//! WKB payload.
//!
//! ```text
//! magic "GP" | version | flags | srs_id (i32) | envelope (0, 4, 6 or 8 f64) | WKB
//! ```
//!
//! Flags: bit 0 is the header byte order (1 = little endian), bits 1-3 the
//! envelope kind, bit 4 marks an empty geometry and bit 5 an extended
//! geometry, which this crate does not read.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{Endianness, Envelope, Geometry, envelope, wkb};
use crate::error::{GpkgError, Result};

pub const MAGIC: [u8; 2] = *b"GP";
/// Leading bytes some writers put in front of bare WKB instead of a header.
pub const LEGACY_MAGIC: [u8; 2] = *b"GB";
pub const VERSION: u8 = 0;
pub const HEADER_LEN: usize = 8;

const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_ENVELOPE_MASK: u8 = 0b0000_1110;
const FLAG_EMPTY: u8 = 0b0001_0000;
const FLAG_EXTENDED: u8 = 0b0010_0000;

/// How geometries are encoded when they are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryOptions {
    /// Byte order of the header fields and the WKB payload.
    pub endianness: Endianness,
    /// Store the bounding envelope in the header of non-point geometries.
    pub write_envelope: bool,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self {
            endianness: Endianness::LittleEndian,
            write_envelope: true,
        }
    }
}

/// Envelope indicator stored in bits 1-3 of the flags byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeKind {
    None = 0,
    Xy = 1,
    Xyz = 2,
    Xym = 3,
    Xyzm = 4,
}

impl EnvelopeKind {
    fn from_flags(flags: u8) -> Result<Self> {
        match (flags & FLAG_ENVELOPE_MASK) >> 1 {
            0 => Ok(Self::None),
            1 => Ok(Self::Xy),
            2 => Ok(Self::Xyz),
            3 => Ok(Self::Xym),
            4 => Ok(Self::Xyzm),
            _ => Err(GpkgError::InvalidGpkgGeometryFlags(flags)),
        }
    }

    fn of(envelope: Option<&Envelope>) -> Self {
        match envelope {
            None => Self::None,
            Some(env) => match (env.z.is_some(), env.m.is_some()) {
                (false, false) => Self::Xy,
                (true, false) => Self::Xyz,
                (false, true) => Self::Xym,
                (true, true) => Self::Xyzm,
            },
        }
    }

    /// Length of the envelope in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::Xy => 32,
            Self::Xyz | Self::Xym => 48,
            Self::Xyzm => 64,
        }
    }
}

/// Decoded GeoPackage binary header.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryHeader {
    pub version: u8,
    pub empty: bool,
    pub endianness: Endianness,
    pub srs_id: i32,
    pub envelope: Option<Envelope>,
}

impl GeometryHeader {
    /// Serialize a header. The WKB payload is appended by the caller.
    pub fn build(
        srs_id: i32,
        is_empty: bool,
        endianness: Endianness,
        envelope: Option<&Envelope>,
    ) -> Vec<u8> {
        match endianness {
            Endianness::LittleEndian => {
                build_header::<LittleEndian>(srs_id, is_empty, envelope, FLAG_LITTLE_ENDIAN)
            }
            Endianness::BigEndian => build_header::<BigEndian>(srs_id, is_empty, envelope, 0),
        }
    }

    /// Parse a header and return it along with the offset of the WKB payload.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() >= 2 && bytes[0..2] != MAGIC {
            return Err(GpkgError::InvalidMagic {
                found: [bytes[0], bytes[1]],
            });
        }
        if bytes.len() < HEADER_LEN {
            return Err(GpkgError::InvalidGpkgGeometryLength {
                len: bytes.len(),
                minimum: HEADER_LEN,
            });
        }

        let version = bytes[2];
        if version != VERSION {
            return Err(GpkgError::UnsupportedVersion(version));
        }

        let flags = bytes[3];
        if flags & FLAG_EXTENDED != 0 {
            return Err(GpkgError::InvalidGpkgGeometryFlags(flags));
        }
        let kind = EnvelopeKind::from_flags(flags)?;

        let required = HEADER_LEN + kind.size();
        if bytes.len() < required {
            return Err(GpkgError::InvalidGpkgGeometryEnvelope {
                len: bytes.len(),
                required,
            });
        }

        let header = if flags & FLAG_LITTLE_ENDIAN != 0 {
            parse_fields::<LittleEndian>(bytes, flags, kind, Endianness::LittleEndian)
        } else {
            parse_fields::<BigEndian>(bytes, flags, kind, Endianness::BigEndian)
        };
        Ok((header, required))
    }
}

fn build_header<B: ByteOrder>(
    srs_id: i32,
    is_empty: bool,
    envelope: Option<&Envelope>,
    order_flag: u8,
) -> Vec<u8> {
    let kind = EnvelopeKind::of(envelope);

    let mut flags = ((kind as u8) << 1) | order_flag;
    if is_empty {
        flags |= FLAG_EMPTY;
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + kind.size());
    buf.extend_from_slice(&MAGIC);
    buf.push(VERSION);
    buf.push(flags);

    let mut srs = [0u8; 4];
    B::write_i32(&mut srs, srs_id);
    buf.extend_from_slice(&srs);

    if let Some(env) = envelope {
        let mut values = vec![env.min_x, env.max_x, env.min_y, env.max_y];
        if let Some((min, max)) = env.z {
            values.extend([min, max]);
        }
        if let Some((min, max)) = env.m {
            values.extend([min, max]);
        }
        for value in values {
            let mut bytes = [0u8; 8];
            B::write_f64(&mut bytes, value);
            buf.extend_from_slice(&bytes);
        }
    }
    buf
}

fn parse_fields<B: ByteOrder>(
    bytes: &[u8],
    flags: u8,
    kind: EnvelopeKind,
    endianness: Endianness,
) -> GeometryHeader {
    let srs_id = B::read_i32(&bytes[4..8]);

    let value = |i: usize| B::read_f64(&bytes[HEADER_LEN + i * 8..HEADER_LEN + (i + 1) * 8]);
    let envelope = match kind {
        EnvelopeKind::None => None,
        _ => {
            let mut env = Envelope {
                min_x: value(0),
                max_x: value(1),
                min_y: value(2),
                max_y: value(3),
                z: None,
                m: None,
            };
            match kind {
                EnvelopeKind::Xyz => env.z = Some((value(4), value(5))),
                EnvelopeKind::Xym => env.m = Some((value(4), value(5))),
                EnvelopeKind::Xyzm => {
                    env.z = Some((value(4), value(5)));
                    env.m = Some((value(6), value(7)));
                }
                EnvelopeKind::None | EnvelopeKind::Xy => {}
            }
            Some(env)
        }
    };

    GeometryHeader {
        version: bytes[2],
        empty: flags & FLAG_EMPTY != 0,
        endianness,
        srs_id,
        envelope,
    }
}

/// Return the WKB payload of a stored geometry.
///
/// `GP` blobs lose their header. Blobs starting with `GB` are returned
/// unchanged; decoding them as WKB is left to the caller.
pub fn strip_header(bytes: &[u8]) -> Result<&[u8]> {
    match bytes {
        [b'G', b'B', ..] => Ok(bytes),
        [b'G', b'P', ..] => {
            let (_, offset) = GeometryHeader::parse(bytes)?;
            Ok(&bytes[offset..])
        }
        [a, b, ..] => Err(GpkgError::InvalidMagic { found: [*a, *b] }),
        _ => Err(GpkgError::InvalidGpkgGeometryLength {
            len: bytes.len(),
            minimum: HEADER_LEN,
        }),
    }
}

/// Canonical encoding of an empty geometry: a header with the empty flag and
/// no envelope, followed by `POINT(NaN NaN)`.
pub fn empty_geometry(srs_id: i32, endianness: Endianness) -> Vec<u8> {
    let mut buf = GeometryHeader::build(srs_id, true, endianness, None);
    let nan = match endianness {
        Endianness::LittleEndian => {
            buf.extend_from_slice(&[1, 1, 0, 0, 0]);
            f64::NAN.to_le_bytes()
        }
        Endianness::BigEndian => {
            buf.extend_from_slice(&[0, 0, 0, 0, 1]);
            f64::NAN.to_be_bytes()
        }
    };
    buf.extend_from_slice(&nan);
    buf.extend_from_slice(&nan);
    buf
}

/// Encode a geometry as a complete GeoPackage binary blob.
pub fn encode(geometry: &Geometry, srs_id: i32, options: &GeometryOptions) -> Result<Vec<u8>> {
    if matches!(geometry, Geometry::Empty) {
        return Ok(empty_geometry(srs_id, options.endianness));
    }

    let payload = wkb::encode(geometry, options.endianness)?;
    Ok(wrap_wkb(geometry, &payload, srs_id, options))
}

/// Prefix already encoded WKB with a header describing `geometry`.
pub(crate) fn wrap_wkb(
    geometry: &Geometry,
    payload: &[u8],
    srs_id: i32,
    options: &GeometryOptions,
) -> Vec<u8> {
    let is_point = matches!(geometry, Geometry::Point(_));
    let env = if options.write_envelope && !is_point {
        envelope(geometry)
    } else {
        None
    };

    let mut buf = GeometryHeader::build(
        srs_id,
        geometry.is_empty(),
        options.endianness,
        env.as_ref(),
    );
    buf.extend_from_slice(payload);
    buf
}

/// Decode a GeoPackage binary blob. The empty flag yields `Geometry::Empty`.
pub fn decode(bytes: &[u8]) -> Result<(GeometryHeader, Geometry)> {
    let (header, offset) = GeometryHeader::parse(bytes)?;
    let geometry = wkb::decode(&bytes[offset..])?;
    if header.empty {
        return Ok((header, Geometry::Empty));
    }
    Ok((header, geometry))
}

/// Envelope of a stored geometry, read from the header when it carries one.
pub fn envelope_of(bytes: &[u8]) -> Result<Option<Envelope>> {
    let (header, offset) = GeometryHeader::parse(bytes)?;
    if header.empty {
        return Ok(None);
    }
    if header.envelope.is_some() {
        return Ok(header.envelope);
    }
    Ok(envelope(&wkb::decode(&bytes[offset..])?))
}
