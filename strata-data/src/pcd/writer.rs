//! Point file writer.
//!
//! Writes `x y z` as 32-bit floats plus an optional packed color field in any
//! of the three data encodings. Used by the conversion tool and to build test
//! fixtures.

use crate::lzf;
use crate::pcd::header::{DataEncoding, Field, Header, ScalarType};
use glam::Vec3;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct PcdWriter {
    encoding: DataEncoding,
}

impl PcdWriter {
    pub fn new(encoding: DataEncoding) -> Self {
        Self { encoding }
    }

    /// Header describing `points` records. Colors with any non-opaque alpha
    /// are written as `rgba`, otherwise as `rgb`.
    pub fn header(&self, points: usize, colors: Option<&[u32]>) -> Header {
        let mut fields = vec![
            Field::new("x", ScalarType::F32, 1),
            Field::new("y", ScalarType::F32, 1),
            Field::new("z", ScalarType::F32, 1),
        ];
        if let Some(colors) = colors {
            let name = if needs_alpha(colors) { "rgba" } else { "rgb" };
            fields.push(Field::new(name, ScalarType::U32, 1));
        }
        Header {
            version: Some("0.7".to_string()),
            fields,
            width: points,
            height: 1,
            points,
            viewpoint: None,
            encoding: self.encoding,
            data_offset: 0,
        }
    }

    pub fn write<W: Write>(
        &self,
        out: &mut W,
        positions: &[Vec3],
        colors: Option<&[u32]>,
    ) -> io::Result<()> {
        if let Some(colors) = colors {
            if colors.len() != positions.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} colors for {} points", colors.len(), positions.len()),
                ));
            }
        }
        let header = self.header(positions.len(), colors);
        let colors = colors.map(|c| {
            let mask = if needs_alpha(c) { u32::MAX } else { 0x00FF_FFFF };
            c.iter().map(|v| v & mask).collect::<Vec<_>>()
        });

        out.write_all(header.to_text().as_bytes())?;
        match self.encoding {
            DataEncoding::Ascii => {
                for (i, p) in positions.iter().enumerate() {
                    match &colors {
                        Some(c) => writeln!(out, "{} {} {} {}", p.x, p.y, p.z, c[i])?,
                        None => writeln!(out, "{} {} {}", p.x, p.y, p.z)?,
                    }
                }
            }
            DataEncoding::Binary => {
                let stride = if colors.is_some() { 16 } else { 12 };
                let mut data = Vec::with_capacity(positions.len() * stride);
                for (i, p) in positions.iter().enumerate() {
                    for v in p.to_array() {
                        data.extend_from_slice(&v.to_le_bytes());
                    }
                    if let Some(c) = &colors {
                        data.extend_from_slice(&c[i].to_le_bytes());
                    }
                }
                out.write_all(&data)?;
            }
            DataEncoding::BinaryCompressed => {
                let mut soa = Vec::with_capacity(positions.len() * 16);
                for axis in 0..3 {
                    for p in positions {
                        soa.extend_from_slice(&p[axis].to_le_bytes());
                    }
                }
                if let Some(c) = &colors {
                    for v in c {
                        soa.extend_from_slice(&v.to_le_bytes());
                    }
                }
                let blob = lzf::compress(&soa);
                out.write_all(&(blob.len() as u32).to_le_bytes())?;
                out.write_all(&(soa.len() as u32).to_le_bytes())?;
                out.write_all(&blob)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        positions: &[Vec3],
        colors: Option<&[u32]>,
    ) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        self.write(&mut out, positions, colors)?;
        out.flush()?;
        info!(
            "Wrote {} {} points to {}",
            positions.len(),
            self.encoding,
            path.as_ref().display()
        );
        Ok(())
    }
}

fn needs_alpha(colors: &[u32]) -> bool {
    colors.iter().any(|c| c >> 24 != 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_round_trips_through_parser() {
        let positions = vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.5, 0.25, 8.0)];
        let mut bytes = Vec::new();
        PcdWriter::new(DataEncoding::Binary)
            .write(&mut bytes, &positions, Some(&[0xFF11_2233, 0xFF00_0000][..]))
            .unwrap();
        let mut reader = Cursor::new(bytes.as_slice());
        let header = Header::parse(&mut reader).unwrap();
        assert_eq!(header.points, 2);
        assert_eq!(header.record_size(), 16);
        assert_eq!(header.field_index("rgb"), Some(3));
        assert_eq!(bytes.len() as u64, header.data_offset + 32);
        // Opaque colors drop the alpha byte on disk.
        let at = header.data_offset as usize + 12;
        assert_eq!(bytes[at..at + 4], 0x0011_2233u32.to_le_bytes());
    }

    #[test]
    fn test_opaque_colors_reload_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let positions = vec![Vec3::ZERO, Vec3::ONE, Vec3::splat(2.0)];
        let colors = [0xFF00_0000, 0xFF12_3456, 0xFFFF_FFFF];
        for encoding in [
            DataEncoding::Ascii,
            DataEncoding::Binary,
            DataEncoding::BinaryCompressed,
        ] {
            let path = dir.path().join(format!("{encoding}.pcd"));
            PcdWriter::new(encoding)
                .write_file(&path, &positions, Some(&colors[..]))
                .unwrap();
            let loader = crate::pcd::PointLoader::open(&path, &Default::default()).unwrap();
            assert_eq!(loader.header().field_index("rgb"), Some(3));
            assert!(loader.header().field_index("rgba").is_none());
            let batch = loader.load_points(&[2, 0, 1]).unwrap();
            assert_eq!(batch.colors, Some(vec![colors[2], colors[0], colors[1]]));
        }
    }

    #[test]
    fn test_translucent_colors_use_rgba() {
        let writer = PcdWriter::new(DataEncoding::Ascii);
        let header = writer.header(1, Some(&[0x8000_0000][..]));
        assert_eq!(header.field_index("rgba"), Some(3));
        assert!(writer.header(1, None).color_field().is_none());
    }

    #[test]
    fn test_compressed_size_words() {
        let positions: Vec<Vec3> = (0..64).map(|i| Vec3::splat(i as f32)).collect();
        let mut bytes = Vec::new();
        PcdWriter::new(DataEncoding::BinaryCompressed)
            .write(&mut bytes, &positions, None)
            .unwrap();
        let mut reader = Cursor::new(bytes.as_slice());
        let header = Header::parse(&mut reader).unwrap();
        let at = header.data_offset as usize;
        let compressed = u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
        let raw = u32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap());
        assert_eq!(raw, 64 * 12);
        assert_eq!(bytes.len(), at + 8 + compressed);
    }

    #[test]
    fn test_color_length_mismatch() {
        let err = PcdWriter::new(DataEncoding::Ascii)
            .write(&mut Vec::new(), &[Vec3::ZERO], Some(&[][..]))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
