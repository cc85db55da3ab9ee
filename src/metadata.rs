//! Embedded image metadata extraction.
//!
//! Extraction runs an ordered list of [`ExifStrategy`] implementations and
//! keeps the first non-empty result. A strategy that cannot handle a file
//! reports `None`; nothing here ever fails the caller.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Result;
use exif::{Context, Exif, Field, In, Tag, Value};
use image::{ImageDecoder, ImageReader};

use crate::models::MetadataMap;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const STRIPPED_NAMESPACES: [&str; 2] = ["EXIF ", "Image "];

pub trait ExifStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when this strategy cannot read metadata from `path`.
    fn try_extract(&self, path: &Path) -> Option<MetadataMap>;
}

pub struct MetadataExtractor {
    strategies: Vec<Box<dyn ExifStrategy>>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::with_strategies(vec![Box::new(DecoderExif), Box::new(ContainerExif)])
    }
}

impl MetadataExtractor {
    pub fn with_strategies(strategies: Vec<Box<dyn ExifStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, path: &Path) -> MetadataMap {
        for strategy in &self.strategies {
            match strategy.try_extract(path) {
                Some(metadata) if !metadata.is_empty() => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        tags = metadata.len(),
                        path = %path.display(),
                        "extracted image metadata"
                    );
                    return metadata;
                }
                _ => {}
            }
        }
        MetadataMap::new()
    }
}

/// Runs the default strategies against `path`.
pub fn extract(path: &Path) -> MetadataMap {
    MetadataExtractor::default().extract(path)
}

/// Reads the EXIF block the image decoder exposes for the file's format and
/// reports raw tag values, e.g. `Orientation` as `1`.
pub struct DecoderExif;

impl DecoderExif {
    fn read(path: &Path) -> Result<Option<MetadataMap>> {
        let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
        let Some(raw) = decoder.exif_metadata()? else {
            return Ok(None);
        };
        let exif = exif::Reader::new().read_raw(strip_exif_header(raw))?;
        let metadata = exif
            .fields()
            .filter(|field| field.ifd_num == In::PRIMARY)
            .map(|field| (tag_key(field.tag), raw_value(&field.value)))
            .collect();
        Ok(Some(metadata))
    }
}

impl ExifStrategy for DecoderExif {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn try_extract(&self, path: &Path) -> Option<MetadataMap> {
        Self::read(path).unwrap_or_else(|err| {
            tracing::debug!(path = %path.display(), error = %err, "decoder exif unavailable");
            None
        })
    }
}

/// Scans the file container for an EXIF block directly, skipping thumbnail
/// and maker-note detail, and reports human-readable values.
pub struct ContainerExif;

impl ContainerExif {
    fn read(path: &Path) -> Result<MetadataMap> {
        let mut reader = BufReader::new(File::open(path)?);
        let exif = exif::Reader::new().read_from_container(&mut reader)?;
        Ok(exif
            .fields()
            .filter(|field| field.ifd_num != In::THUMBNAIL && field.tag != Tag::MakerNote)
            .map(|field| {
                let key = strip_namespace(&qualified_name(field)).to_string();
                (key, display_value(field, &exif))
            })
            .collect())
    }
}

impl ExifStrategy for ContainerExif {
    fn name(&self) -> &'static str {
        "container"
    }

    fn try_extract(&self, path: &Path) -> Option<MetadataMap> {
        match Self::read(path) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "container exif unavailable");
                None
            }
        }
    }
}

fn strip_exif_header(mut raw: Vec<u8>) -> Vec<u8> {
    if raw.starts_with(EXIF_HEADER) {
        raw.drain(..EXIF_HEADER.len());
    }
    raw
}

/// Known tags by name, unknown ones by their numeric id.
fn tag_key(tag: Tag) -> String {
    if tag.description().is_some() {
        tag.to_string()
    } else {
        tag.number().to_string()
    }
}

fn qualified_name(field: &Field) -> String {
    let family = match field.tag.context() {
        Context::Tiff => "Image",
        Context::Exif => "EXIF",
        Context::Gps => "GPS",
        Context::Interop => "Interoperability",
        #[allow(unreachable_patterns)]
        _ => "Image",
    };
    if field.tag.description().is_some() {
        format!("{family} {}", field.tag)
    } else {
        format!("{family} Tag {:#06X}", field.tag.number())
    }
}

fn strip_namespace(key: &str) -> &str {
    STRIPPED_NAMESPACES
        .iter()
        .fold(key, |key, prefix| key.strip_prefix(prefix).unwrap_or(key))
}

fn display_value(field: &Field, exif: &Exif) -> String {
    field
        .display_value()
        .with_unit(exif)
        .to_string()
        .trim_matches('"')
        .to_string()
}

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rationals and floats print with a fractional part (`72/1` as `72.0`), the
/// way Pillow renders `IFDRational`.
fn float_text(value: f64) -> String {
    format!("{value:?}")
}

fn raw_value(value: &Value) -> String {
    match value {
        Value::Ascii(parts) => join(
            parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).trim_end_matches('\0').to_string()),
        ),
        Value::Byte(values) => join(values),
        Value::Short(values) => join(values),
        Value::Long(values) => join(values),
        Value::SByte(values) => join(values),
        Value::SShort(values) => join(values),
        Value::SLong(values) => join(values),
        Value::Float(values) => join(values.iter().map(|&v| float_text(f64::from(v)))),
        Value::Double(values) => join(values.iter().map(|&v| float_text(v))),
        Value::Rational(values) => join(values.iter().map(|r| float_text(r.to_f64()))),
        Value::SRational(values) => join(values.iter().map(|r| float_text(r.to_f64()))),
        Value::Undefined(bytes, _) => String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{DynamicImage, ImageFormat, RgbImage};

    /// Little-endian TIFF block holding a single IFD0 entry:
    /// Orientation (0x0112), SHORT, count 1, value 1.
    fn orientation_tiff() -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II\x2A\x00");
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff
    }

    fn encode(format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, image::Rgb([200, 180, 20])))
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }

    /// Little-endian TIFF block with IFD0 {Orientation = 1, Exif pointer},
    /// an Exif IFD holding a 4-byte MakerNote and a thumbnail IFD1 with
    /// Compression = 6.
    fn tiff_with_thumbnail_and_maker_note() -> Vec<u8> {
        const IFD0: u32 = 8;
        const EXIF_IFD: u32 = IFD0 + 2 + 2 * 12 + 4;
        const IFD1: u32 = EXIF_IFD + 2 + 12 + 4;

        fn entry(tiff: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
            tiff.extend_from_slice(&tag.to_le_bytes());
            tiff.extend_from_slice(&kind.to_le_bytes());
            tiff.extend_from_slice(&count.to_le_bytes());
            tiff.extend_from_slice(&value);
        }

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II\x2A\x00");
        tiff.extend_from_slice(&IFD0.to_le_bytes());

        tiff.extend_from_slice(&2u16.to_le_bytes());
        entry(&mut tiff, 0x0112, 3, 1, [1, 0, 0, 0]);
        entry(&mut tiff, 0x8769, 4, 1, EXIF_IFD.to_le_bytes());
        tiff.extend_from_slice(&IFD1.to_le_bytes());

        tiff.extend_from_slice(&1u16.to_le_bytes());
        entry(&mut tiff, 0x927C, 7, 4, *b"ACME");
        tiff.extend_from_slice(&0u32.to_le_bytes());

        tiff.extend_from_slice(&1u16.to_le_bytes());
        entry(&mut tiff, 0x0103, 3, 1, [6, 0, 0, 0]);
        tiff.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(tiff.len() as u32, IFD1 + 2 + 12 + 4);
        tiff
    }

    /// A JPEG carrying `tiff` in an APP1 segment right after SOI.
    fn jpeg_with_exif(tiff: &[u8]) -> Vec<u8> {
        let jpeg = encode(ImageFormat::Jpeg);
        let segment_len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;

        let mut out = Vec::with_capacity(jpeg.len() + segment_len as usize + 2);
        out.extend_from_slice(&jpeg[..2]);
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(EXIF_HEADER);
        out.extend_from_slice(tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    fn jpeg_with_orientation() -> Vec<u8> {
        jpeg_with_exif(&orientation_tiff())
    }

    fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    struct Fixed {
        result: Option<MetadataMap>,
        calls: Arc<AtomicUsize>,
    }

    impl ExifStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn try_extract(&self, _path: &Path) -> Option<MetadataMap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn single(key: &str, value: &str) -> MetadataMap {
        MetadataMap::from([(key.to_string(), value.to_string())])
    }

    #[test]
    fn jpeg_orientation_is_extracted_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "oriented.jpg", &jpeg_with_orientation());

        let metadata = extract(&path);

        assert_eq!(metadata.get("Orientation").map(String::as_str), Some("1"), "metadata: {metadata:?}");
    }

    #[test]
    fn decoder_strategy_reads_spliced_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "oriented.jpg", &jpeg_with_orientation());

        assert_eq!(DecoderExif.try_extract(&path), Some(single("Orientation", "1")));
    }

    #[test]
    fn container_strategy_reads_spliced_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "oriented.jpg", &jpeg_with_orientation());

        let metadata = ContainerExif.try_extract(&path).unwrap();

        assert_eq!(
            metadata.get("Orientation").map(String::as_str),
            Some("row 0 at top and column 0 at left")
        );
    }

    #[test]
    fn container_strategy_skips_thumbnail_and_maker_note() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "detailed.jpg", &jpeg_with_exif(&tiff_with_thumbnail_and_maker_note()));

        let metadata = ContainerExif.try_extract(&path).unwrap();

        assert!(metadata.contains_key("Orientation"), "metadata: {metadata:?}");
        assert!(!metadata.contains_key("Compression"), "metadata: {metadata:?}");
        assert!(!metadata.contains_key("MakerNote"), "metadata: {metadata:?}");
    }

    #[test]
    fn decoder_strategy_keeps_primary_image_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "detailed.jpg", &jpeg_with_exif(&tiff_with_thumbnail_and_maker_note()));

        let metadata = DecoderExif.try_extract(&path).unwrap();

        assert_eq!(metadata.get("Orientation").map(String::as_str), Some("1"));
        assert!(!metadata.contains_key("Compression"), "metadata: {metadata:?}");
    }

    #[test]
    fn files_without_metadata_yield_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"not an image at all").unwrap();
        let png = dir.path().join("plain.png");
        std::fs::write(&png, encode(ImageFormat::Png)).unwrap();

        assert!(extract(&text).is_empty());
        assert!(extract(&png).is_empty());
        assert!(extract(&dir.path().join("missing.jpg")).is_empty());
    }

    #[test]
    fn first_non_empty_strategy_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = MetadataExtractor::with_strategies(vec![
            Box::new(Fixed { result: None, calls: calls.clone() }),
            Box::new(Fixed { result: Some(MetadataMap::new()), calls: calls.clone() }),
            Box::new(Fixed { result: Some(single("Make", "Canon")), calls: calls.clone() }),
            Box::new(Fixed { result: Some(single("Make", "Nikon")), calls: calls.clone() }),
        ]);

        let metadata = extractor.extract(Path::new("ignored.jpg"));

        assert_eq!(metadata, single("Make", "Canon"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn no_strategies_means_no_metadata() {
        let extractor = MetadataExtractor::with_strategies(Vec::new());
        assert!(extractor.extract(Path::new("anything.jpg")).is_empty());
    }

    #[test]
    fn namespaces_are_stripped_from_the_front() {
        assert_eq!(strip_namespace("EXIF ExposureTime"), "ExposureTime");
        assert_eq!(strip_namespace("Image Make"), "Make");
        assert_eq!(strip_namespace("GPS GPSLatitude"), "GPS GPSLatitude");
        assert_eq!(strip_namespace("Interoperability InteroperabilityIndex"), "Interoperability InteroperabilityIndex");
    }

    #[test]
    fn raw_values_render_as_text() {
        assert_eq!(raw_value(&Value::Short(vec![1])), "1");
        assert_eq!(raw_value(&Value::Long(vec![640, 480])), "640, 480");
        assert_eq!(raw_value(&Value::Ascii(vec![b"Canon\0".to_vec()])), "Canon");
        assert_eq!(raw_value(&Value::Rational(vec![exif::Rational { num: 72, denom: 1 }])), "72.0");
        assert_eq!(raw_value(&Value::Rational(vec![exif::Rational { num: 1, denom: 250 }])), "0.004");
        assert_eq!(raw_value(&Value::Double(vec![2.5])), "2.5");
        assert_eq!(raw_value(&Value::Undefined(b"0230".to_vec(), 0)), "0230");
    }

    #[test]
    fn unknown_tags_keep_their_numeric_id() {
        assert_eq!(tag_key(Tag::Orientation), "Orientation");
        assert_eq!(tag_key(Tag(Context::Tiff, 0xC350)), "50000");
    }

    #[test]
    fn exif_header_is_removed_before_parsing() {
        let mut raw = EXIF_HEADER.to_vec();
        raw.extend_from_slice(&orientation_tiff());
        assert_eq!(strip_exif_header(raw), orientation_tiff());
        assert_eq!(strip_exif_header(orientation_tiff()), orientation_tiff());
    }
}
