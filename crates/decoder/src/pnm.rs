//! Streaming region decoder for binary PGM (`P5`) and PPM (`P6`) files.
//!
//! Only the rows a region touches are read; nothing else of the raster is
//! ever held in memory.

use std::fmt;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

use image::{Rgba, RgbaImage};
use model::IntSize;

use crate::bitmap::Bitmap;
use crate::error::{DecodeError, OpenError};
use crate::region::{DecodeRequest, RegionDecoder, RegionDecoderFactory, validate_region};
use crate::source::{ImageSource, ReadSeek};

const MAX_HEADER_TOKEN_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PnmHeaderError {
    UnknownMagic([u8; 2]),
    UnexpectedEof,
    InvalidNumber(String),
    UnsupportedMaxValue(u32),
    ZeroDimension,
    TruncatedRaster { expected: u64, actual: u64 },
}

impl fmt::Display for PnmHeaderError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PnmHeaderError::UnknownMagic(magic) => write!(
                formatter,
                "expected a P5 or P6 header, found {:?}",
                String::from_utf8_lossy(magic)
            ),
            PnmHeaderError::UnexpectedEof => write!(formatter, "header ends prematurely"),
            PnmHeaderError::InvalidNumber(token) => {
                write!(formatter, "header field {token:?} is not a number")
            }
            PnmHeaderError::UnsupportedMaxValue(value) => {
                write!(formatter, "max value {value} is outside 1..=255")
            }
            PnmHeaderError::ZeroDimension => write!(formatter, "image has a zero dimension"),
            PnmHeaderError::TruncatedRaster { expected, actual } => write!(
                formatter,
                "raster needs {expected} bytes but the file only has {actual}"
            ),
        }
    }
}

impl std::error::Error for PnmHeaderError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnmHeader {
    pub size: IntSize,
    pub channels: u8,
    pub max_value: u32,
    /// Byte offset of the first raster byte.
    pub raster_offset: u64,
}

impl PnmHeader {
    pub fn row_bytes(&self) -> u64 {
        self.size.width as u64 * self.channels as u64
    }

    pub fn raster_bytes(&self) -> u64 {
        self.row_bytes() * self.size.height as u64
    }
}

enum HeaderReadError {
    Io(io::Error),
    Header(PnmHeaderError),
}

impl From<io::Error> for HeaderReadError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            HeaderReadError::Header(PnmHeaderError::UnexpectedEof)
        } else {
            HeaderReadError::Io(error)
        }
    }
}

impl From<PnmHeaderError> for HeaderReadError {
    fn from(error: PnmHeaderError) -> Self {
        HeaderReadError::Header(error)
    }
}

struct HeaderReader<R> {
    reader: R,
    consumed: u64,
}

impl<R: Read> HeaderReader<R> {
    fn next_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        self.consumed += 1;
        Ok(byte[0])
    }

    /// Next whitespace separated token, skipping `#` comments. Consumes the
    /// single whitespace byte that terminates the token.
    fn next_token(&mut self) -> Result<String, HeaderReadError> {
        let mut token = String::new();
        loop {
            let byte = self.next_byte()?;
            if byte == b'#' {
                while self.next_byte()? != b'\n' {}
                if token.is_empty() {
                    continue;
                }
                return Ok(token);
            }
            if byte.is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                return Ok(token);
            }
            if token.len() == MAX_HEADER_TOKEN_LEN {
                return Err(PnmHeaderError::InvalidNumber(token).into());
            }
            token.push(byte as char);
        }
    }

    fn next_number(&mut self) -> Result<u32, HeaderReadError> {
        let token = self.next_token()?;
        token
            .parse()
            .map_err(|_| PnmHeaderError::InvalidNumber(token).into())
    }
}

fn read_header<R: Read>(reader: R) -> Result<PnmHeader, HeaderReadError> {
    let mut header = HeaderReader {
        reader,
        consumed: 0,
    };
    let magic = [header.next_byte()?, header.next_byte()?];
    let channels = match &magic {
        b"P5" => 1,
        b"P6" => 3,
        _ => return Err(PnmHeaderError::UnknownMagic(magic).into()),
    };
    let width = header.next_number()?;
    let height = header.next_number()?;
    let max_value = header.next_number()?;
    if width == 0 || height == 0 {
        return Err(PnmHeaderError::ZeroDimension.into());
    }
    if max_value == 0 || max_value > 255 {
        return Err(PnmHeaderError::UnsupportedMaxValue(max_value).into());
    }
    Ok(PnmHeader {
        size: IntSize::new(width, height),
        channels,
        max_value,
        raster_offset: header.consumed,
    })
}

/// Parses the header of `reader` and checks that the raster is complete.
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<PnmHeader, PnmReadError> {
    reader.seek(SeekFrom::Start(0)).map_err(PnmReadError::Io)?;
    let header = read_header(&mut *reader).map_err(|error| match error {
        HeaderReadError::Io(error) => PnmReadError::Io(error),
        HeaderReadError::Header(error) => PnmReadError::Header(error),
    })?;
    let file_len = reader.seek(SeekFrom::End(0)).map_err(PnmReadError::Io)?;
    let expected = header.raster_offset + header.raster_bytes();
    if file_len < expected {
        return Err(PnmReadError::Header(PnmHeaderError::TruncatedRaster {
            expected,
            actual: file_len,
        }));
    }
    Ok(header)
}

#[derive(Debug)]
pub enum PnmReadError {
    Io(io::Error),
    Header(PnmHeaderError),
}

impl PnmReadError {
    fn for_source(self, source: &ImageSource) -> OpenError {
        match self {
            PnmReadError::Io(error) => OpenError::Io {
                source_description: source.to_string(),
                error,
            },
            PnmReadError::Header(error) => OpenError::unsupported(source.to_string(), error),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PnmDecoderFactory;

impl RegionDecoderFactory for PnmDecoderFactory {
    fn create(&self, source: &ImageSource) -> Result<Box<dyn RegionDecoder>, OpenError> {
        let decoder = PnmRegionDecoder::open(source)?;
        Ok(Box::new(decoder))
    }
}

pub struct PnmRegionDecoder {
    reader: BufReader<Box<dyn ReadSeek>>,
    header: PnmHeader,
    row: Vec<u8>,
}

impl PnmRegionDecoder {
    pub fn open(source: &ImageSource) -> Result<Self, OpenError> {
        let reader = source.open().map_err(|error| OpenError::Io {
            source_description: source.to_string(),
            error,
        })?;
        let mut reader = BufReader::new(reader);
        let header = parse_header(&mut reader).map_err(|error| error.for_source(source))?;
        Ok(Self {
            reader,
            header,
            row: Vec::new(),
        })
    }

    pub fn header(&self) -> PnmHeader {
        self.header
    }

    fn expand(&self, sample: &[u8]) -> Rgba<u8> {
        let scale = |value: u8| -> u8 {
            if self.header.max_value == 255 {
                value
            } else {
                ((value.min(self.header.max_value as u8) as u32 * 255) / self.header.max_value)
                    as u8
            }
        };
        match sample {
            [gray] => {
                let gray = scale(*gray);
                Rgba([gray, gray, gray, 255])
            }
            [red, green, blue] => Rgba([scale(*red), scale(*green), scale(*blue), 255]),
            _ => unreachable!("pnm samples have one or three channels"),
        }
    }
}

impl RegionDecoder for PnmRegionDecoder {
    fn image_size(&self) -> IntSize {
        self.header.size
    }

    fn decode_region(&mut self, request: &DecodeRequest<'_>) -> Result<Bitmap, DecodeError> {
        validate_region(request.region, self.header.size)?;
        let output_size = request.output_size();
        let sample_size = request.sample_size.get() as u64;
        let channels = self.header.channels as usize;
        let region = request.region;

        let row_len = region.width() as usize * channels;
        self.row.resize(row_len, 0);
        let mut pixels = RgbaImage::new(output_size.width, output_size.height);

        for output_y in 0..output_size.height {
            if request.cancel.is_cancelled() {
                return Err(DecodeError::Cancelled);
            }
            let source_y = region.top as u64 + output_y as u64 * sample_size;
            let offset = self.header.raster_offset
                + source_y * self.header.row_bytes()
                + region.left as u64 * channels as u64;
            self.reader.seek(SeekFrom::Start(offset))?;
            self.reader.read_exact(&mut self.row)?;

            for output_x in 0..output_size.width {
                let start = output_x as usize * sample_size as usize * channels;
                let pixel = self.expand(&self.row[start..start + channels]);
                pixels.put_pixel(output_x, output_y, pixel);
            }
        }
        Ok(Bitmap::new(pixels))
    }
}

/// Writes a binary PPM header for a raster that follows.
pub fn write_ppm_header<W: io::Write>(writer: &mut W, size: IntSize) -> io::Result<()> {
    write!(writer, "P6\n{} {}\n255\n", size.width, size.height)
}
