//! GIF89a block scanner and loop-count editor
//!
//! The editor rewrites the NETSCAPE2.0 application extension in place and
//! copies every other byte through untouched, so pixel data is never
//! decoded or re-encoded.

use std::io::{self, Read};
use std::ops::Range;

use tracing::debug;

use crate::error::{EngineError, Result};

const EXTENSION_INTRODUCER: u8 = 0x21;
const APPLICATION_LABEL: u8 = 0xFF;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const NETSCAPE_ID: &[u8; 11] = b"NETSCAPE2.0";

/// Structure found by [`scan`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GifLayout {
    /// Offset right after the global color table, where an application extension may go
    pub insertion_point: usize,

    /// Byte range of every application extension, in file order
    pub application_extensions: Vec<Range<usize>>,

    /// Data field of the last NETSCAPE2.0 looping sub-block, if present
    pub netscape_loops: Option<u16>,

    pub image_count: usize,
}

impl GifLayout {
    /// Loop count in reader convention: 0 = forever, -1 = play once, N = repeat
    pub fn loop_count(&self) -> i32 {
        self.netscape_loops.map(i32::from).unwrap_or(-1)
    }
}

struct CountingReader<R> {
    inner: R,
    position: usize,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Next byte, or `None` at a clean end of stream
    fn next_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn byte(&mut self, context: &str) -> Result<u8> {
        self.next_byte()?
            .ok_or_else(|| EngineError::malformed(format!("unexpected end of data in {}", context)))
    }

    fn exact(&mut self, buf: &mut [u8], context: &str) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                EngineError::malformed(format!("unexpected end of data in {}", context))
            }
            _ => e.into(),
        })?;
        self.position += buf.len();
        Ok(())
    }

    fn skip(&mut self, count: usize, context: &str) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(count as u64), &mut io::sink())?;
        self.position += copied as usize;
        if copied as usize != count {
            return Err(EngineError::malformed(format!("unexpected end of data in {}", context)));
        }
        Ok(())
    }

    /// Walk length-prefixed sub-blocks up to and including the zero terminator
    fn skip_sub_blocks(&mut self, context: &str) -> Result<()> {
        loop {
            match self.byte(context)? {
                0 => return Ok(()),
                len => self.skip(len as usize, context)?,
            }
        }
    }
}

fn color_table_size(packed: u8) -> usize {
    if packed & 0x80 == 0 {
        return 0;
    }
    3 * (1usize << ((packed & 0x07) + 1))
}

/// Scan the block structure of a GIF stream
pub fn scan<R: Read>(input: R) -> Result<GifLayout> {
    let mut reader = CountingReader::new(input);

    let mut signature = [0u8; 6];
    reader.exact(&mut signature, "header")?;
    if &signature[..3] != b"GIF" {
        return Err(EngineError::malformed("missing GIF signature"));
    }

    let mut screen = [0u8; 7];
    reader.exact(&mut screen, "logical screen descriptor")?;
    reader.skip(color_table_size(screen[4]), "global color table")?;

    let mut layout = GifLayout {
        insertion_point: reader.position,
        ..GifLayout::default()
    };

    loop {
        let start = reader.position;
        match reader.next_byte()? {
            None | Some(TRAILER) => break,
            Some(EXTENSION_INTRODUCER) => {
                let label = reader.byte("extension")?;
                if label == APPLICATION_LABEL {
                    if let Some(loops) = read_application_extension(&mut reader)? {
                        layout.netscape_loops = Some(loops);
                    }
                    layout.application_extensions.push(start..reader.position);
                } else {
                    reader.skip_sub_blocks("extension")?;
                }
            }
            Some(IMAGE_SEPARATOR) => {
                let mut descriptor = [0u8; 9];
                reader.exact(&mut descriptor, "image descriptor")?;
                reader.skip(color_table_size(descriptor[8]), "local color table")?;
                reader.byte("image data")?;
                reader.skip_sub_blocks("image data")?;
                layout.image_count += 1;
            }
            Some(other) => {
                return Err(EngineError::malformed(format!(
                    "unknown block 0x{:02X} at offset {}",
                    other, start
                )));
            }
        }
    }

    Ok(layout)
}

/// Consume an application extension body, returning its NETSCAPE loop field if it has one
fn read_application_extension<R: Read>(reader: &mut CountingReader<R>) -> Result<Option<u16>> {
    let mut identifier = Vec::new();
    let mut loops = None;
    let mut first = true;

    loop {
        let len = reader.byte("application extension")? as usize;
        if len == 0 {
            return Ok(loops);
        }
        let mut block = vec![0u8; len];
        reader.exact(&mut block, "application extension")?;

        if first {
            identifier = block;
            first = false;
        } else if identifier == NETSCAPE_ID && block.len() == 3 && block[0] == 0x01 {
            loops = Some(u16::from_le_bytes([block[1], block[2]]));
        }
    }
}

/// Read the loop count of a GIF in reader convention
pub fn loop_count(bytes: &[u8]) -> Result<i32> {
    Ok(scan(bytes)?.loop_count())
}

/// Swap between the editor's public loop convention and the GIF field convention
///
/// Publicly 0 means "play once" and -1 means "loop forever". In the file a
/// field value of 0 means forever and playing once is expressed by leaving
/// the extension out, which the negative result signals.
fn to_field_convention(loop_count: i32) -> i32 {
    match loop_count {
        0 => -1,
        -1 => 0,
        n => n,
    }
}

fn netscape_block(loops: u16) -> [u8; 19] {
    let mut block = [0u8; 19];
    block[0] = EXTENSION_INTRODUCER;
    block[1] = APPLICATION_LABEL;
    block[2] = 0x0B;
    block[3..14].copy_from_slice(NETSCAPE_ID);
    block[14] = 0x03;
    block[15] = 0x01;
    block[16..18].copy_from_slice(&loops.to_le_bytes());
    block[18] = 0x00;
    block
}

/// Rewrite the loop behavior of a GIF without touching its pixels
///
/// `loop_count` uses 0 = play once, -1 = loop forever, N = repeat N times.
/// Every existing application extension is dropped and at most one
/// NETSCAPE2.0 block is inserted right after the global color table.
pub fn set_loop_count(bytes: &[u8], loop_count: i32) -> Result<Vec<u8>> {
    if !(-1..=u16::MAX as i32).contains(&loop_count) {
        return Err(EngineError::unsupported(format!(
            "loop count must be between -1 and {}, got {}",
            u16::MAX,
            loop_count
        )));
    }

    let layout = scan(bytes)?;
    let field = to_field_convention(loop_count);

    let mut output = Vec::with_capacity(bytes.len() + 19);
    output.extend_from_slice(&bytes[..layout.insertion_point]);
    if field >= 0 {
        output.extend_from_slice(&netscape_block(field as u16));
    }

    let mut cursor = layout.insertion_point;
    for range in &layout.application_extensions {
        output.extend_from_slice(&bytes[cursor..range.start]);
        cursor = range.end;
    }
    output.extend_from_slice(&bytes[cursor..]);

    debug!(
        "Rewrote GIF loop count to {} (removed {} application extensions)",
        loop_count,
        layout.application_extensions.len()
    );
    Ok(output)
}

#[cfg(test)]
pub(crate) mod test_support {
    /// 1x1 two-color GIF with no application extension
    pub fn tiny_gif() -> Vec<u8> {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&[0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF]);
        bytes.extend_from_slice(&image_block());
        bytes.push(0x3B);
        bytes
    }

    pub fn image_block() -> Vec<u8> {
        let mut block = vec![0x2C, 0, 0, 0, 0, 0x01, 0x00, 0x01, 0x00, 0x00];
        block.extend_from_slice(&[0x02, 0x02, 0x44, 0x01, 0x00]);
        block
    }

    pub fn count_netscape(bytes: &[u8]) -> usize {
        bytes.windows(11).filter(|w| *w == b"NETSCAPE2.0").count()
    }
}
