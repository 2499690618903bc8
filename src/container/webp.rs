//! Minimal RIFF/WebP chunk walker for animation metadata
//!
//! Pixel decoding is left to the `image` crate; this only reads what that
//! crate does not expose in a stable way: the loop count and the
//! per-frame durations of an animated file.

use std::time::Duration;

use crate::error::{EngineError, Result};

/// Animation metadata of a WebP file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WebpInfo {
    pub animated: bool,
    pub canvas_width: u32,
    pub canvas_height: u32,

    /// `ANIM` loop field: 0 = forever, N = play N times
    pub loop_field: Option<u16>,

    /// Duration of each `ANMF` frame, in file order
    pub frame_durations: Vec<Duration>,
}

impl WebpInfo {
    /// Loop count in reader convention; still images report -1
    pub fn loop_count(&self) -> i32 {
        match self.loop_field {
            Some(field) if self.animated => i32::from(field),
            _ => -1,
        }
    }
}

fn u24(bytes: &[u8]) -> u32 {
    u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16
}

/// Walk the top-level chunks of a WebP file
pub fn scan(bytes: &[u8]) -> Result<WebpInfo> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return Err(EngineError::malformed("missing RIFF/WEBP header"));
    }

    let mut info = WebpInfo::default();
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let fourcc = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body_start = offset + 8;
        let body_end = body_start
            .checked_add(size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| EngineError::malformed("WebP chunk runs past end of file"))?;
        let body = &bytes[body_start..body_end];

        match fourcc {
            b"VP8X" if body.len() >= 10 => {
                info.animated = body[0] & 0x02 != 0;
                info.canvas_width = u24(&body[4..7]) + 1;
                info.canvas_height = u24(&body[7..10]) + 1;
            }
            b"ANIM" if body.len() >= 6 => {
                info.loop_field = Some(u16::from_le_bytes([body[4], body[5]]));
            }
            b"ANMF" if body.len() >= 16 => {
                let millis = u24(&body[12..15]);
                info.frame_durations.push(Duration::from_millis(u64::from(millis)));
            }
            _ => {}
        }

        // Chunks are padded to an even size
        offset = body_end + (size & 1);
    }

    Ok(info)
}

#[cfg(test)]
pub(crate) mod test_support {
    pub fn chunk(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = fourcc.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    pub fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let payload: Vec<u8> = chunks.concat();
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&((payload.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(b"WEBP");
        out.extend_from_slice(&payload);
        out
    }

    pub fn anmf(duration_ms: u32) -> Vec<u8> {
        let mut body = vec![0u8; 16];
        body[12..15].copy_from_slice(&duration_ms.to_le_bytes()[..3]);
        chunk(b"ANMF", &body)
    }
}
