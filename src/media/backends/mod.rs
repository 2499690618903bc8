//! Format-specific readers
//!
//! Image backends produce [`image::RgbaImage`] frames and audio backends
//! produce [`AudioChunk`](crate::media::frame::AudioChunk) frames. Which
//! backend handles a format token is decided by
//! [`registry`](crate::media::registry).

pub mod audio;
pub mod ffmpeg;
pub mod gif;
pub mod memory;
pub mod pdf;
pub mod static_image;
pub mod wav;
pub mod webp;

pub use audio::SymphoniaReader;
pub use ffmpeg::FfmpegReader;
pub use gif::GifReader;
pub use memory::MemoryReader;
pub use pdf::PdfReader;
pub use static_image::StaticImageReader;
