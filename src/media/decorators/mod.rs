//! Readers wrapping other readers
//!
//! Every decorator owns the reader it wraps, forwards `close` to it, and
//! works with any backend.

pub mod constant;
pub mod limit;
pub mod reversed;
pub mod speed;
pub mod zip;

pub use constant::ConstantFrameDuration;
pub use limit::{limit, DurationLimited};
pub use reversed::Reversed;
pub use speed::SpeedChanged;
pub use zip::Zipped;
