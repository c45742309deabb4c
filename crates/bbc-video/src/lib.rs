//! Video ULA, SAA5050 teletext generator, and the lock-free pixel queue
//! that carries their output to a renderer.
//!
//! The CRTC (`motorola-6845`) drives timing and the refresh address; this
//! crate turns the bytes that address reads out of screen memory into
//! pixels. [`VideoUla`] handles bitmap modes 0-6, [`Saa5050`] handles
//! teletext mode 7, and both write into [`PixelBatch`] records carried by
//! an [`OutputQueue`].

mod output_queue;
mod pixel_batch;
mod saa5050;
mod video_ula;

pub use output_queue::{OutputQueue, Spans, DEFAULT_CAPACITY};
pub use pixel_batch::{bbc_colors, video_flag, PixelBatch, PixelBatchType, VideoDataPixel};
pub use saa5050::Saa5050;
pub use video_ula::VideoUla;
