//! Streaming response decoding for docdeck.
//!
//! A chat response arrives as `data: <json>\n` lines. [`sse`] turns raw byte
//! chunks into JSON records, [`event`] interprets those records as typed
//! [`StreamEvent`]s, and [`canvas`] pulls an embedded canvas block out of the
//! cumulative assistant text as it grows.

pub mod canvas;
pub mod cleanup;
pub mod event;
pub mod segments;
pub mod sse;

pub use canvas::{
    CanvasBlock, CanvasBlockExtractor, CanvasBlockState, ScanOutcome, extract_canvas_block,
};
pub use cleanup::clean_final_text;
pub use event::{StreamEnvelope, StreamEvent, event_stream};
pub use segments::{CanvasCard, MessageSegment, split_message};
pub use sse::{SseLineDecoder, decode_stream};
