pub mod lines;
pub mod sse;
pub mod transcoder;

pub use lines::{event_stream, line_stream, LineDecoder};
pub use sse::{sse_ok_response, DONE_FRAME};
pub use transcoder::StreamTranscoder;
