//! SSE frame decoding: byte chunks in, `data:` payload strings out.
//!
//! Frames are `data: <json>\n\n`; a frame may span several reads, and one
//! read may carry several frames. The decoder owns the partial-frame
//! remainder so callers can feed transport chunks as they arrive.

/// Incremental decoder for `data: <json>\n\n` frames.
///
/// Feed raw chunks with [`feed`](SseFrameDecoder::feed); each call returns the
/// payloads of every frame completed by that chunk, in order. Call
/// [`finish`](SseFrameDecoder::finish) at end of stream to flush a trailing
/// frame that was never terminated by a blank line.
///
/// Within a frame, multiple `data:` lines are joined with `\n`; comment and
/// field lines other than `data:` (`event:`, `id:`, `retry:`, `:` comments)
/// are ignored; a `[DONE]` sentinel payload is dropped.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk; returns payloads of frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk).replace("\r\n", "\n");
        self.buffer.push_str(&text);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..pos + 2).collect();
            if let Some(payload) = parse_frame(&frame) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a trailing unterminated frame, if any. Call once at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return None;
        }
        parse_frame(&rest)
    }
}

/// Extracts the joined `data:` payload from one frame's text.
/// Returns `None` for frames with no data lines and for the `[DONE]` sentinel.
fn parse_frame(frame: &str) -> Option<String> {
    let mut payload = String::new();
    for line in frame.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        if !payload.is_empty() {
            payload.push('\n');
        }
        payload.push_str(data);
    }
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload)
}
