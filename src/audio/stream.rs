use futures::{Stream, StreamExt};
use tracing::{debug, instrument, warn};

/// Bytes per frame of 16-bit stereo PCM
pub const BYTES_PER_FRAME: usize = 4;

/// PCM collected from a generation stream
#[derive(Debug, Default)]
pub struct PcmCapture {
    /// Raw little-endian PCM bytes
    pub bytes: Vec<u8>,
    /// Frames counted while collecting
    pub frames: usize,
    /// Whether the stream ended before reaching the target
    pub ended_early: bool,
}

/// Pull chunks from `chunks` until at least `target_frames` frames are held.
///
/// Consumption stops as soon as the target is met, so whatever the producer
/// would have sent afterwards is never read. The stream is consumed by value
/// and cannot be resumed.
#[instrument(skip(chunks))]
pub async fn collect_frames<S, E>(chunks: S, target_frames: usize) -> Result<PcmCapture, E>
where
    S: Stream<Item = Result<Vec<u8>, E>>,
    E: std::fmt::Display,
{
    let mut chunks = std::pin::pin!(chunks);

    let mut capture = PcmCapture {
        bytes: Vec::with_capacity(target_frames * BYTES_PER_FRAME),
        ..Default::default()
    };

    while capture.frames < target_frames {
        match chunks.next().await {
            Some(Ok(chunk)) => {
                capture.frames += chunk.len() / BYTES_PER_FRAME;
                capture.bytes.extend_from_slice(&chunk);
            }
            Some(Err(e)) => {
                warn!(error = %e, frames = capture.frames, "Stream chunk error");
                return Err(e);
            }
            None => {
                debug!(frames = capture.frames, target_frames, "Stream ended early");
                capture.ended_early = true;
                break;
            }
        }
    }

    debug!(
        bytes = capture.bytes.len(),
        frames = capture.frames,
        "Capture complete"
    );
    Ok(capture)
}
