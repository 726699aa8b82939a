//! Time-based media (video clips) composited into raster exports.
//!
//! Decoding runs on a worker thread per clip. The export thread asks for a
//! frame and waits at most the configured timeout; a seek that does not settle
//! in time leaves the previously decoded frame on screen.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::errors::RenderError;

/// Seeks closer than this to the current position are skipped.
pub const SEEK_TOLERANCE_SECS: f64 = 0.04;

/// A decoded frame in straight-alpha RGBA.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for RgbaFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbaFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Expands packed RGB to RGBA with an opaque alpha channel.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for chunk in rgb.chunks_exact(3) {
            data.extend_from_slice(chunk);
            data.push(255);
        }
        Self { width, height, data }
    }
}

pub trait MediaDecoder {
    /// The frame shown at `seconds` into the source.
    fn frame_at(&mut self, seconds: f64) -> Result<RgbaFrame>;
}

/// Opens decoders for media sources referenced by the scene.
pub trait MediaLoader: Send + Sync {
    fn open(&self, source: &str) -> Result<Box<dyn MediaDecoder>>;
}

/// Decodes files with `video-rs` when the feature is enabled; otherwise every
/// open fails and the clip stays a placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMediaLoader;

impl MediaLoader for DefaultMediaLoader {
    #[cfg(feature = "video-rs")]
    fn open(&self, source: &str) -> Result<Box<dyn MediaDecoder>> {
        Ok(Box::new(video::FileDecoder::new(source)?))
    }

    #[cfg(not(feature = "video-rs"))]
    fn open(&self, source: &str) -> Result<Box<dyn MediaDecoder>> {
        anyhow::bail!("cannot decode {source}: built without the `video-rs` feature")
    }
}

#[cfg(feature = "video-rs")]
mod video {
    use super::*;
    use std::path::PathBuf;

    /// Sequential decoder that seeks only when the target jumps backwards or
    /// more than a second ahead.
    pub struct FileDecoder {
        decoder: video_rs::Decoder,
        current_time: f64,
        last_frame: Option<RgbaFrame>,
    }

    impl FileDecoder {
        pub fn new(source: &str) -> Result<Self> {
            video_rs::init().map_err(|e| anyhow::anyhow!("{e}"))?;
            let decoder = video_rs::Decoder::new(PathBuf::from(source))?;
            Ok(Self {
                decoder,
                current_time: -1.0,
                last_frame: None,
            })
        }
    }

    impl MediaDecoder for FileDecoder {
        fn frame_at(&mut self, target: f64) -> Result<RgbaFrame> {
            if target < self.current_time || target - self.current_time > 1.0 {
                self.decoder.seek((target * 1000.0) as i64)?;
                self.current_time = target - 0.1;
            }

            // Bounded so a broken stream cannot spin forever.
            for _ in 0..200 {
                let Ok((time, frame)) = self.decoder.decode() else {
                    break;
                };
                let t = time.as_secs_f64();
                self.current_time = t;
                if t < target - 0.01 {
                    continue;
                }
                let shape = frame.shape().to_vec();
                if shape.len() != 3 || shape[2] < 3 {
                    continue;
                }
                let (h, w) = (shape[0] as u32, shape[1] as u32);
                let (bytes, _) = frame.into_raw_vec_and_offset();
                let decoded = if shape[2] == 3 {
                    RgbaFrame::from_rgb(w, h, &bytes)
                } else {
                    RgbaFrame::new(w, h, bytes)
                };
                self.last_frame = Some(decoded.clone());
                return Ok(decoded);
            }

            self.last_frame
                .clone()
                .ok_or_else(|| anyhow::anyhow!("could not decode a frame at {target:.3}s"))
        }
    }
}

struct SeekRequest {
    id: u64,
    seconds: f64,
}

struct SeekResponse {
    id: u64,
    result: std::result::Result<RgbaFrame, String>,
}

fn serve<D: MediaDecoder + ?Sized>(
    label: &str,
    mut decoder: Box<D>,
    requests: Receiver<SeekRequest>,
    responses: Sender<SeekResponse>,
) {
    while let Ok(SeekRequest { id, seconds }) = requests.recv() {
        let result = decoder.frame_at(seconds).map_err(|e| format!("{e:#}"));
        if responses.send(SeekResponse { id, result }).is_err() {
            break;
        }
    }
    debug!(media = %label, "media worker stopped");
}

/// A decoder running on its own thread, released when the handle is dropped.
pub struct MediaHandle {
    label: String,
    requests: Option<Sender<SeekRequest>>,
    responses: Receiver<SeekResponse>,
    timeout: Duration,
    next_id: u64,
    position: Option<f64>,
    last_frame: Option<RgbaFrame>,
    stalls: u32,
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("label", &self.label)
            .field("position", &self.position)
            .field("stalls", &self.stalls)
            .finish()
    }
}

impl MediaHandle {
    /// Opens `source` through `loader` on a fresh worker thread. Decoders are
    /// created and used on the worker only, so they need not be `Send`.
    pub fn open(
        label: &str,
        loader: Arc<dyn MediaLoader>,
        source: &str,
        timeout: Duration,
    ) -> Result<Self, RenderError> {
        let source = source.to_string();
        Self::start(label, timeout, move || loader.open(&source))
    }

    /// Runs an already opened decoder on a worker thread.
    pub fn spawn(label: &str, decoder: Box<dyn MediaDecoder + Send>, timeout: Duration) -> Self {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let thread_label = label.to_string();
        thread::spawn(move || serve(&thread_label, decoder, req_rx, resp_tx));
        Self::new(label, req_tx, resp_rx, timeout)
    }

    fn start<F>(label: &str, timeout: Duration, open: F) -> Result<Self, RenderError>
    where
        F: FnOnce() -> Result<Box<dyn MediaDecoder>> + Send + 'static,
    {
        let (req_tx, req_rx) = unbounded::<SeekRequest>();
        let (resp_tx, resp_rx) = unbounded::<SeekResponse>();
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);

        let thread_label = label.to_string();
        thread::spawn(move || {
            let decoder = match open() {
                Ok(decoder) => {
                    let _ = ready_tx.send(Ok(()));
                    decoder
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("{e:#}")));
                    return;
                }
            };
            serve(&thread_label, decoder, req_rx, resp_tx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self::new(label, req_tx, resp_rx, timeout)),
            Ok(Err(msg)) => Err(RenderError::Media(msg)),
            Err(_) => Err(RenderError::Media(format!("{label} decoder thread exited"))),
        }
    }

    fn new(label: &str, requests: Sender<SeekRequest>, responses: Receiver<SeekResponse>, timeout: Duration) -> Self {
        Self {
            label: label.to_string(),
            requests: Some(requests),
            responses,
            timeout,
            next_id: 0,
            position: None,
            last_frame: None,
            stalls: 0,
        }
    }

    /// Number of seeks that did not settle within the timeout.
    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    /// The frame to show at `seconds`. A stalled seek returns the previous
    /// frame, which is `None` before the first successful seek.
    pub fn frame_at(&mut self, seconds: f64) -> Result<Option<&RgbaFrame>, RenderError> {
        if let Some(position) = self.position {
            if (position - seconds).abs() < SEEK_TOLERANCE_SECS && self.last_frame.is_some() {
                return Ok(self.last_frame.as_ref());
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| RenderError::Media(format!("{} is closed", self.label)))?;
        requests
            .send(SeekRequest { id, seconds })
            .map_err(|_| RenderError::Media(format!("{} decoder thread exited", self.label)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                // Late answer to an earlier, timed-out seek.
                Ok(response) if response.id != id => {
                    if let Ok(frame) = response.result {
                        self.last_frame = Some(frame);
                    }
                }
                Ok(response) => {
                    let frame = response.result.map_err(RenderError::Media)?;
                    self.position = Some(seconds);
                    self.last_frame = Some(frame);
                    return Ok(self.last_frame.as_ref());
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.stalls += 1;
                    warn!(media = %self.label, seconds, "media seek timed out; reusing previous frame");
                    return Ok(self.last_frame.as_ref());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RenderError::Media(format!("{} decoder thread exited", self.label)));
                }
            }
        }
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        // Closing the request channel ends the worker after its current decode.
        self.requests.take();
        debug!(media = %self.label, "media handle released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Solid {
        calls: Arc<AtomicU32>,
        stall_after: Option<f64>,
    }

    impl MediaDecoder for Solid {
        fn frame_at(&mut self, seconds: f64) -> Result<RgbaFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall_after.is_some_and(|t| seconds > t) {
                thread::sleep(Duration::from_millis(400));
            }
            let shade = (seconds * 100.0) as u8;
            Ok(RgbaFrame::new(1, 1, vec![shade, shade, shade, 255]))
        }
    }

    fn handle(stall_after: Option<f64>, timeout_ms: u64) -> (MediaHandle, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let decoder = Solid {
            calls: calls.clone(),
            stall_after,
        };
        (MediaHandle::spawn("clip", Box::new(decoder), Duration::from_millis(timeout_ms)), calls)
    }

    #[test]
    fn nearby_seeks_are_skipped() {
        let (mut media, calls) = handle(None, 1000);
        assert_eq!(media.frame_at(0.5).unwrap().map(|f| f.data[0]), Some(50));
        assert_eq!(media.frame_at(0.52).unwrap().map(|f| f.data[0]), Some(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(media.frame_at(0.6).unwrap().map(|f| f.data[0]), Some(60));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stalled_seek_reuses_previous_frame() {
        let (mut media, _) = handle(Some(0.5), 50);
        assert_eq!(media.frame_at(0.1).unwrap().map(|f| f.data[0]), Some(10));
        let started = Instant::now();
        assert_eq!(media.frame_at(0.9).unwrap().map(|f| f.data[0]), Some(10));
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(media.stalls(), 1);
    }

    #[test]
    fn decoder_errors_surface_as_media_errors() {
        struct Broken;
        impl MediaDecoder for Broken {
            fn frame_at(&mut self, _seconds: f64) -> Result<RgbaFrame> {
                anyhow::bail!("corrupt stream")
            }
        }
        let mut media = MediaHandle::spawn("broken", Box::new(Broken), Duration::from_millis(1000));
        match media.frame_at(0.0) {
            Err(RenderError::Media(msg)) => assert!(msg.contains("corrupt stream")),
            other => panic!("expected media error, got {other:?}"),
        }
    }

    #[test]
    fn failed_open_is_reported_before_any_seek() {
        let loader: Arc<dyn MediaLoader> = Arc::new(DefaultMediaLoader);
        // Without a decoder backend, or with a missing file, opening fails up front.
        let opened = MediaHandle::open("missing", loader, "/nonexistent/clip.mp4", Duration::from_millis(100));
        assert!(matches!(opened, Err(RenderError::Media(_))));
    }
}
