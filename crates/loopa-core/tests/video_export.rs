//! Video export tests.
//!
//! Frames are captured through an in-memory backend so pixel content and
//! ordering can be inspected without decoding a container.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use loopa_core::errors::{ExportError, RenderError};
use loopa_core::export::encoder::{
    EncoderBackend, EncoderSettings, FrameSink, FrameTime, GifBackend, VideoFormat,
};
use loopa_core::export::video::{CancellationToken, RenderStrategy, VideoExportOptions, VideoExporter};
use loopa_core::media::{MediaDecoder, MediaLoader, RgbaFrame};
use loopa_core::model::{Element, ElementKind, RectProps, Scene, VideoProps};
use loopa_core::raster::{DirectRenderer, FrameRenderer, RenderContext};
use tiny_skia::Pixmap;

type Captured = Arc<Mutex<Vec<(u32, f64, [u8; 4])>>>;

/// Records the frame index, timestamp and centre pixel of every frame.
struct Capture {
    mime: &'static str,
    frames: Captured,
}

struct CaptureSink {
    frames: Captured,
}

impl EncoderBackend for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == self.mime
    }

    fn open(&self, _settings: &EncoderSettings) -> anyhow::Result<Box<dyn FrameSink>> {
        Ok(Box::new(CaptureSink {
            frames: self.frames.clone(),
        }))
    }
}

impl FrameSink for CaptureSink {
    fn push_frame(&mut self, pixmap: &Pixmap, time: FrameTime) -> anyhow::Result<()> {
        let px = pixmap
            .pixel(pixmap.width() / 2, pixmap.height() / 2)
            .unwrap()
            .demultiply();
        self.frames
            .lock()
            .unwrap()
            .push((time.index, time.seconds, [px.red(), px.green(), px.blue(), px.alpha()]));
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<Vec<u8>> {
        Ok(b"captured".to_vec())
    }
}

fn capture(mime: &'static str) -> (Vec<Box<dyn EncoderBackend>>, Captured) {
    let frames: Captured = Arc::default();
    let backends: Vec<Box<dyn EncoderBackend>> = vec![Box::new(Capture {
        mime,
        frames: frames.clone(),
    })];
    (backends, frames)
}

fn red_square_scene(total_frames: u32) -> Scene {
    let rect = Element::new("r", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 20.0, 20.0).with_fill("FF0000");
    Scene::new(20, 20, 10, total_frames).with_element(rect)
}

fn direct(format: VideoFormat) -> VideoExportOptions {
    VideoExportOptions::new(format).with_strategy(RenderStrategy::Direct)
}

struct Failing {
    calls: Arc<AtomicU32>,
}

impl FrameRenderer for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn render(&mut self, _ctx: &RenderContext, _pixmap: &mut Pixmap) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RenderError::Markup("boom".into()))
    }
}

/// Draws normally except on one frame.
struct FailsOn {
    frame: f64,
}

impl FrameRenderer for FailsOn {
    fn name(&self) -> &'static str {
        "fails-on"
    }

    fn render(&mut self, ctx: &RenderContext, pixmap: &mut Pixmap) -> Result<(), RenderError> {
        if ctx.sample.frame == self.frame {
            return Err(RenderError::Markup(format!("frame {} is broken", self.frame)));
        }
        DirectRenderer.render(ctx, pixmap)
    }
}

#[test]
fn every_frame_is_pushed_in_order() {
    let (backends, frames) = capture("video/webm; codecs=vp9");
    let exported = VideoExporter::new(direct(VideoFormat::Webm))
        .with_backends(backends)
        .export(&red_square_scene(5))
        .unwrap();

    assert_eq!(exported.artifact.frame_count, 6);
    assert_eq!(exported.artifact.mime_type, "video/webm; codecs=vp9");
    assert_eq!(exported.artifact.bytes, b"captured");
    let frames = frames.lock().unwrap();
    let indices: Vec<u32> = frames.iter().map(|f| f.0).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(frames[3].1, 0.3);
    assert!(frames.iter().all(|f| f.2 == [255, 0, 0, 255]));
}

#[test]
fn failing_renderer_degrades_to_background_frames() {
    let (backends, frames) = capture("image/gif");
    let calls = Arc::new(AtomicU32::new(0));
    let mut scene = red_square_scene(4);
    scene.background = "00FF00".into();

    let exported = VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .with_renderer(Failing { calls: calls.clone() })
        .export(&scene)
        .unwrap();

    assert_eq!(exported.artifact.frame_count, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(frames.lock().unwrap().iter().all(|f| f.2 == [0, 255, 0, 255]));
    let degraded: Vec<_> = exported.warnings.iter().filter(|w| w.contains("boom")).collect();
    assert_eq!(degraded.len(), 1);
}

#[test]
fn one_failed_frame_leaves_its_neighbours_intact() {
    let (backends, frames) = capture("image/gif");
    let mut scene = red_square_scene(4);
    scene.background = "00FF00".into();

    let exported = VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .with_renderer(FailsOn { frame: 2.0 })
        .export(&scene)
        .unwrap();

    assert_eq!(exported.artifact.frame_count, 5);
    let pixels: Vec<[u8; 4]> = frames.lock().unwrap().iter().map(|f| f.2).collect();
    let red = [255, 0, 0, 255];
    let green = [0, 255, 0, 255];
    assert_eq!(pixels, vec![red, red, green, red, red]);
    assert_eq!(exported.warnings.iter().filter(|w| w.contains("frame 2 is broken")).count(), 1);
}

#[test]
fn negotiation_failure_happens_before_rendering() {
    let calls = Arc::new(AtomicU32::new(0));
    let result = VideoExporter::new(direct(VideoFormat::Mp4))
        .with_backends(Vec::new())
        .with_renderer(Failing { calls: calls.clone() })
        .export(&red_square_scene(3));

    assert!(matches!(result, Err(ExportError::CodecUnavailable { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unavailable_format_falls_back_to_gif() {
    let exported = VideoExporter::new(direct(VideoFormat::Mp4))
        .with_backends(vec![Box::new(GifBackend::default())])
        .export(&red_square_scene(3))
        .unwrap();

    assert_eq!(exported.artifact.mime_type, "image/gif");
    assert!(exported.artifact.bytes.starts_with(b"GIF89a"));
    assert!(exported.warnings.iter().any(|w| w.contains("No mp4 encoder")));
}

#[test]
fn progress_is_reported_after_each_frame() {
    let (backends, _) = capture("image/gif");
    let mut seen = Vec::new();
    VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .on_progress(|p| seen.push((p.frame, p.fraction)))
        .export(&red_square_scene(4))
        .unwrap();

    assert_eq!(seen, vec![(0, 0.0), (1, 0.25), (2, 0.5), (3, 0.75), (4, 1.0)]);
}

#[test]
fn cancellation_stops_before_the_next_frame() {
    let (backends, frames) = capture("image/gif");
    let token = CancellationToken::new();
    let trigger = token.clone();

    let result = VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .with_cancellation(token)
        .on_progress(move |p| {
            if p.frame == 2 {
                trigger.cancel();
            }
        })
        .export(&red_square_scene(10));

    assert!(matches!(result, Err(ExportError::Cancelled(3))));
    assert_eq!(frames.lock().unwrap().len(), 3);
}

#[test]
fn zero_fps_is_rejected() {
    let mut scene = red_square_scene(3);
    scene.fps = 0;
    let result = VideoExporter::new(direct(VideoFormat::Gif)).export(&scene);
    assert!(matches!(result, Err(ExportError::InvalidOptions(_))));
}

/// Solid blue frames; seeks past `stall_after` seconds hang for a while.
struct BlueClip {
    stall_after: f64,
}

impl MediaDecoder for BlueClip {
    fn frame_at(&mut self, seconds: f64) -> anyhow::Result<RgbaFrame> {
        if seconds > self.stall_after {
            thread::sleep(Duration::from_millis(300));
        }
        Ok(RgbaFrame::new(2, 2, [0, 0, 255, 255].repeat(4)))
    }
}

struct BlueLoader {
    stall_after: f64,
}

impl MediaLoader for BlueLoader {
    fn open(&self, _source: &str) -> anyhow::Result<Box<dyn MediaDecoder>> {
        Ok(Box::new(BlueClip {
            stall_after: self.stall_after,
        }))
    }
}

fn clip_scene() -> Scene {
    let clip = Element::new(
        "clip",
        ElementKind::Video(VideoProps {
            source: "clip.mp4".into(),
            trim_start: 0.0,
            trim_end: 0.0,
            playback_rate: 1.0,
            fit: Default::default(),
        }),
        0.0,
        0.0,
        20.0,
        20.0,
    );
    Scene::new(20, 20, 10, 4).with_element(clip)
}

#[test]
fn video_clips_are_composited() {
    let (backends, frames) = capture("image/gif");
    let exported = VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .with_media_loader(BlueLoader { stall_after: f64::MAX })
        .export(&clip_scene())
        .unwrap();

    assert_eq!(exported.artifact.frame_count, 5);
    assert!(frames.lock().unwrap().iter().all(|f| f.2 == [0, 0, 255, 255]));
}

#[test]
fn stalled_media_seeks_time_out() {
    let (backends, frames) = capture("image/gif");
    let options = direct(VideoFormat::Gif).with_seek_timeout(Duration::from_millis(20));
    let started = Instant::now();
    let exported = VideoExporter::new(options)
        .with_backends(backends)
        .with_media_loader(BlueLoader { stall_after: 0.05 })
        .export(&clip_scene())
        .unwrap();

    // Four stalled seeks, each bounded by the timeout rather than the decoder.
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(exported.artifact.frame_count, 5);
    // The first frame keeps being shown.
    assert!(frames.lock().unwrap().iter().all(|f| f.2 == [0, 0, 255, 255]));
    assert!(exported.warnings.iter().any(|w| w.contains("did not seek in time")));
}

#[test]
fn missing_media_becomes_a_warning() {
    struct NoMedia;
    impl MediaLoader for NoMedia {
        fn open(&self, source: &str) -> anyhow::Result<Box<dyn MediaDecoder>> {
            anyhow::bail!("{source} not found")
        }
    }

    let (backends, _) = capture("image/gif");
    let exported = VideoExporter::new(direct(VideoFormat::Gif))
        .with_backends(backends)
        .with_media_loader(NoMedia)
        .export(&clip_scene())
        .unwrap();
    assert!(exported.warnings.iter().any(|w| w.contains("placeholder")));
}
