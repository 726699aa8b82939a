//! # Video Export
//!
//! Renders the scene frame by frame and streams the frames to an encoder.
//!
//! ## Responsibilities
//! - **Negotiation**: picks a container/codec before any frame work.
//! - **Frame Loop**: frames `0..=total_frames`, strictly in order.
//! - **Media**: composites video clips at their trimmed local time.
//! - **Degradation**: a frame that fails to render becomes a background frame.
//!
//! ## Key Functions
//! - `export_video`: one-call export with the built-in backends.
//! - `VideoExporter`: builder for custom backends, renderers, progress and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiny_skia::{FilterQuality, IntSize, Mask, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};
use tracing::{debug, info, instrument, warn};

use crate::errors::{ExportError, RenderError};
use crate::export::encoder::{self, EncoderBackend, EncoderSettings, FrameTime, VideoFormat};
use crate::export::{validate_scene, EMPTY_EXPORT_WARNING};
use crate::media::{DefaultMediaLoader, MediaHandle, MediaLoader, RgbaFrame};
use crate::model::{Element, ElementKind, ObjectFit, Scene, VideoProps};
use crate::raster::{DirectRenderer, FrameRenderer, MarkupRenderer, RenderContext};
use crate::timeline::{FrameSample, Timeline};
use crate::warnings::{Exported, Warnings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1x")]
    X1,
    #[serde(rename = "2x")]
    X2,
}

impl Resolution {
    pub fn factor(self) -> u32 {
        match self {
            Resolution::X1 => 1,
            Resolution::X2 => 2,
        }
    }
}

/// How frames are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStrategy {
    /// SVG markup through `resvg`; matches the SVG export.
    #[default]
    Markup,
    /// Immediate-mode `tiny-skia` drawing; faster, no text.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoExportOptions {
    pub format: VideoFormat,
    pub resolution: Resolution,
    #[serde(rename = "videoBitrate")]
    pub bitrate: u64,
    pub transparent_background: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub strategy: RenderStrategy,
    /// Longest wait for a media seek before the previous frame is reused.
    pub seek_timeout_ms: u64,
    /// Sleep one frame interval after each frame.
    pub pace_realtime: bool,
}

impl Default for VideoExportOptions {
    fn default() -> Self {
        Self {
            format: VideoFormat::default(),
            resolution: Resolution::X1,
            bitrate: 8_000_000,
            transparent_background: false,
            looping: true,
            strategy: RenderStrategy::Markup,
            seek_timeout_ms: 500,
            pace_realtime: false,
        }
    }
}

impl VideoExportOptions {
    pub fn new(format: VideoFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_strategy(mut self, strategy: RenderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.transparent_background = transparent;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace_realtime = pace;
        self
    }
}

/// Reported after each frame is handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub frame: u32,
    pub total_frames: u32,
    /// `frame / total_frames`, `1.0` for a single-frame export.
    pub fraction: f64,
}

/// Shared flag a caller sets to stop an export between frames.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub frame_count: u32,
}

/// Configurable video export.
///
/// ```no_run
/// use loopa_core::export::video::{VideoExporter, VideoExportOptions};
/// use loopa_core::export::encoder::VideoFormat;
/// # let scene = loopa_core::model::Scene::new(320, 240, 30, 60);
/// let exported = VideoExporter::new(VideoExportOptions::new(VideoFormat::Gif))
///     .on_progress(|p| println!("{:.0}%", p.fraction * 100.0))
///     .export(&scene)?;
/// # Ok::<(), loopa_core::errors::ExportError>(())
/// ```
pub struct VideoExporter<'a> {
    options: VideoExportOptions,
    backends: Vec<Box<dyn EncoderBackend>>,
    renderer: Option<Box<dyn FrameRenderer + 'a>>,
    media_loader: Arc<dyn MediaLoader>,
    progress: Option<Box<dyn FnMut(Progress) + 'a>>,
    cancel: Option<CancellationToken>,
}

impl<'a> VideoExporter<'a> {
    pub fn new(options: VideoExportOptions) -> Self {
        Self {
            options,
            backends: encoder::default_backends(),
            renderer: None,
            media_loader: Arc::new(DefaultMediaLoader),
            progress: None,
            cancel: None,
        }
    }

    /// Replaces the encoder backends consulted during negotiation.
    pub fn with_backends(mut self, backends: Vec<Box<dyn EncoderBackend>>) -> Self {
        self.backends = backends;
        self
    }

    /// Overrides the renderer chosen by `options.strategy`.
    pub fn with_renderer(mut self, renderer: impl FrameRenderer + 'a) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn with_media_loader(mut self, loader: impl MediaLoader + 'static) -> Self {
        self.media_loader = Arc::new(loader);
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(Progress) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[instrument(level = "info", skip_all, fields(format = %self.options.format, width = scene.width, height = scene.height, fps = scene.fps))]
    pub fn export(self, scene: &Scene) -> Result<Exported<VideoArtifact>, ExportError> {
        let VideoExporter {
            options,
            backends,
            renderer,
            media_loader,
            mut progress,
            cancel,
        } = self;

        validate_scene(scene)?;
        if options.bitrate == 0 {
            return Err(ExportError::InvalidOptions("bitrate must be greater than zero".into()));
        }
        let scale = options.resolution.factor();
        let (width, height) = (scene.width * scale, scene.height * scale);
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidOptions(format!(
                "output size {width}x{height} is empty"
            )));
        }

        let mut warnings = Warnings::new();
        let negotiated = encoder::negotiate(options.format, &backends)?;
        if negotiated.fallback {
            warnings.push(format!(
                "No {} encoder is available; the video was exported as {}.",
                options.format, negotiated.mime_type
            ));
        }

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| ExportError::InvalidOptions(format!("cannot allocate a {width}x{height} frame")))?;

        let settings = EncoderSettings::new(width, height, scene.fps, &negotiated.mime_type)
            .with_bitrate(options.bitrate)
            .with_looping(options.looping);
        let mut sink = negotiated.backend.open(&settings).map_err(ExportError::Encoder)?;

        let mut renderer: Box<dyn FrameRenderer + 'a> = match renderer {
            Some(r) => r,
            None => match options.strategy {
                RenderStrategy::Markup => Box::new(MarkupRenderer::new()),
                RenderStrategy::Direct => Box::new(DirectRenderer),
            },
        };
        info!(renderer = renderer.name(), mime = %negotiated.mime_type, "starting video export");

        let timeline = Timeline::new(scene);
        let mut clips = open_clips(scene, &media_loader, &options, &mut warnings);
        if scene.elements.iter().all(|el| !el.visible) {
            warnings.push(EMPTY_EXPORT_WARNING);
        }
        if renderer.name() == "direct" && scene.elements.iter().any(|el| matches!(el.kind, ElementKind::Text(_))) {
            warnings.push("Text is not drawn by the direct renderer.");
        }

        let background = (!options.transparent_background).then_some(scene.background.as_str());
        let total = scene.total_frames;
        let frame_interval = Duration::from_millis((1000 / scene.fps as u64).max(1));

        for frame in 0..=total {
            if cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(frame, "video export cancelled");
                return Err(ExportError::Cancelled(frame));
            }

            let sample = timeline.sample(frame as f64);
            let ctx = RenderContext {
                sample: &sample,
                width: scene.width,
                height: scene.height,
                scale: scale as f32,
                background,
            };

            pixmap.fill(tiny_skia::Color::TRANSPARENT);
            let rendered = renderer
                .render(&ctx, &mut pixmap)
                .and_then(|_| composite_clips(&mut pixmap, &mut clips, &ctx, scene.fps));
            if let Err(e) = rendered {
                warn!(frame, error = %e, "frame failed to render; substituting background");
                warnings.push(format!("Some frames could not be rendered and were replaced by the background: {e}"));
                pixmap.fill(ctx.background_color());
            }

            sink.push_frame(&pixmap, FrameTime::from_frame(frame, scene.fps))
                .map_err(ExportError::Encoder)?;
            debug!(frame, "frame encoded");

            if let Some(callback) = progress.as_mut() {
                callback(Progress {
                    frame,
                    total_frames: total,
                    fraction: if total == 0 { 1.0 } else { frame as f64 / total as f64 },
                });
            }
            if options.pace_realtime {
                thread::sleep(frame_interval);
            }
        }

        let bytes = sink.finish().map_err(ExportError::Encoder)?;
        for clip in clips.iter().filter(|c| c.media.stalls() > 0) {
            warnings.push(format!(
                "Video \"{}\" did not seek in time on {} frame(s); the previous frame was repeated.",
                clip.label,
                clip.media.stalls()
            ));
        }
        drop(clips);
        info!(bytes = bytes.len(), frames = total + 1, warnings = warnings.len(), "video export finished");
        Ok(Exported::new(
            VideoArtifact {
                bytes,
                mime_type: negotiated.mime_type,
                frame_count: total + 1,
            },
            warnings,
        ))
    }
}

/// Exports with the built-in backends and the renderer selected by `options`.
pub fn export_video(scene: &Scene, options: &VideoExportOptions) -> Result<Exported<VideoArtifact>, ExportError> {
    VideoExporter::new(options.clone()).export(scene)
}

/// A video element with its open decoder.
struct Clip {
    element_id: String,
    label: String,
    props: VideoProps,
    media: MediaHandle,
}

fn open_clips(
    scene: &Scene,
    loader: &Arc<dyn MediaLoader>,
    options: &VideoExportOptions,
    warnings: &mut Warnings,
) -> Vec<Clip> {
    let timeout = Duration::from_millis(options.seek_timeout_ms);
    let mut clips = Vec::new();
    for el in &scene.elements {
        let ElementKind::Video(props) = &el.kind else {
            continue;
        };
        match MediaHandle::open(&el.name, loader.clone(), &props.source, timeout) {
            Ok(media) => clips.push(Clip {
                element_id: el.id.clone(),
                label: el.name.clone(),
                props: props.clone(),
                media,
            }),
            Err(e) => {
                warn!(element = %el.id, error = %e, "video source could not be opened");
                warnings.push(format!(
                    "Video \"{}\" could not be decoded and is exported as a placeholder.",
                    el.name
                ));
            }
        }
    }
    clips
}

/// Playback position of a clip at an output frame.
pub fn clip_time(props: &VideoProps, frame: u32, fps: u32) -> f64 {
    let t = props.trim_start + (frame as f64 / fps as f64) * props.playback_rate;
    if props.trim_end > props.trim_start {
        t.clamp(props.trim_start, props.trim_end)
    } else {
        t.max(props.trim_start)
    }
}

fn composite_clips(pixmap: &mut Pixmap, clips: &mut [Clip], ctx: &RenderContext, fps: u32) -> Result<(), RenderError> {
    let frame = ctx.sample.frame.round() as u32;
    for clip in clips.iter_mut() {
        let Some(el) = visible_clip_element(ctx.sample, &clip.element_id) else {
            continue;
        };
        let seconds = clip_time(&clip.props, frame, fps);
        if let Some(decoded) = clip.media.frame_at(seconds)? {
            draw_media(pixmap, decoded, el, clip.props.fit, ctx.scale)?;
        }
    }
    Ok(())
}

fn visible_clip_element<'s>(sample: &'s FrameSample, id: &str) -> Option<&'s Element> {
    sample.get(id).filter(|el| el.visible && el.opacity > 0.0)
}

/// Destination of a `src_w x src_h` image inside a box, honouring `fit`.
pub fn fit_rect(fit: ObjectFit, src_w: f64, src_h: f64, x: f64, y: f64, w: f64, h: f64) -> (f64, f64, f64, f64) {
    if src_w <= 0.0 || src_h <= 0.0 || w <= 0.0 || h <= 0.0 {
        return (x, y, w, h);
    }
    let src_aspect = src_w / src_h;
    let dst_aspect = w / h;
    match fit {
        ObjectFit::Fill => (x, y, w, h),
        ObjectFit::Contain if src_aspect > dst_aspect => {
            let rh = w / src_aspect;
            (x, y + (h - rh) / 2.0, w, rh)
        }
        ObjectFit::Contain => {
            let rw = h * src_aspect;
            (x + (w - rw) / 2.0, y, rw, h)
        }
        // Cover overflows the box; the caller clips to it.
        ObjectFit::Cover if src_aspect > dst_aspect => {
            let rw = h * src_aspect;
            (x + (w - rw) / 2.0, y, rw, h)
        }
        ObjectFit::Cover => {
            let rh = w / src_aspect;
            (x, y + (h - rh) / 2.0, w, rh)
        }
    }
}

fn draw_media(pixmap: &mut Pixmap, decoded: &RgbaFrame, el: &Element, fit: ObjectFit, scale: f32) -> Result<(), RenderError> {
    let source = premultiplied_pixmap(decoded)?;
    let (rx, ry, rw, rh) = fit_rect(
        fit,
        decoded.width as f64,
        decoded.height as f64,
        el.x,
        el.y,
        el.width,
        el.height,
    );

    // Clips rotate about the centre of their box.
    let (cx, cy) = ((el.x + el.width / 2.0) as f32, (el.y + el.height / 2.0) as f32);
    let placement = Transform::from_scale(scale, scale).pre_concat(Transform::from_rotate_at(el.rotation as f32, cx, cy));
    let transform = placement
        .pre_translate(rx as f32, ry as f32)
        .pre_scale((rw / decoded.width as f64) as f32, (rh / decoded.height as f64) as f32);

    let mask = match fit {
        ObjectFit::Cover => {
            let rect = Rect::from_xywh(el.x as f32, el.y as f32, el.width as f32, el.height as f32)
                .ok_or_else(|| RenderError::Media(format!("video \"{}\" has an empty box", el.name)))?;
            let mut mask = Mask::new(pixmap.width(), pixmap.height()).ok_or(RenderError::SurfaceFailure)?;
            mask.fill_path(&PathBuilder::from_rect(rect), tiny_skia::FillRule::Winding, true, placement);
            Some(mask)
        }
        _ => None,
    };

    let paint = PixmapPaint {
        opacity: el.opacity.clamp(0.0, 1.0) as f32,
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, mask.as_ref());
    Ok(())
}

fn premultiplied_pixmap(frame: &RgbaFrame) -> Result<Pixmap, RenderError> {
    let size = IntSize::from_wh(frame.width, frame.height)
        .ok_or_else(|| RenderError::Media(format!("decoded frame is {}x{}", frame.width, frame.height)))?;
    let mut data = frame.data.clone();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size).ok_or_else(|| RenderError::Media("decoded frame has the wrong length".into()))
}
