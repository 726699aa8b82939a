//! Container/codec negotiation and the encoder backends frames are streamed to.
//!
//! A backend answers whether it can produce a given MIME type and opens a
//! [`FrameSink`] for it. Negotiation walks the ordered candidate list of the
//! requested format and falls back to [`DEFAULT_CONTAINER`]; it always runs
//! before any frame is rendered.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::Pixmap;
use tracing::{debug, info};

use crate::errors::ExportError;

/// Container used when none of the requested format's candidates is available.
pub const DEFAULT_CONTAINER: &str = "image/gif";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    #[default]
    Webm,
    Gif,
}

impl VideoFormat {
    /// Preferred MIME types, best first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            VideoFormat::Mp4 => &["video/mp4; codecs=avc1.42E01E", "video/mp4"],
            VideoFormat::Webm => &["video/webm; codecs=vp9", "video/webm; codecs=vp8", "video/webm"],
            VideoFormat::Gif => &["image/gif"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration handed to a backend when the stream is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bits per second. Ignored by palette formats.
    pub bitrate: u64,
    /// The negotiated MIME type.
    pub mime_type: String,
    pub looping: bool,
}

impl EncoderSettings {
    pub fn new(width: u32, height: u32, fps: u32, mime_type: &str) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate: 8_000_000,
            mime_type: mime_type.to_string(),
            looping: true,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

/// Presentation time of one output frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub index: u32,
    pub seconds: f64,
}

impl FrameTime {
    pub fn from_frame(index: u32, fps: u32) -> Self {
        Self {
            index,
            seconds: index as f64 / fps.max(1) as f64,
        }
    }
}

/// An open encoded stream. Frames arrive in strictly increasing order.
pub trait FrameSink {
    fn push_frame(&mut self, pixmap: &Pixmap, time: FrameTime) -> Result<()>;

    /// Flushes the stream and returns the finished artifact.
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can produce `mime_type` in the current process.
    fn supports(&self, mime_type: &str) -> bool;

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameSink>>;
}

/// Outcome of [`negotiate`]: the chosen MIME type and the backend producing it.
pub struct Negotiated<'a> {
    pub mime_type: String,
    pub backend: &'a dyn EncoderBackend,
    /// Whether the default container stood in for the requested format.
    pub fallback: bool,
}

impl fmt::Debug for Negotiated<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("mime_type", &self.mime_type)
            .field("backend", &self.backend.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Picks the first candidate of `format` some backend supports, else the
/// default container, else fails.
pub fn negotiate<'a>(
    format: VideoFormat,
    backends: &'a [Box<dyn EncoderBackend>],
) -> Result<Negotiated<'a>, ExportError> {
    let find = |mime: &str| backends.iter().find(|b| b.supports(mime)).map(|b| b.as_ref());

    for mime in format.candidates() {
        if let Some(backend) = find(mime) {
            info!(mime, backend = backend.name(), "negotiated container");
            return Ok(Negotiated {
                mime_type: mime.to_string(),
                backend,
                fallback: false,
            });
        }
        debug!(mime, "container not supported");
    }

    if let Some(backend) = find(DEFAULT_CONTAINER) {
        info!(requested = %format, mime = DEFAULT_CONTAINER, "falling back to default container");
        return Ok(Negotiated {
            mime_type: DEFAULT_CONTAINER.to_string(),
            backend,
            fallback: true,
        });
    }

    let mut tried: Vec<&str> = format.candidates().to_vec();
    if !tried.contains(&DEFAULT_CONTAINER) {
        tried.push(DEFAULT_CONTAINER);
    }
    Err(ExportError::CodecUnavailable {
        format: format.to_string(),
        tried: tried.join(", "),
    })
}

/// The backends compiled into this build, in preference order.
pub fn default_backends() -> Vec<Box<dyn EncoderBackend>> {
    #[allow(unused_mut)]
    let mut backends: Vec<Box<dyn EncoderBackend>> = Vec::new();
    #[cfg(feature = "video-rs")]
    backends.push(Box::new(ffmpeg::FfmpegBackend));
    backends.push(Box::new(GifBackend::default()));
    backends
}

/// Straight-alpha RGBA bytes of a premultiplied pixmap.
pub(crate) fn demultiplied_rgba(pixmap: &Pixmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

/// Animated GIF through the `image` crate. Always available.
#[derive(Debug, Clone)]
pub struct GifBackend {
    /// Quantizer speed, `1` (best) to `30` (fastest).
    pub speed: i32,
}

impl Default for GifBackend {
    fn default() -> Self {
        Self { speed: 10 }
    }
}

impl EncoderBackend for GifBackend {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "image/gif"
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameSink>> {
        if settings.width > u16::MAX as u32 || settings.height > u16::MAX as u32 {
            return Err(anyhow!(
                "GIF frames are limited to {0}x{0} pixels, got {1}x{2}",
                u16::MAX,
                settings.width,
                settings.height
            ));
        }
        // Frames stream to a scratch file; the second handle reads the result back.
        let file = tempfile::tempfile().context("creating GIF scratch file")?;
        let readback = file.try_clone()?;
        let mut encoder = GifEncoder::new_with_speed(file, self.speed.clamp(1, 30));
        encoder.set_repeat(if settings.looping {
            Repeat::Infinite
        } else {
            Repeat::Finite(0)
        })?;
        Ok(Box::new(GifSink {
            encoder,
            readback,
            delay: Delay::from_numer_denom_ms(1000, settings.fps.max(1)),
            width: settings.width,
            height: settings.height,
        }))
    }
}

struct GifSink {
    encoder: GifEncoder<File>,
    readback: File,
    delay: Delay,
    width: u32,
    height: u32,
}

impl FrameSink for GifSink {
    fn push_frame(&mut self, pixmap: &Pixmap, time: FrameTime) -> Result<()> {
        let buffer = RgbaImage::from_raw(self.width, self.height, demultiplied_rgba(pixmap))
            .ok_or_else(|| anyhow!("frame {} does not match the {}x{} stream", time.index, self.width, self.height))?;
        self.encoder
            .encode_frame(Frame::from_parts(buffer, 0, 0, self.delay))
            .with_context(|| format!("encoding GIF frame {}", time.index))
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>> {
        let GifSink {
            encoder,
            mut readback,
            ..
        } = *self;
        // The trailer is written when the encoder goes away.
        drop(encoder);
        readback.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        readback.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(feature = "video-rs")]
pub use self::ffmpeg::FfmpegBackend;

#[cfg(feature = "video-rs")]
mod ffmpeg {
    use super::*;
    use video_rs::ffmpeg::{self as av, codec, format, software};

    /// H.264 / VP9 / VP8 through the ffmpeg libraries bundled with `video-rs`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FfmpegBackend;

    impl FfmpegBackend {
        fn codec_for(mime_type: &str) -> Option<(codec::Id, &'static str)> {
            match mime_type {
                "video/mp4; codecs=avc1.42E01E" | "video/mp4" => Some((codec::Id::H264, ".mp4")),
                "video/webm; codecs=vp9" | "video/webm" => Some((codec::Id::VP9, ".webm")),
                "video/webm; codecs=vp8" => Some((codec::Id::VP8, ".webm")),
                _ => None,
            }
        }
    }

    impl EncoderBackend for FfmpegBackend {
        fn name(&self) -> &'static str {
            "ffmpeg"
        }

        fn supports(&self, mime_type: &str) -> bool {
            if av::init().is_err() {
                return false;
            }
            Self::codec_for(mime_type).is_some_and(|(id, _)| codec::encoder::find(id).is_some())
        }

        fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn FrameSink>> {
            Ok(Box::new(FfmpegSink::new(settings)?))
        }
    }

    const TIME_BASE: i32 = 90_000;

    struct FfmpegSink {
        output: format::context::Output,
        path: tempfile::TempPath,
        video_idx: usize,
        encoder: codec::encoder::video::Encoder,
        scaler: software::scaling::Context,
        rgba_frame: av::util::frame::Video,
        yuv_frame: av::util::frame::Video,
    }

    impl FfmpegSink {
        fn new(settings: &EncoderSettings) -> Result<Self> {
            av::init()?;
            let (codec_id, suffix) = FfmpegBackend::codec_for(&settings.mime_type)
                .ok_or_else(|| anyhow!("unsupported MIME type {}", settings.mime_type))?;
            let path = tempfile::Builder::new()
                .suffix(suffix)
                .tempfile()
                .context("creating video scratch file")?
                .into_temp_path();

            let mut output = format::output(&path)?;
            let global_header = output.format().flags().contains(format::flag::Flags::GLOBAL_HEADER);

            let found = codec::encoder::find(codec_id).ok_or_else(|| anyhow!("{codec_id:?} encoder not found"))?;
            info!(codec = ?codec_id, "opening ffmpeg encoder");

            let mut encoder = codec::context::Context::new_with_codec(found).encoder().video()?;
            encoder.set_width(settings.width);
            encoder.set_height(settings.height);
            encoder.set_format(format::Pixel::YUV420P);
            encoder.set_time_base((1, TIME_BASE));
            encoder.set_frame_rate(Some((settings.fps as i32, 1)));
            encoder.set_bit_rate(settings.bitrate as usize);
            if global_header {
                encoder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
            }

            let encoder = encoder.open_as(found)?;
            let mut stream = output.add_stream(found)?;
            stream.set_parameters(&encoder);
            let video_idx = stream.index();

            let scaler = software::scaling::Context::get(
                format::Pixel::RGBA,
                settings.width,
                settings.height,
                format::Pixel::YUV420P,
                settings.width,
                settings.height,
                software::scaling::flag::Flags::BILINEAR,
            )?;

            output.write_header()?;

            Ok(Self {
                output,
                path,
                video_idx,
                encoder,
                scaler,
                rgba_frame: av::util::frame::Video::new(format::Pixel::RGBA, settings.width, settings.height),
                yuv_frame: av::util::frame::Video::new(format::Pixel::YUV420P, settings.width, settings.height),
            })
        }

        fn write_packets(&mut self) -> Result<()> {
            let stream_tb = self
                .output
                .stream(self.video_idx)
                .ok_or_else(|| anyhow!("output stream {} missing", self.video_idx))?
                .time_base();
            let mut packet = codec::packet::Packet::empty();
            while self.encoder.receive_packet(&mut packet).is_ok() {
                packet.set_stream(self.video_idx);
                packet.rescale_ts((1, TIME_BASE), stream_tb);
                packet.write_interleaved(&mut self.output)?;
            }
            Ok(())
        }
    }

    impl FrameSink for FfmpegSink {
        fn push_frame(&mut self, pixmap: &Pixmap, time: FrameTime) -> Result<()> {
            let width_bytes = pixmap.width() as usize * 4;
            let src = demultiplied_rgba(pixmap);
            let stride = self.rgba_frame.stride(0);
            let dest = self.rgba_frame.data_mut(0);
            for (y, row) in src.chunks_exact(width_bytes).enumerate() {
                dest[y * stride..y * stride + width_bytes].copy_from_slice(row);
            }

            self.scaler.run(&self.rgba_frame, &mut self.yuv_frame)?;
            self.yuv_frame.set_pts(Some((time.seconds * TIME_BASE as f64).round() as i64));
            self.encoder.send_frame(&self.yuv_frame)?;
            self.write_packets()
        }

        fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
            self.encoder.send_eof()?;
            self.write_packets()?;
            self.output.write_trailer()?;
            let FfmpegSink { output, path, .. } = *self;
            drop(output);
            Ok(std::fs::read(&path)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(&'static str);

    impl EncoderBackend for Only {
        fn name(&self) -> &'static str {
            "only"
        }

        fn supports(&self, mime_type: &str) -> bool {
            mime_type == self.0
        }

        fn open(&self, _settings: &EncoderSettings) -> Result<Box<dyn FrameSink>> {
            Err(anyhow!("not used"))
        }
    }

    #[test]
    fn first_supported_candidate_wins() {
        let backends: Vec<Box<dyn EncoderBackend>> = vec![Box::new(Only("video/webm; codecs=vp8"))];
        let negotiated = negotiate(VideoFormat::Webm, &backends).unwrap();
        assert_eq!(negotiated.mime_type, "video/webm; codecs=vp8");
        assert!(!negotiated.fallback);
    }

    #[test]
    fn unsupported_format_falls_back_to_gif() {
        let backends: Vec<Box<dyn EncoderBackend>> = vec![Box::new(GifBackend::default())];
        let negotiated = negotiate(VideoFormat::Mp4, &backends).unwrap();
        assert_eq!(negotiated.mime_type, DEFAULT_CONTAINER);
        assert_eq!(negotiated.backend.name(), "gif");
        assert!(negotiated.fallback);
    }

    #[test]
    fn no_backend_is_an_error() {
        let backends: Vec<Box<dyn EncoderBackend>> = Vec::new();
        match negotiate(VideoFormat::Mp4, &backends) {
            Err(ExportError::CodecUnavailable { format, tried }) => {
                assert_eq!(format, "mp4");
                assert_eq!(tried, "video/mp4; codecs=avc1.42E01E, video/mp4, image/gif");
            }
            other => panic!("expected CodecUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn gif_sink_produces_a_gif() {
        let settings = EncoderSettings::new(4, 4, 10, DEFAULT_CONTAINER);
        let mut sink = GifBackend::default().open(&settings).unwrap();
        let mut pixmap = Pixmap::new(4, 4).unwrap();
        for i in 0..3 {
            pixmap.fill(tiny_skia::Color::from_rgba8(255, 0, 0, 255));
            sink.push_frame(&pixmap, FrameTime::from_frame(i, 10)).unwrap();
        }
        let bytes = sink.finish().unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
    }
}
