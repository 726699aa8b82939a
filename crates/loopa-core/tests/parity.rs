//! The evaluator, the Lottie document and the SVG directives must agree on
//! every keyframe time.

use std::sync::{Arc, Mutex};

use loopa_core::easing::{Easing, HandleTable};
use loopa_core::export::encoder::{EncoderBackend, EncoderSettings, FrameSink, FrameTime, VideoFormat};
use loopa_core::export::lottie::{build_document, LottieExportOptions};
use loopa_core::export::svg::{build_directives, export_svg, DirectiveKind, SvgExportOptions};
use loopa_core::export::video::{VideoExportOptions, VideoExporter};
use loopa_core::markup::serialize_frame;
use loopa_core::model::{Element, ElementKind, Keyframe, RectProps, Scene};
use loopa_core::raster::MarkupRenderer;
use loopa_core::{evaluate, AnimProp, PropertyPatch, Timeline, Warnings};
use tiny_skia::{Pixmap, Transform};

fn scene() -> Scene {
    let moving = Element::new("box", ElementKind::Rect(RectProps::default()), 0.0, 0.0, 100.0, 50.0)
        .with_fill("3366FF");
    let still = Element::new("still", ElementKind::Circle, 300.0, 20.0, 40.0, 40.0).with_fill("00FF00");
    Scene::new(400, 200, 30, 60)
        .with_element(moving)
        .with_element(still)
        .with_keyframe(
            Keyframe::new(
                "box",
                0,
                PropertyPatch::new().with(AnimProp::X, 0.0).with(AnimProp::Opacity, 1.0),
            )
            .with_easing(Easing::parse("ease-out")),
        )
        .with_keyframe(Keyframe::new(
            "box",
            30,
            PropertyPatch::new().with(AnimProp::X, 200.0).with(AnimProp::Opacity, 0.5),
        ))
}

#[test]
fn keyframe_values_agree_across_exporters() {
    let scene = scene();
    let timeline = Timeline::new(&scene);
    let el = &scene.elements[0];
    let doc = build_document(&scene, &LottieExportOptions::default(), &mut Warnings::new()).unwrap();
    // Layers are stored top-most first; "box" was added first, so it is last.
    let layer = doc.layers.iter().find(|l| l.nm.as_deref() == Some("box")).unwrap();
    let position = layer.ks.p.keyframes();
    let opacity = layer.ks.o.keyframes();
    let directives = build_directives(&timeline, el, &SvgExportOptions::default());
    let svg_x = directives.iter().find(|d| d.kind == DirectiveKind::Animate("x")).unwrap();
    let svg_opacity = directives
        .iter()
        .find(|d| d.kind == DirectiveKind::Animate("opacity"))
        .unwrap();

    let frames = [0u32, 30, 60];
    assert_eq!(position.iter().map(|k| k.t).collect::<Vec<_>>(), vec![0.0, 30.0, 60.0]);
    assert_eq!(svg_x.key_times, vec![0.0, 0.5, 1.0]);

    for (i, frame) in frames.iter().enumerate() {
        let patch = evaluate(&scene.keyframes, *frame as f64);
        let x = patch.number(AnimProp::X).unwrap();
        let alpha = patch.number(AnimProp::Opacity).unwrap();

        // Lottie positions the layer by its pivot, the box centre by default.
        assert_eq!(position[i].s[0], x + 50.0, "lottie position at frame {frame}");
        assert_eq!(opacity[i].s, alpha * 100.0, "lottie opacity at frame {frame}");
        assert_eq!(svg_x.values[i].parse::<f64>().unwrap(), x, "svg x at frame {frame}");
        assert_eq!(
            svg_opacity.values[i].parse::<f64>().unwrap(),
            alpha,
            "svg opacity at frame {frame}"
        );
        assert_eq!(timeline.resolve(el, *frame as f64).x, x);
    }
}

#[test]
fn easing_handles_agree_across_exporters() {
    let scene = scene();
    let timeline = Timeline::new(&scene);
    let expected = HandleTable::standard().handles(&Easing::parse("ease-out"));

    let doc = build_document(&scene, &LottieExportOptions::default(), &mut Warnings::new()).unwrap();
    let layer = doc.layers.iter().find(|l| l.nm.as_deref() == Some("box")).unwrap();
    let first = &layer.ks.p.keyframes()[0];
    let (o, i) = (first.o.as_ref().unwrap(), first.i.as_ref().unwrap());
    assert_eq!([o.x[0], o.y[0], i.x[0], i.y[0]], expected);

    let directives = build_directives(&timeline, &scene.elements[0], &SvgExportOptions::default());
    assert!(directives.iter().all(|d| d.splines[0] == expected));
}

#[test]
fn midpoint_follows_the_easing_curve() {
    let scene = scene();
    let x = evaluate(&scene.keyframes, 15.0).number(AnimProp::X).unwrap();
    let expected = 200.0 * Easing::parse("ease-out").apply(0.5);
    assert!((x - expected).abs() < 1e-9);
    // ease-out is ahead of linear at the halfway point.
    assert!(x > 100.0);
}

#[test]
fn unkeyed_elements_are_static_everywhere() {
    let scene = scene();
    let timeline = Timeline::new(&scene);
    let still = &scene.elements[1];

    assert!(evaluate::<Keyframe>(&[], 12.0).is_empty());
    assert!(build_directives(&timeline, still, &SvgExportOptions::default()).is_empty());
    assert_eq!(timeline.resolve(still, 45.0), *still);

    let doc = build_document(&scene, &LottieExportOptions::default(), &mut Warnings::new()).unwrap();
    let layer = doc.layers.iter().find(|l| l.nm.as_deref() == Some("still")).unwrap();
    assert_eq!(layer.ks.p.static_value(), Some(&vec![320.0, 40.0, 0.0]));
    assert_eq!(layer.ks.o.static_value(), Some(&100.0));

    let svg = export_svg(&scene, &SvgExportOptions::default()).unwrap().artifact;
    assert_eq!(svg.matches("<animate").count(), 2);
}

/// Keeps the premultiplied pixels of frame 0.
struct FirstFrame(Arc<Mutex<Option<Vec<u8>>>>);

impl EncoderBackend for FirstFrame {
    fn name(&self) -> &'static str {
        "first-frame"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "image/gif"
    }

    fn open(&self, _settings: &EncoderSettings) -> anyhow::Result<Box<dyn FrameSink>> {
        Ok(Box::new(FirstFrame(self.0.clone())))
    }
}

impl FrameSink for FirstFrame {
    fn push_frame(&mut self, pixmap: &Pixmap, time: FrameTime) -> anyhow::Result<()> {
        if time.index == 0 {
            *self.0.lock().unwrap() = Some(pixmap.data().to_vec());
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[test]
fn unkeyed_scene_rasterizes_like_its_markup() {
    let mut scene = scene();
    scene.keyframes.clear();
    scene.total_frames = 2;

    let captured = Arc::new(Mutex::new(None));
    VideoExporter::new(VideoExportOptions::new(VideoFormat::Gif))
        .with_backends(vec![Box::new(FirstFrame(captured.clone()))])
        .with_renderer(MarkupRenderer::with_options(usvg::Options::default()))
        .export(&scene)
        .unwrap();
    let video = captured.lock().unwrap().take().unwrap();

    let sample = Timeline::new(&scene).sample(0.0);
    let svg = serialize_frame(&sample, scene.width, scene.height, Some(&scene.background));
    let tree = usvg::Tree::from_str(&svg, &usvg::Options::default()).unwrap();
    let mut expected = Pixmap::new(scene.width, scene.height).unwrap();
    resvg::render(&tree, Transform::identity(), &mut expected.as_mut());

    assert_eq!(video.len(), expected.data().len());
    assert!(video == expected.data(), "video frame 0 differs from the rasterized markup");

    // The box interior carries its static fill, as in the Lottie and SVG output.
    let px = expected.pixel(50, 25).unwrap().demultiply();
    assert_eq!([px.red(), px.green(), px.blue()], [0x33, 0x66, 0xFF]);
}
