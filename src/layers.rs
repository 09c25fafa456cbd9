//! Compiles the overlay layer stack into a `-filter_complex` graph for
//! the final mux pass.
//!
//! The graph threads a video "frontier" label through the stack: canvas
//! normalization first, then each layer overlays onto the current
//! frontier and becomes the new one. Spectrograph layers tap the audio
//! input through one `asplit`; image layers that feed several effect
//! passes are fanned out with an explicit `split`, so every label keeps
//! a single consumer.

use anyhow::{bail, Result};

use crate::escape::{hex_to_rgb, parse_hex_color};
use crate::fonts::FontResolver;
use crate::graph::{FilterGraph, FilterOp, Label, ParamValue, Statement};
use crate::schema::{ImageLayer, LayerSpec, PathMode, SpectroMode, SpectrographLayer, TextLayer};

/// Build the mux-stage filter graph. `None` means the video passes
/// through untouched and the caller should map `0:v` directly.
pub fn compile_layers(
    layers: &[LayerSpec],
    has_audio: bool,
    canvas: Option<(u32, u32)>,
    fonts: &dyn FontResolver,
) -> Result<Option<(FilterGraph, Label)>> {
    let mut graph = FilterGraph::new();
    let mut frontier = graph.source("0:v");

    if let Some((width, height)) = canvas {
        let scaled = graph.fresh("v");
        graph.push(
            Statement::new()
                .input(frontier)
                .op(
                    FilterOp::new("scale")
                        .param("w", ParamValue::lit(width))
                        .param("h", ParamValue::lit(height))
                        .param("force_original_aspect_ratio", ParamValue::lit("decrease")),
                )
                .op(
                    FilterOp::new("pad")
                        .param("w", ParamValue::lit(width))
                        .param("h", ParamValue::lit(height))
                        .param("x", ParamValue::lit("(ow-iw)/2"))
                        .param("y", ParamValue::lit("(oh-ih)/2"))
                        .param("color", ParamValue::lit("black")),
                )
                .output(scaled.clone()),
        )?;
        frontier = scaled;
    }

    // Every spectrograph taps the audio input, so fan it out once.
    let spectrograph_count = layers
        .iter()
        .filter(|layer| matches!(layer, LayerSpec::Spectrograph(_)))
        .count();
    let mut audio_taps = Vec::new();
    if spectrograph_count > 0 && has_audio {
        let audio = graph.source("1:a");
        let mut split = Statement::new()
            .input(audio)
            .op(FilterOp::new("asplit").pos(ParamValue::lit(spectrograph_count)));
        for _ in 0..spectrograph_count {
            let tap = graph.fresh("as");
            split = split.output(tap.clone());
            audio_taps.push(tap);
        }
        graph.push(split)?;
    }
    let mut audio_taps = audio_taps.into_iter();

    for layer in layers {
        match layer {
            LayerSpec::Spectrograph(spec) => {
                if !has_audio {
                    continue;
                }
                let Some(tap) = audio_taps.next() else {
                    continue;
                };
                frontier = push_spectrograph(&mut graph, spec, tap, frontier)?;
            }
            LayerSpec::Image(image) => {
                if image.source_path().is_none() {
                    continue;
                }
                frontier = push_image(&mut graph, image, frontier)?;
            }
            LayerSpec::Text(text) => {
                frontier = push_text(&mut graph, text, frontier, fonts)?;
            }
        }
    }

    if graph.is_empty() {
        return Ok(None);
    }
    Ok(Some((graph, frontier)))
}

fn push_spectrograph(
    graph: &mut FilterGraph,
    spec: &SpectrographLayer,
    tap: Label,
    frontier: Label,
) -> Result<Label> {
    let width = spec.width();
    let height = spec.height();
    let base_width = spec.base_width();

    // Render at the point/bar count's native width, then nearest-neighbor
    // upscale so the discrete columns stay crisp.
    let mut chain = Statement::new().input(tap).op(match spec.mode {
        SpectroMode::Solid => FilterOp::new("showspectrum")
            .param("s", ParamValue::lit(format!("{base_width}x{height}")))
            .param("mode", ParamValue::lit("combined"))
            .param("color", ParamValue::lit("intensity"))
            .param("scale", ParamValue::lit("log"))
            .param("win_func", ParamValue::lit("hann")),
        mode => {
            let style = match mode {
                SpectroMode::Line => "line",
                SpectroMode::Dots => "dot",
                _ => "bar",
            };
            FilterOp::new("showfreqs")
                .param("mode", ParamValue::lit(style))
                .param("ascale", ParamValue::lit("log"))
                .param("win_size", ParamValue::lit(2048))
                .param("size", ParamValue::lit(format!("{base_width}x{height}")))
        }
    });
    if base_width != width {
        chain = chain.op(
            FilterOp::new("scale")
                .param("w", ParamValue::lit(width))
                .param("h", ParamValue::lit(height))
                .param("flags", ParamValue::lit("neighbor")),
        );
    }
    if spec.mode == SpectroMode::Bar {
        let bar_width = spec.bar_width_pct.unwrap_or(0.0);
        if bar_width > 0.0 && bar_width < 1.0 {
            let narrow = ((width as f64 * bar_width) as u32).max(1);
            chain = chain
                .op(
                    FilterOp::new("scale")
                        .param("w", ParamValue::lit(narrow))
                        .param("h", ParamValue::lit(height))
                        .param("flags", ParamValue::lit("neighbor")),
                )
                .op(
                    FilterOp::new("pad")
                        .param("w", ParamValue::lit(width))
                        .param("h", ParamValue::lit(height))
                        .param("x", ParamValue::lit("(ow-iw)/2"))
                        .param("y", ParamValue::lit(0))
                        .param("color", ParamValue::lit("black@0")),
                );
        }
    }
    if let Some(color) = spec.color.as_deref().filter(|c| !c.trim().is_empty()) {
        let (r, g, b) = parse_hex_color(color);
        chain = chain
            .op(FilterOp::new("format").pos(ParamValue::lit("gray")))
            .op(FilterOp::new("format").pos(ParamValue::lit("rgb24")))
            .op(
                FilterOp::new("lutrgb")
                    .param("r", ParamValue::Expr(format!("val*{r}/255")))
                    .param("g", ParamValue::Expr(format!("val*{g}/255")))
                    .param("b", ParamValue::Expr(format!("val*{b}/255"))),
            );
    }
    if spec.invert {
        chain = chain.op(FilterOp::new("vflip"));
    }
    let opacity = spec.opacity();
    if opacity < 1.0 {
        chain = chain
            .op(FilterOp::new("format").pos(ParamValue::lit("rgba")))
            .op(FilterOp::new("colorchannelmixer").param("aa", ParamValue::lit(opacity)));
    }
    if spec.path_mode == PathMode::Circular {
        // Polar remap: sample the flat spectro along the angle, pushing
        // frequency outward along the radius.
        let radius = "hypot(X-W/2,Y-H/2)";
        let angle = "(atan2(Y-H/2,X-W/2)+PI)/(2*PI)*W";
        let expr = format!("if(lte({radius},min(W,H)/2),p({angle},{radius}/(min(W,H)/2)*H),0)");
        chain = chain.op(
            FilterOp::new("geq")
                .param("r", ParamValue::Expr(expr.clone()))
                .param("g", ParamValue::Expr(expr.clone()))
                .param("b", ParamValue::Expr(expr)),
        );
    }

    let rendered = graph.fresh("spec");
    graph.push(chain.output(rendered.clone()))?;

    let (x, y) = spec.position();
    let composed = graph.fresh("v");
    graph.push(
        Statement::new()
            .input(frontier)
            .input(rendered)
            .op(
                FilterOp::new("overlay")
                    .param("x", ParamValue::lit(format!("W*{x}")))
                    .param("y", ParamValue::lit(format!("H*{y}")))
                    .param("format", ParamValue::lit("auto")),
            )
            .output(composed.clone()),
    )?;
    Ok(composed)
}

fn push_image(graph: &mut FilterGraph, image: &ImageLayer, frontier: Label) -> Result<Label> {
    let path = match image.source_path() {
        Some(path) => path.to_string_lossy().into_owned(),
        None => return Ok(frontier),
    };
    let (width, height) = image.size();
    let opacity = image.opacity();

    let mut chain = Statement::new()
        .op(
            FilterOp::new("movie")
                .pos(ParamValue::Path(path))
                .param("loop", ParamValue::lit(0)),
        )
        .op(
            FilterOp::new("scale")
                .param("w", ParamValue::lit(width))
                .param("h", ParamValue::lit(height))
                .param("flags", ParamValue::lit("lanczos")),
        )
        .op(FilterOp::new("format").pos(ParamValue::lit("rgba")));
    if let Some(rotate) = image.rotate.filter(|r| *r != 0.0) {
        chain = chain.op(
            FilterOp::new("rotate")
                .pos(ParamValue::lit(rotate.to_radians()))
                .param("fillcolor", ParamValue::lit("black@0")),
        );
    }
    if image.reverse {
        chain = chain.op(FilterOp::new("hflip"));
    }
    if image.invert {
        chain = chain.op(FilterOp::new("negate"));
    }
    if opacity < 1.0 {
        chain = chain.op(FilterOp::new("colorchannelmixer").param("aa", ParamValue::lit(opacity)));
    }

    let shadow = image.shadow_distance.unwrap_or(0);
    let glow = image.glow_amount.unwrap_or(0);
    let outline = image.outline_width.unwrap_or(0);
    let effect_count =
        usize::from(shadow > 0) + usize::from(glow > 0) + usize::from(outline > 0);

    // Each effect pass plus the final overlay needs its own copy of the
    // decoded image.
    let copies = effect_count + 1;
    let mut taps = Vec::with_capacity(copies);
    if copies > 1 {
        let base = graph.fresh("img");
        graph.push(chain.output(base.clone()))?;
        let mut split = Statement::new()
            .input(base)
            .op(FilterOp::new("split").pos(ParamValue::lit(copies)));
        for _ in 0..copies {
            let tap = graph.fresh("img");
            split = split.output(tap.clone());
            taps.push(tap);
        }
        graph.push(split)?;
    } else {
        let tap = graph.fresh("img");
        graph.push(chain.output(tap.clone()))?;
        taps.push(tap);
    }
    let mut taps = taps.into_iter();

    let (x, y) = image.position();
    let mut frontier = frontier;
    let overlay = |graph: &mut FilterGraph,
                       frontier: Label,
                       layer: Label,
                       x_off: i64,
                       y_off: i64|
     -> Result<Label> {
        let composed = graph.fresh("v");
        graph.push(
            Statement::new()
                .input(frontier)
                .input(layer)
                .op(
                    FilterOp::new("overlay")
                        .param("x", ParamValue::lit(offset_expr("W", x, x_off)))
                        .param("y", ParamValue::lit(offset_expr("H", y, y_off)))
                        .param("format", ParamValue::lit("auto"))
                        .param("repeatlast", ParamValue::lit(1)),
                )
                .output(composed.clone()),
        )?;
        Ok(composed)
    };

    // Effects underneath first: shadow, glow, outline, then the image.
    if shadow > 0 {
        let Some(tap) = taps.next() else {
            bail!("image fan-out ran out of copies");
        };
        let blurred = graph.fresh("sh");
        graph.push(
            Statement::new()
                .input(tap)
                .op(
                    FilterOp::new("boxblur")
                        .param("lr", ParamValue::lit((shadow / 2).max(1)))
                        .param("lp", ParamValue::lit(1)),
                )
                .op(FilterOp::new("colorchannelmixer").param("aa", ParamValue::lit(0.6)))
                .output(blurred.clone()),
        )?;
        frontier = overlay(graph, frontier, blurred, shadow as i64, shadow as i64)?;
    }
    if glow > 0 {
        let Some(tap) = taps.next() else {
            bail!("image fan-out ran out of copies");
        };
        let glow_opacity = image.glow_opacity.unwrap_or(0.4);
        let blurred = graph.fresh("gl");
        graph.push(
            Statement::new()
                .input(tap)
                .op(
                    FilterOp::new("boxblur")
                        .param("lr", ParamValue::lit((glow / 2).max(1)))
                        .param("lp", ParamValue::lit(1)),
                )
                .op(FilterOp::new("colorchannelmixer").param("aa", ParamValue::lit(glow_opacity)))
                .output(blurred.clone()),
        )?;
        frontier = overlay(graph, frontier, blurred, 0, 0)?;
    }
    if outline > 0 {
        let Some(tap) = taps.next() else {
            bail!("image fan-out ran out of copies");
        };
        let color = hex_to_rgb(image.outline_color.as_deref().unwrap_or("#000000"));
        let padded = graph.fresh("ol");
        graph.push(
            Statement::new()
                .input(tap)
                .op(
                    FilterOp::new("pad")
                        .param("w", ParamValue::lit(format!("iw+{}", outline * 2)))
                        .param("h", ParamValue::lit(format!("ih+{}", outline * 2)))
                        .param("x", ParamValue::lit(outline))
                        .param("y", ParamValue::lit(outline))
                        .param("color", ParamValue::lit(format!("{color}@1.0"))),
                )
                .output(padded.clone()),
        )?;
        frontier = overlay(graph, frontier, padded, -(outline as i64), -(outline as i64))?;
    }
    let Some(tap) = taps.next() else {
        bail!("image fan-out ran out of copies");
    };
    overlay(graph, frontier, tap, 0, 0)
}

fn push_text(
    graph: &mut FilterGraph,
    text: &TextLayer,
    frontier: Label,
    fonts: &dyn FontResolver,
) -> Result<Label> {
    let opacity = text.opacity();
    let color = hex_to_rgb(text.color.as_deref().unwrap_or("#ffffff"));
    let outline_color = hex_to_rgb(text.outline_color.as_deref().unwrap_or("#000000"));
    let shadow_color = hex_to_rgb(text.shadow_color.as_deref().unwrap_or("#000000"));
    let shadow_alpha = (opacity * 0.6).clamp(0.0, 1.0);
    let outline_width = text.outline_width.unwrap_or(0);
    let shadow_distance = text.shadow_distance.unwrap_or(0);
    let (x, y) = text.position();

    let mut op = FilterOp::new("drawtext")
        .param("text", ParamValue::Text(text.text().to_owned()))
        .param("fontcolor", ParamValue::lit(format!("{color}@{opacity:.3}")))
        .param("fontsize", ParamValue::lit(text.font_size()));
    op = match fonts.resolve(text.font()) {
        Some(file) => op.param(
            "fontfile",
            ParamValue::Path(file.to_string_lossy().into_owned()),
        ),
        None => op.param("font", ParamValue::Text(text.font().to_owned())),
    };
    op = op
        .param("x", ParamValue::lit(format!("W*{x}")))
        .param("y", ParamValue::lit(format!("H*{y}")))
        .param(
            "bordercolor",
            ParamValue::lit(format!("{outline_color}@{opacity:.3}")),
        )
        .param("borderw", ParamValue::lit(outline_width))
        .param(
            "shadowcolor",
            ParamValue::lit(format!("{shadow_color}@{shadow_alpha:.3}")),
        )
        .param("shadowx", ParamValue::lit(shadow_distance))
        .param("shadowy", ParamValue::lit(shadow_distance));

    let composed = graph.fresh("v");
    graph.push(
        Statement::new()
            .input(frontier)
            .op(op)
            .output(composed.clone()),
    )?;
    Ok(composed)
}

/// Overlay coordinate as a fraction of the frame plus a pixel offset.
fn offset_expr(dim: &str, fraction: f64, offset: i64) -> String {
    match offset {
        0 => format!("{dim}*{fraction}+0"),
        o if o > 0 => format!("{dim}*{fraction}+{o}"),
        o => format!("{dim}*{fraction}-{}", -o),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{compile_layers, offset_expr};
    use crate::fonts::FontResolver;
    use crate::schema::LayerSpec;

    struct NoFonts;

    impl FontResolver for NoFonts {
        fn resolve(&self, _family: &str) -> Option<PathBuf> {
            None
        }
    }

    struct OneFont(PathBuf);

    impl FontResolver for OneFont {
        fn resolve(&self, _family: &str) -> Option<PathBuf> {
            Some(self.0.clone())
        }
    }

    fn layers(json: &str) -> Vec<LayerSpec> {
        serde_json::from_str(json).expect("layers should parse")
    }

    #[test]
    fn no_layers_no_canvas_is_passthrough() {
        let compiled =
            compile_layers(&[], true, None, &NoFonts).expect("compile should succeed");
        assert!(compiled.is_none());
    }

    #[test]
    fn canvas_alone_produces_scale_and_pad() {
        let compiled = compile_layers(&[], false, Some((1280, 720)), &NoFonts)
            .expect("compile should succeed")
            .expect("canvas forces a graph");
        let (graph, label) = compiled;
        let rendered = graph.render();
        assert_eq!(
            rendered,
            "[0:v]scale=w=1280:h=720:force_original_aspect_ratio=decrease,\
             pad=w=1280:h=720:x=(ow-iw)/2:y=(oh-ih)/2:color=black[v0]"
        );
        assert_eq!(label.name(), "v0");
    }

    #[test]
    fn spectrographs_are_dropped_without_audio() {
        let stack = layers(r#"[{ "type": "spectrograph" }, { "type": "spectrograph" }]"#);
        let compiled =
            compile_layers(&stack, false, None, &NoFonts).expect("compile should succeed");
        assert!(compiled.is_none(), "no audio means nothing to draw");
    }

    #[test]
    fn audio_split_arity_matches_spectrograph_count() {
        let stack = layers(
            r#"[{ "type": "spectrograph" }, { "type": "text", "text": "hi" }, { "type": "spectrograph", "mode": "line" }]"#,
        );
        let (graph, _) = compile_layers(&stack, true, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(rendered.contains("[1:a]asplit=2[as0][as1]"));
        assert!(rendered.contains("showfreqs=mode=bar"));
        assert!(rendered.contains("showfreqs=mode=line"));
    }

    #[test]
    fn final_label_is_unconsumed() {
        let stack = layers(
            r#"[{ "type": "spectrograph" }, { "type": "image", "imagePath": "logo.png" }]"#,
        );
        let (graph, label) = compile_layers(&stack, true, Some((1920, 1080)), &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        assert!(!graph.is_consumed(&label));
    }

    #[test]
    fn bar_narrowing_rescales_then_pads() {
        let stack = layers(
            r#"[{ "type": "spectrograph", "width": 400, "height": 100, "barWidthPct": 0.5 }]"#,
        );
        let (graph, _) = compile_layers(&stack, true, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(rendered.contains("scale=w=200:h=100:flags=neighbor"));
        assert!(rendered.contains("pad=w=400:h=100:x=(ow-iw)/2:y=0:color=black@0"));
    }

    #[test]
    fn circular_spectrograph_escapes_the_remap_expression() {
        let stack = layers(r#"[{ "type": "spectrograph", "pathMode": "circular" }]"#);
        let (graph, _) = compile_layers(&stack, true, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(rendered.contains("geq=r='"));
        // Commas inside the expression are escaped so they cannot split
        // the filter chain.
        assert!(rendered.contains(r"hypot(X-W/2\,Y-H/2)"));
    }

    #[test]
    fn pathless_image_layers_are_skipped() {
        let stack = layers(r#"[{ "type": "image" }]"#);
        let compiled =
            compile_layers(&stack, false, None, &NoFonts).expect("compile should succeed");
        assert!(compiled.is_none());
    }

    #[test]
    fn empty_image_path_is_skipped() {
        let stack = layers(r#"[{ "type": "image", "imagePath": "" }, { "type": "image", "imagePath": "   " }]"#);
        let compiled =
            compile_layers(&stack, false, None, &NoFonts).expect("compile should succeed");
        assert!(compiled.is_none(), "blank paths must not reach the graph");
    }

    #[test]
    fn image_effects_fan_out_with_split() {
        let stack = layers(
            r##"[{ "type": "image", "imagePath": "logo.png", "shadowDistance": 6, "outlineWidth": 2, "outlineColor": "#ff0000" }]"##,
        );
        let (graph, _) = compile_layers(&stack, false, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        // Shadow + outline + final overlay = three consumers.
        assert!(rendered.contains("split=3"));
        assert!(rendered.contains("boxblur=lr=3:lp=1,colorchannelmixer=aa=0.6"));
        assert!(rendered.contains("pad=w=iw+4:h=ih+4:x=2:y=2:color=0xFF0000@1.0"));
        assert!(rendered.contains("overlay=x=W*0+6:y=H*0+6"));
        assert!(rendered.contains("overlay=x=W*0-2:y=H*0-2"));
        assert!(rendered.contains("repeatlast=1"));
    }

    #[test]
    fn plain_image_needs_no_split() {
        let stack = layers(r#"[{ "type": "image", "imagePath": "logo.png", "opacity": 0.5 }]"#);
        let (graph, _) = compile_layers(&stack, false, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(!rendered.contains("split="));
        assert!(rendered.contains("movie='logo.png':loop=0"));
        assert!(rendered.contains("colorchannelmixer=aa=0.5"));
    }

    #[test]
    fn text_uses_fontfile_when_resolved() {
        let stack = layers(r#"[{ "type": "text", "text": "Hello", "font": "Inter" }]"#);
        let resolver = OneFont(PathBuf::from("/fonts/Inter.ttf"));
        let (graph, _) = compile_layers(&stack, false, None, &resolver)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(rendered.contains("fontfile='/fonts/Inter.ttf'"));
        assert!(!rendered.contains("font='Inter'"));
    }

    #[test]
    fn text_falls_back_to_family_name() {
        let stack = layers(
            r##"[{ "type": "text", "text": "It's done", "color": "#0f0", "opacity": 0.8 }]"##,
        );
        let (graph, _) = compile_layers(&stack, false, None, &NoFonts)
            .expect("compile should succeed")
            .expect("layers force a graph");
        let rendered = graph.render();
        assert!(rendered.contains(r"text='It\'s done'"));
        assert!(rendered.contains("fontcolor=0x00FF00@0.800"));
        assert!(rendered.contains("font='Segoe UI'"));
    }

    #[test]
    fn offset_expr_formats_signed_offsets() {
        assert_eq!(offset_expr("W", 0.25, 0), "W*0.25+0");
        assert_eq!(offset_expr("H", 0.0, 8), "H*0+8");
        assert_eq!(offset_expr("W", 0.5, -3), "W*0.5-3");
    }
}
