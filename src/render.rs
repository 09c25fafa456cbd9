//! The render pipeline: intermediates, concat, mux.
//!
//! Every timeline item is first encoded to its own normalized H.264
//! intermediate inside the work directory. Stage one stitches the
//! intermediates with the concat demuxer; stage two composites the layer
//! stack and muxes audio into the final output. When nothing needs
//! compositing the concat result is simply moved into place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::engine::{aac_audio_args, h264_output_args, progress_args, EngineSink};
use crate::error_codes::CodedError;
use crate::fonts::FontResolver;
use crate::layers::compile_layers;
use crate::project::LoadedProject;
use crate::schema::{ClipSpec, FALLBACK_CANVAS};
use crate::segment::{plan_clip_render, plan_gap_render, RenderPlan};
use crate::timeline::{estimate_total_ms, resolve_timeline, DurationProbe, TimelineItem};

/// Directory holding intermediates and scratch files, created next to
/// the project JSON.
pub const WORK_DIR_NAME: &str = ".vizmatic";

pub fn render_project<E>(
    loaded: &LoadedProject,
    engine: &mut E,
    fonts: &dyn FontResolver,
) -> Result<()>
where
    E: EngineSink + DurationProbe,
{
    let clips = loaded.renderable_clips();
    print_summary(loaded, &clips);

    let total_ms = estimate_total_ms(&clips, engine);
    if total_ms > 0 {
        println!("total_duration_ms={total_ms}");
    }

    let work_dir = loaded
        .path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(WORK_DIR_NAME);
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("failed to create work dir {}", work_dir.display()))?;

    let items = resolve_timeline(&clips, engine);
    // The explicit canvas drives layer compositing; gaps always need a
    // concrete size, so they fall back to a default.
    let canvas = loaded.project.canvas();
    let gap_canvas = canvas.unwrap_or(FALLBACK_CANVAS);

    let mut intermediates = Vec::with_capacity(items.len());
    let mut clip_index = 0usize;
    for (index, item) in items.iter().enumerate() {
        println!(
            "[vizmatic] item {index}: start={:.3}s duration={:.3}s",
            item.start(),
            item.duration()
        );
        let plan = match item {
            TimelineItem::Clip(job) => {
                let plan = plan_clip_render(&work_dir, job, clip_index)?;
                clip_index += 1;
                plan
            }
            TimelineItem::Gap { duration, .. } => plan_gap_render(&work_dir, *duration, gap_canvas),
        };
        run_plan(engine, &plan)?;
        intermediates.push(plan.output);
    }

    let concat_video = concat_intermediates(engine, &work_dir, &intermediates)?;

    let has_audio = loaded.project.audio_path().is_some();
    if has_audio || !loaded.project.layers.is_empty() || canvas.is_some() {
        mux_final(engine, loaded, &concat_video, gap_canvas, fonts)?;
    } else {
        move_into_place(&concat_video, &loaded.output)?;
    }

    println!("[vizmatic] render complete: {}", loaded.output.display());
    Ok(())
}

fn print_summary(loaded: &LoadedProject, clips: &[ClipSpec]) {
    println!("[vizmatic] loaded project");
    println!(
        "  audio: {}",
        loaded
            .project
            .audio_path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_owned())
    );
    println!("  clips: {}", clips.len());
    for (index, clip) in clips.iter().enumerate() {
        if let Some(path) = clip.path.as_ref() {
            println!("    - index={index} path={}", path.display());
        }
    }
    println!("  output: {}", loaded.output.display());
    println!("  layers: {}", loaded.project.layers.len());
}

fn run_plan<E: EngineSink>(engine: &mut E, plan: &RenderPlan) -> Result<()> {
    for invocation in &plan.invocations {
        let code = engine.invoke(invocation)?;
        if code != 0 {
            return Err(CodedError::stage(
                1,
                code,
                format!(
                    "rendering intermediate {} failed with code {code}",
                    plan.output.display()
                ),
            )
            .into());
        }
    }
    Ok(())
}

/// Stage one: stitch the intermediates with the concat demuxer into a
/// single video-only file.
fn concat_intermediates<E: EngineSink>(
    engine: &mut E,
    work_dir: &Path,
    intermediates: &[PathBuf],
) -> Result<PathBuf> {
    let list_path = work_dir.join("concat.txt");
    let out_path = work_dir.join("concat_video.mp4");
    write_concat_list(&list_path, intermediates)?;

    let mut args = progress_args();
    args.extend(
        ["-safe", "0", "-f", "concat", "-i"]
            .into_iter()
            .map(str::to_owned),
    );
    args.push(list_path.to_string_lossy().into_owned());
    args.push("-an".to_owned());
    args.extend(h264_output_args());
    args.push(out_path.to_string_lossy().into_owned());

    let code = engine.invoke(&args)?;
    if code != 0 {
        return Err(CodedError::stage(1, code, format!("concat stage failed with code {code}")).into());
    }
    Ok(out_path)
}

/// The concat demuxer wants one `file '<path>'` line per entry; single
/// quotes inside the path close and reopen the quoting.
fn write_concat_list(list_path: &Path, entries: &[PathBuf]) -> Result<()> {
    let mut file = fs::File::create(list_path)
        .with_context(|| format!("failed to create {}", list_path.display()))?;
    for entry in entries {
        let quoted = entry.to_string_lossy().replace('\'', "'\\''");
        writeln!(file, "file '{quoted}'")
            .with_context(|| format!("failed writing {}", list_path.display()))?;
    }
    Ok(())
}

/// Stage two: composite the layer stack over the concatenated video and
/// mux the audio track in. The canvas here is always concrete: the
/// fallback applies when the project sets none, so every muxed frame is
/// normalized to one size.
fn mux_final<E: EngineSink>(
    engine: &mut E,
    loaded: &LoadedProject,
    concat_video: &Path,
    canvas: (u32, u32),
    fonts: &dyn FontResolver,
) -> Result<()> {
    let audio = loaded.project.audio_path();
    let compiled = compile_layers(&loaded.project.layers, audio.is_some(), Some(canvas), fonts)?;

    let mut args = progress_args();
    args.push("-i".to_owned());
    args.push(concat_video.to_string_lossy().into_owned());
    if let Some(audio) = audio {
        args.push("-i".to_owned());
        args.push(audio.to_string_lossy().into_owned());
    }

    match compiled {
        Some((graph, label)) => {
            args.push("-filter_complex".to_owned());
            args.push(graph.render());
            args.push("-map".to_owned());
            args.push(label.to_string());
        }
        None => {
            args.push("-map".to_owned());
            args.push("0:v".to_owned());
        }
    }
    if audio.is_some() {
        args.push("-map".to_owned());
        args.push("1:a".to_owned());
    }

    args.extend(
        ["-c:v", "libx264", "-pix_fmt", "yuv420p"]
            .into_iter()
            .map(str::to_owned),
    );
    if audio.is_some() {
        args.extend(aac_audio_args());
    }
    args.push(loaded.output.to_string_lossy().into_owned());

    let code = engine.invoke(&args)?;
    if code != 0 {
        return Err(CodedError::stage(2, code, format!("mux stage failed with code {code}")).into());
    }
    Ok(())
}

fn move_into_place(concat_video: &Path, output: &Path) -> Result<()> {
    if concat_video == output {
        return Ok(());
    }
    fs::rename(concat_video, output).with_context(|| {
        format!(
            "failed to move {} to {}",
            concat_video.display(),
            output.display()
        )
    })?;
    Ok(())
}
