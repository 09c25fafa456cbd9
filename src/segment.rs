use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::color::{color_chain, render_chain};
use crate::engine::{h264_output_args, progress_args};
use crate::graph::{FilterGraph, FilterOp, Label, ParamValue, Statement};
use crate::schema::FillMethod;
use crate::timeline::ClipJob;

/// Floor for the stretch time-scale ratio; keeps degenerate requests from
/// producing absurd or negative speeds.
pub const MIN_STRETCH_RATIO: f64 = 0.05;

/// A requested duration must exceed the segment by more than this before
/// loop/pingpong repetition kicks in.
pub const LOOP_TOLERANCE: f64 = 0.01;

/// How a trimmed source segment is made to occupy the job's duration.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Time-scale the segment by `ratio = duration / segment_len`.
    Stretch { ratio: f64 },
    /// Forward-then-reversed cycle of `2 * segment_len`, repeated and
    /// truncated to the duration.
    PingPong { cycle_len: f64 },
    /// Repeat the segment indefinitely, truncated to the duration.
    Loop,
    /// Plain trim, hard-capped at the duration.
    Direct,
}

/// Strategy selection is exhaustive and mutually exclusive: exactly one
/// variant fires for any `(fillMethod, segment_len, duration)` input.
/// `segment_len` is `Some` only when the trimmed segment has positive
/// length, so the repetition strategies can never divide by zero.
pub fn select_strategy(fill: FillMethod, segment_len: Option<f64>, duration: f64) -> Strategy {
    match (fill, segment_len) {
        (FillMethod::Stretch, Some(segment)) if duration > 0.0 => Strategy::Stretch {
            ratio: (duration / segment).max(MIN_STRETCH_RATIO),
        },
        (FillMethod::PingPong, Some(segment)) => Strategy::PingPong {
            cycle_len: segment * 2.0,
        },
        (FillMethod::Loop, Some(segment)) if duration > segment + LOOP_TOLERANCE => Strategy::Loop,
        _ => Strategy::Direct,
    }
}

/// The engine invocations that realize one timeline item as an
/// intermediate file. Most items need one invocation; pingpong needs two
/// (build the cycle, then repeat/truncate it).
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub invocations: Vec<Vec<String>>,
    pub output: PathBuf,
}

pub fn plan_clip_render(work_dir: &Path, job: &ClipJob, index: usize) -> Result<RenderPlan> {
    let Some(path) = job.spec.path.as_ref() else {
        bail!("clip {index} has no path");
    };
    let segment_len = job.trim_end.segment_len(job.trim_start);
    let strategy = select_strategy(job.spec.fill_method, segment_len, job.duration);
    let output = work_dir.join(format!("clip_{index:04}.mp4"));

    if let Strategy::PingPong { cycle_len } = strategy {
        let cycle_path = work_dir.join(format!("clip_{index:04}_pp.mp4"));
        let trim_end = job.trim_start + cycle_len / 2.0;
        let (filter, video_out) = pingpong_graph(job, trim_end)?;

        let mut build_cycle = progress_args();
        build_cycle.push("-i".to_owned());
        build_cycle.push(path.to_string_lossy().into_owned());
        build_cycle.push("-filter_complex".to_owned());
        build_cycle.push(filter);
        build_cycle.push("-map".to_owned());
        build_cycle.push(video_out.to_string());
        build_cycle.push("-an".to_owned());
        build_cycle.extend(h264_output_args());
        build_cycle.push(cycle_path.to_string_lossy().into_owned());

        let mut repeat = progress_args();
        if job.duration > cycle_len + LOOP_TOLERANCE {
            repeat.push("-stream_loop".to_owned());
            repeat.push("-1".to_owned());
        }
        repeat.push("-i".to_owned());
        repeat.push(cycle_path.to_string_lossy().into_owned());
        if job.duration > 0.0 {
            repeat.push("-t".to_owned());
            repeat.push(fmt_secs(job.duration));
        }
        repeat.push("-an".to_owned());
        repeat.extend(h264_output_args());
        repeat.push(output.to_string_lossy().into_owned());

        return Ok(RenderPlan {
            invocations: vec![build_cycle, repeat],
            output,
        });
    }

    let mut args = progress_args();
    if strategy == Strategy::Loop {
        args.push("-stream_loop".to_owned());
        args.push("-1".to_owned());
    }
    if job.trim_start > 0.0 {
        args.push("-ss".to_owned());
        args.push(fmt_secs(job.trim_start));
    }
    if let Some(end) = job.trim_end.position() {
        if end > job.trim_start {
            args.push("-to".to_owned());
            args.push(fmt_secs(end));
        }
    }
    args.push("-i".to_owned());
    args.push(path.to_string_lossy().into_owned());
    if job.duration > 0.0 {
        args.push("-t".to_owned());
        args.push(fmt_secs(job.duration));
    }
    args.push("-an".to_owned());

    let mut filters = Vec::new();
    if let Some(chain) = render_chain(&color_chain(&job.spec)) {
        filters.push(chain);
    }
    if let Strategy::Stretch { ratio } = strategy {
        filters.push(format!("setpts=PTS*{ratio:.6}"));
    }
    if !filters.is_empty() {
        args.push("-vf".to_owned());
        args.push(filters.join(","));
    }

    args.extend(h264_output_args());
    args.push(output.to_string_lossy().into_owned());

    Ok(RenderPlan {
        invocations: vec![args],
        output,
    })
}

/// Blank black filler for a timeline gap, generated from the `lavfi`
/// color source at canvas size.
pub fn plan_gap_render(work_dir: &Path, duration: f64, canvas: (u32, u32)) -> RenderPlan {
    let (width, height) = canvas;
    let output = work_dir.join(format!("gap_{}ms.mp4", (duration * 1000.0) as u64));

    let mut args = progress_args();
    args.push("-f".to_owned());
    args.push("lavfi".to_owned());
    args.push("-i".to_owned());
    args.push(format!(
        "color=c=black:s={width}x{height}:d={}",
        fmt_secs(duration)
    ));
    args.push("-an".to_owned());
    args.extend(h264_output_args());
    args.push(output.to_string_lossy().into_owned());

    RenderPlan {
        invocations: vec![args],
        output,
    }
}

/// One forward-plus-reversed cycle as a filter graph. The trimmed segment
/// is split so the reverse pass and the concat each get their own copy.
fn pingpong_graph(job: &ClipJob, trim_end: f64) -> Result<(String, Label)> {
    let mut graph = FilterGraph::new();
    let base = graph.source("0:v");

    let forward = graph.fresh("f");
    let forward_copy = graph.fresh("f");
    let mut trimmed = Statement::new()
        .input(base)
        .op(
            FilterOp::new("trim")
                .param("start", ParamValue::lit(fmt_secs(job.trim_start)))
                .param("end", ParamValue::lit(fmt_secs(trim_end))),
        )
        .op(FilterOp::new("setpts").pos(ParamValue::lit("PTS-STARTPTS")));
    for op in color_chain(&job.spec) {
        trimmed = trimmed.op(op.to_filter_op());
    }
    graph.push(
        trimmed
            .op(FilterOp::new("split").pos(ParamValue::lit(2)))
            .output(forward.clone())
            .output(forward_copy.clone()),
    )?;

    let reversed = graph.fresh("r");
    graph.push(
        Statement::new()
            .input(forward_copy)
            .op(FilterOp::new("reverse"))
            .op(FilterOp::new("setpts").pos(ParamValue::lit("PTS-STARTPTS")))
            .output(reversed.clone()),
    )?;

    let cycle = graph.fresh("v");
    graph.push(
        Statement::new()
            .input(forward)
            .input(reversed)
            .op(
                FilterOp::new("concat")
                    .param("n", ParamValue::lit(2))
                    .param("v", ParamValue::lit(1))
                    .param("a", ParamValue::lit(0)),
            )
            .output(cycle.clone()),
    )?;

    Ok((graph.render(), cycle))
}

fn fmt_secs(value: f64) -> String {
    format!("{value:.3}")
}
