mod color;
mod engine;
mod error_codes;
mod escape;
mod fonts;
mod graph;
mod layers;
mod project;
mod render;
mod schema;
mod segment;
mod timeline;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::engine::FfmpegEngine;
use crate::error_codes::find_coded_error;
use crate::fonts::FontDir;
use crate::project::{load_project, validate_media};
use crate::render::render_project;

#[derive(Debug, Parser)]
#[command(name = "vizmatic")]
#[command(about = "Declarative video composition compiler driving ffmpeg")]
#[command(version = build_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a project JSON to its output video.
    Render {
        project: PathBuf,
        /// Directory searched for bundled fonts; defaults to `fonts/`
        /// next to the project file.
        #[arg(long = "fonts-dir")]
        fonts_dir: Option<PathBuf>,
    },
    /// Validate a project JSON and its media references without rendering.
    Check {
        project: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Render { project, fonts_dir } => run_render(&project, fonts_dir),
        Commands::Check { project } => run_check(&project),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("[vizmatic] {error:#}");
            let code = find_coded_error(&error)
                .map(|coded| coded.exit_code())
                .unwrap_or(1);
            ExitCode::from(code.clamp(0, 255) as u8)
        }
    }
}

fn run_render(project_path: &Path, fonts_dir: Option<PathBuf>) -> Result<()> {
    let loaded = load_project(project_path)?;
    validate_media(&loaded)?;

    let mut engine = FfmpegEngine::resolve();
    engine.preflight()?;

    let fonts = match fonts_dir {
        Some(dir) => FontDir::new(dir),
        None => FontDir::beside(project_path),
    };
    render_project(&loaded, &mut engine, &fonts)
}

fn run_check(project_path: &Path) -> Result<()> {
    let loaded = load_project(project_path)?;
    validate_media(&loaded)?;

    let clips = loaded.renderable_clips();
    println!(
        "OK: {} ({} clips, {} layers, audio: {})",
        project_path.display(),
        clips.len(),
        loaded.project.layers.len(),
        if loaded.project.audio_path().is_some() {
            "yes"
        } else {
            "no"
        }
    );
    println!("Output: {}", loaded.output.display());
    Ok(())
}

fn build_version() -> String {
    match option_env!("VIZMATIC_GIT_HASH") {
        Some(hash) => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_owned(),
    }
}
