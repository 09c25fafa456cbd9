use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error_codes::CodedError;
use crate::schema::{ClipSpec, Project, SUPPORTED_VERSION};

/// A project parsed from disk, validated, and with its output path
/// defaulted when the file left it unspecified.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub path: PathBuf,
    pub project: Project,
    pub output: PathBuf,
}

impl LoadedProject {
    /// Clips that can actually render: entries without a `path` are
    /// silently dropped.
    pub fn renderable_clips(&self) -> Vec<ClipSpec> {
        self.project
            .clips
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|clip| clip.path.is_some())
            .collect()
    }
}

/// Load, parse, and validate a project file. Every failure here is a
/// configuration error; nothing has been rendered yet.
pub fn load_project(path: &Path) -> Result<LoadedProject> {
    if !path.is_file() {
        return Err(CodedError::config(
            "project/not_found",
            format!("project JSON not found: {}", path.display()),
        )
        .into());
    }

    let raw = fs::read_to_string(path).map_err(|error| {
        CodedError::config(
            "project/unreadable",
            format!("failed to read {}: {error}", path.display()),
        )
    })?;

    let project: Project = serde_json::from_str(&raw).map_err(|error| {
        CodedError::config(
            "project/parse",
            format!(
                "invalid project JSON at line {}, column {}: {error}",
                error.line(),
                error.column()
            ),
        )
    })?;

    validate(&project)?;

    let output = match project.output_path() {
        Some(output) => output.clone(),
        None => default_output(path),
    };

    Ok(LoadedProject {
        path: path.to_owned(),
        project,
        output,
    })
}

fn validate(project: &Project) -> Result<()> {
    match project.version.as_deref() {
        Some(SUPPORTED_VERSION) => {}
        _ => {
            return Err(CodedError::config(
                "project/bad_version",
                format!("unsupported or missing project version; expected '{SUPPORTED_VERSION}'"),
            )
            .into());
        }
    }

    let Some(clips) = project.clips.as_ref() else {
        return Err(CodedError::config(
            "project/missing_clips",
            "project is missing its 'clips' list",
        )
        .into());
    };

    if !clips.iter().any(|clip| clip.path.is_some()) {
        return Err(CodedError::config(
            "project/no_clips",
            "no clips provided; nothing to render",
        )
        .into());
    }

    Ok(())
}

/// Check that every referenced media file exists. Split out from
/// `load_project` so `check` can report schema problems even when media
/// has not been copied into place yet.
pub fn validate_media(loaded: &LoadedProject) -> Result<()> {
    for clip in loaded.renderable_clips() {
        let path = clip.path.as_ref().expect("renderable clips have a path");
        if !path.is_file() {
            return Err(CodedError::config(
                "project/missing_file",
                format!("missing clip: {}", path.display()),
            )
            .into());
        }
    }
    if let Some(audio) = loaded.project.audio_path() {
        if !audio.is_file() {
            return Err(CodedError::config(
                "project/missing_file",
                format!("missing audio file: {}", audio.display()),
            )
            .into());
        }
    }
    Ok(())
}

/// `<project stem>_render.mp4`, next to the project file.
fn default_output(project_path: &Path) -> PathBuf {
    let stem = project_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_owned());
    project_path.with_file_name(format!("{stem}_render.mp4"))
}
