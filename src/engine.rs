use std::env;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::error_codes::CodedError;
use crate::timeline::DurationProbe;

/// Spawns the external engine with an argument vector, streams its
/// progress output, and reports the exit code. The render pipeline only
/// talks to ffmpeg through this seam, so tests can substitute a recorder.
pub trait EngineSink {
    fn invoke(&mut self, args: &[String]) -> Result<i32>;
}

/// Arguments common to every encode invocation: overwrite output, silence
/// the stats spam, and emit machine-readable progress on stdout.
pub fn progress_args() -> Vec<String> {
    ["-hide_banner", "-y", "-nostats", "-progress", "pipe:1"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Codec normalization shared by every intermediate and the final encode,
/// so all pieces are concatenation-compatible.
pub fn h264_output_args() -> Vec<String> {
    [
        "-c:v", "libx264", "-preset", "veryfast", "-crf", "20", "-pix_fmt", "yuv420p",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

pub fn aac_audio_args() -> Vec<String> {
    ["-c:a", "aac", "-b:a", "192k", "-shortest"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEngine {
    /// Locate ffmpeg/ffprobe. `VIZMATIC_FFMPEG` / `VIZMATIC_FFPROBE`
    /// override the defaults; an absolute ffmpeg path makes us try the
    /// sibling ffprobe before falling back to PATH lookup.
    pub fn resolve() -> Self {
        let ffmpeg = match env::var("VIZMATIC_FFMPEG") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from("ffmpeg"),
        };
        let ffprobe = resolve_ffprobe(&ffmpeg);
        Self { ffmpeg, ffprobe }
    }

    /// Fail fast before any rendering work if the engine is unusable.
    /// With the `sidecar_ffmpeg` feature, a missing system binary is
    /// auto-downloaded instead.
    pub fn preflight(&mut self) -> Result<()> {
        if version_check(&self.ffmpeg) {
            return Ok(());
        }

        #[cfg(feature = "sidecar_ffmpeg")]
        {
            let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
            if !sidecar.exists() {
                ffmpeg_sidecar::download::auto_download()
                    .context("failed to auto-download ffmpeg sidecar binary")?;
            }
            if version_check(&sidecar) {
                self.ffmpeg = sidecar;
                return Ok(());
            }
        }

        Err(CodedError::environment(
            "engine/unavailable",
            format!(
                "ffmpeg not usable at '{}'; install ffmpeg or set VIZMATIC_FFMPEG",
                self.ffmpeg.display()
            ),
        )
        .into())
    }
}

impl EngineSink for FfmpegEngine {
    fn invoke(&mut self, args: &[String]) -> Result<i32> {
        println!("[ffmpeg] {}", display_command(&self.ffmpeg, args));

        let mut child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow::Error::from(CodedError::environment(
                        "engine/unavailable",
                        format!("ffmpeg not found at '{}'", self.ffmpeg.display()),
                    ))
                } else {
                    anyhow::anyhow!(
                        "failed to spawn ffmpeg (path={}): {error}",
                        self.ffmpeg.display()
                    )
                }
            })?;

        // Progress lines arrive on stdout (`-progress pipe:1`); forward
        // them as they come for observability.
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.context("failed reading ffmpeg progress output")?;
                println!("{line}");
            }
        }

        let mut stderr_pipe = child.stderr.take();
        let status = child.wait().context("failed waiting for ffmpeg process")?;
        let code = status.code().unwrap_or(1);
        if code != 0 {
            let tail = read_stderr_tail(&mut stderr_pipe)?;
            if !tail.is_empty() {
                eprintln!("[ffmpeg] {tail}");
            }
        }
        Ok(code)
    }
}

impl DurationProbe for FfmpegEngine {
    fn duration_ms(&self, path: &Path) -> Option<u64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let seconds = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()?;
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        Some((seconds * 1000.0) as u64)
    }
}

fn resolve_ffprobe(ffmpeg: &Path) -> PathBuf {
    if let Ok(path) = env::var("VIZMATIC_FFPROBE") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    sibling_ffprobe(ffmpeg).unwrap_or_else(|| PathBuf::from("ffprobe"))
}

/// When ffmpeg was given as a path (not a bare command), look for an
/// ffprobe next to it.
fn sibling_ffprobe(ffmpeg: &Path) -> Option<PathBuf> {
    let dir = ffmpeg.parent().filter(|dir| !dir.as_os_str().is_empty())?;
    if cfg!(windows) {
        let candidate = dir.join("ffprobe.exe");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let candidate = dir.join("ffprobe");
    candidate.is_file().then_some(candidate)
}

fn version_check(path: &Path) -> bool {
    Command::new(path)
        .args(["-hide_banner", "-version"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn display_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![quote_for_display(&program.to_string_lossy())];
    parts.extend(args.iter().map(|arg| quote_for_display(arg)));
    parts.join(" ")
}

fn quote_for_display(arg: &str) -> String {
    if arg.contains(' ') {
        format!("\"{arg}\"")
    } else {
        arg.to_owned()
    }
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars = s.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{display_command, last_n_chars, sibling_ffprobe};

    #[test]
    fn sibling_ffprobe_found_next_to_absolute_ffmpeg() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let probe = dir.path().join("ffprobe");
        fs::write(&probe, b"").expect("fake ffprobe should write");

        let resolved = sibling_ffprobe(&dir.path().join("ffmpeg"));
        assert_eq!(resolved, Some(probe));
    }

    #[test]
    fn bare_command_has_no_sibling() {
        assert_eq!(sibling_ffprobe(Path::new("ffmpeg")), None);
    }

    #[test]
    fn display_quotes_args_with_spaces() {
        let args = vec!["-i".to_owned(), "my clip.mp4".to_owned()];
        assert_eq!(
            display_command(&PathBuf::from("ffmpeg"), &args),
            "ffmpeg -i \"my clip.mp4\""
        );
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let text = "a".repeat(600) + "tail";
        let tail = last_n_chars(&text, 10);
        assert_eq!(tail, "aaaaaatail");
    }
}
