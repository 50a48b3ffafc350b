//! DICOM to NIfTI conversion through the external `dcm2niix` tool.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glob::Pattern;
use tracing::{debug, error, info};

use crate::config::ConverterConfig;
use crate::error::ConvertError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Artifacts produced by one conversion, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOutput {
    /// Image volumes (`.nii.gz`, or `.nii` when uncompressed).
    pub primary: Vec<PathBuf>,
    /// Sidecar metadata (`.json`).
    pub sidecars: Vec<PathBuf>,
}

impl ConversionOutput {
    /// Collects artifacts from a conversion output directory.
    pub fn collect(output_dir: &Path) -> Self {
        let mut primary = glob_sorted(output_dir, "*.nii.gz");
        if primary.is_empty() {
            primary = glob_sorted(output_dir, "*.nii");
        }
        Self {
            primary,
            sidecars: glob_sorted(output_dir, "*.json"),
        }
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.primary.iter().chain(self.sidecars.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.sidecars.is_empty()
    }
}

fn glob_sorted(dir: &Path, file_pattern: &str) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/{}",
        Pattern::escape(&dir.to_string_lossy()),
        file_pattern
    );
    let mut paths: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
        Err(_) => Vec::new(),
    };
    paths.sort();
    paths
}

/// Converts a directory of DICOM files into NIfTI artifacts.
pub trait Converter: Send + Sync {
    /// Converts everything under `input_dir` into `output_dir`. Exceeding
    /// `timeout` is a failure.
    fn convert(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<ConversionOutput, ConvertError>;
}

impl<C: Converter + ?Sized> Converter for std::sync::Arc<C> {
    fn convert(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<ConversionOutput, ConvertError> {
        (**self).convert(input_dir, output_dir, timeout)
    }
}

pub struct Dcm2Niix {
    settings: ConverterConfig,
}

impl Dcm2Niix {
    pub fn new(settings: ConverterConfig) -> Self {
        Self { settings }
    }

    /// Checks that the executable runs, returning its version banner.
    ///
    /// `dcm2niix -v` exits with status 3 on success.
    pub fn verify_installation(&self) -> Result<String, ConvertError> {
        let mut cmd = Command::new(&self.settings.executable);
        cmd.arg("-v");

        let output = run_with_timeout(cmd, VERSION_CHECK_TIMEOUT).map_err(|e| match e {
            ConvertError::Spawn(source) => ConvertError::NotInstalled {
                executable: self.settings.executable.clone(),
                reason: source.to_string(),
            },
            other => other,
        })?;

        let banner = format!("{}{}", output.stdout, output.stderr);
        let code = output.status.code();
        if matches!(code, Some(0) | Some(3)) || banner.contains("version") {
            let version = banner.lines().next().unwrap_or("unknown").trim().to_string();
            info!(version = %version, "dcm2niix detected");
            Ok(version)
        } else {
            Err(ConvertError::NotInstalled {
                executable: self.settings.executable.clone(),
                reason: format!("version check exited with {:?}: {}", code, banner.trim()),
            })
        }
    }

    pub fn command_args(&self, input_dir: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            self.settings.filename_template.clone().into(),
            "-o".into(),
            output_dir.as_os_str().to_owned(),
        ];
        if self.settings.compress {
            args.extend([OsString::from("-z"), OsString::from("y")]);
        }
        if self.settings.bids_sidecar {
            args.extend([OsString::from("-b"), OsString::from("y")]);
        }
        args.push(input_dir.as_os_str().to_owned());
        args
    }
}

impl Converter for Dcm2Niix {
    fn convert(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        timeout: Duration,
    ) -> Result<ConversionOutput, ConvertError> {
        if !input_dir.is_dir() {
            return Err(ConvertError::InputMissing(input_dir.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir).map_err(|e| ConvertError::OutputDirectory {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let mut cmd = Command::new(&self.settings.executable);
        cmd.args(self.command_args(input_dir, output_dir))
            .current_dir(output_dir);
        debug!(command = ?cmd, "Running converter");

        let output = run_with_timeout(cmd, timeout)?;
        if !output.status.success() {
            let message = if output.stderr.trim().is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            error!(input = %input_dir.display(), "Conversion failed: {}", message.trim());
            return Err(ConvertError::Failed(message.trim().to_string()));
        }

        let artifacts = ConversionOutput::collect(output_dir);
        if artifacts.primary.is_empty() {
            return Err(ConvertError::NoOutput(output_dir.to_path_buf()));
        }

        info!(
            input = %input_dir.display(),
            volumes = artifacts.primary.len(),
            sidecars = artifacts.sidecars.len(),
            "Conversion succeeded"
        );
        Ok(artifacts)
    }
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Runs `cmd` to completion, killing it once `timeout` expires.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// block on a full pipe while we poll for its exit.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput, ConvertError> {
    // An unrepresentable deadline means wait without one.
    let deadline = Instant::now().checked_add(timeout);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ConvertError::Spawn)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_and_reap(&mut child);
            let _ = join_drain(stdout);
            let _ = join_drain(stderr);
            return Err(ConvertError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        Err(e) => {
            kill_and_reap(&mut child);
            return Err(ConvertError::Spawn(e));
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    })
}

fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                POLL_INTERVAL.min(deadline - now)
            }
            None => POLL_INTERVAL,
        };
        thread::sleep(pause);
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill converter process: {}", e);
    }
    if let Err(e) = child.wait() {
        debug!("Failed to reap converter process: {}", e);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
