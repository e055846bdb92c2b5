//! Tesseract backend driving the external `tesseract` binary.

use std::io::{Cursor, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::{OcrBackend, Recognized};
use crate::error::OcrError;
use crate::script::Script;

const FALLBACK_LANGUAGES: &str = "eng";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `tesseract stdin stdout -l <langs>` with the image piped as PNG.
///
/// The process is killed once `timeout` passes and is always reaped.
pub struct TesseractBackend {
    binary: String,
    timeout: Duration,
}

impl TesseractBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, png: &[u8], languages: &str) -> Result<String, OcrError> {
        debug!("Running {} with languages {}", self.binary, languages);

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", languages])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OcrError::Unavailable(format!("{} not found on PATH", self.binary))
                }
                _ => OcrError::Unavailable(e.to_string()),
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Pipes are serviced on their own threads so a full pipe cannot stall the wait
        let (piped, stdout, stderr, status) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(png),
                None => Ok(()),
            });
            let out = scope.spawn(move || drain(stdout));
            let err = scope.spawn(move || drain(stderr));

            let status = wait_with_deadline(&mut child, self.timeout);
            let piped = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (piped, out.join().unwrap_or_default(), err.join().unwrap_or_default(), status)
        });
        let status = status?;

        let stderr = String::from_utf8_lossy(&stderr);
        if is_missing_language(&stderr) {
            return Err(OcrError::MissingLanguage(languages.to_string()));
        }
        if !status.success() {
            return Err(OcrError::Recognition(stderr.trim().to_string()));
        }
        if let Err(e) = piped {
            return Err(OcrError::Recognition(format!("failed to pipe image: {}", e)));
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Wait for the child until `timeout`, killing it past the deadline.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<ExitStatus, OcrError> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!("Tesseract still running after {:?}, killing it", timeout);
                reap(child);
                return Err(OcrError::Timeout(timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                reap(child);
                return Err(OcrError::Recognition(e.to_string()));
            }
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("kill failed: {}", e);
    }
    if let Err(e) = child.wait() {
        debug!("wait failed: {}", e);
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buffer) {
            debug!("pipe read failed: {}", e);
        }
    }
    buffer
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

fn is_missing_language(stderr: &str) -> bool {
    stderr.contains("Failed loading language") || stderr.contains("Error opening data file")
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| OcrError::InvalidImage(e.to_string()))?;
    Ok(buffer.into_inner())
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, script: Script) -> Result<Recognized, OcrError> {
        let png = encode_png(image)?;
        let languages = script.tesseract_languages();

        match self.run(&png, languages) {
            Ok(text) => Ok(Recognized {
                text,
                notes: Vec::new(),
            }),
            Err(OcrError::MissingLanguage(missing)) if languages != FALLBACK_LANGUAGES => {
                warn!("Tesseract language pack {} not installed, retrying with {}", missing, FALLBACK_LANGUAGES);
                let text = self.run(&png, FALLBACK_LANGUAGES)?;
                Ok(Recognized {
                    text,
                    notes: vec![format!(
                        "tesseract language pack '{}' unavailable, used '{}'",
                        missing, FALLBACK_LANGUAGES
                    )],
                })
            }
            Err(e) => Err(e),
        }
    }
}
