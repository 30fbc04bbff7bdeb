//! Pluggable OCR backend seam
//!
//! The engine only needs `bytes -> text boxes`; image preprocessing,
//! model choice, and thresholds live behind this trait.

use serde::{Deserialize, Serialize};

/// One recognized text region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    /// Pixel bounding box: x, y, width, height.
    pub bbox: [f32; 4],
    pub confidence: f32,
}

/// Status tag attached to every OCR output. The engine never retries;
/// downstream decides whether `Empty`/`Error` becomes a failure row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "message")]
pub enum OcrStatus {
    Ok,
    Empty,
    Error(String),
}

/// CPU-bound character recognition. Implementations must be callable
/// from a blocking thread; the engine wraps calls in `spawn_blocking`.
pub trait OcrBackend: Send + Sync + 'static {
    /// Recognize text regions in an encoded image.
    fn recognize(&self, image: &[u8]) -> Result<Vec<TextBox>, String>;
}

/// Backend that delegates to an external OCR process: the image is
/// written to stdin, recognized boxes come back as JSON on stdout.
/// Which engine runs behind the command is deployment configuration,
/// not code.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    /// Build from a shell-ish command line, e.g. `ocr-serve --json`.
    pub fn new(command_line: &str) -> Result<Self, String> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts.next().ok_or_else(|| "empty OCR command".to_string())?;
        Ok(Self { program, args: parts.collect() })
    }
}

impl OcrBackend for CommandBackend {
    fn recognize(&self, image: &[u8]) -> Result<Vec<TextBox>, String> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("failed to start OCR process: {}", e))?;

        child
            .stdin
            .take()
            .ok_or_else(|| "OCR process has no stdin".to_string())?
            .write_all(image)
            .map_err(|e| format!("failed to feed image to OCR process: {}", e))?;

        let output = child
            .wait_with_output()
            .map_err(|e| format!("OCR process failed: {}", e))?;
        if !output.status.success() {
            return Err(format!("OCR process exited with {}", output.status));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| format!("unparseable OCR output: {}", e))
    }
}

/// Deterministic backend for tests: yields one pre-seeded box per
/// token, whatever the image.
pub struct FixedBackend {
    tokens: Vec<String>,
}

impl FixedBackend {
    pub fn new(tokens: &[&str]) -> Self {
        Self { tokens: tokens.iter().map(|s| s.to_string()).collect() }
    }

    pub fn empty() -> Self {
        Self { tokens: Vec::new() }
    }
}

impl OcrBackend for FixedBackend {
    fn recognize(&self, _image: &[u8]) -> Result<Vec<TextBox>, String> {
        Ok(self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, text)| TextBox {
                text: text.clone(),
                bbox: [0.0, 24.0 * i as f32, 120.0, 24.0],
                confidence: 0.99,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backend_yields_seeded_boxes() {
        let backend = FixedBackend::new(&["Alpha", "95"]);
        let boxes = backend.recognize(b"png-bytes").unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].text, "Alpha");
        assert!(FixedBackend::empty().recognize(b"x").unwrap().is_empty());
    }
}
