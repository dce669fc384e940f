use std::io::{BufRead as _, BufReader, Write as _};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{RenderError, RenderResult};
use crate::page::{Browser, BrowserLauncher, Page, PageOptions, ScreenshotRequest};

/// Launches one driver process per browser.
///
/// The driver is any executable (typically a small puppeteer script) that reads one JSON
/// request per line on stdin and answers with one JSON response per line on stdout:
///
/// ```text
/// -> {"op":"open","name":"scene","media":"mediaScene","width":1920,"height":1080,"path":"file:///…","scale":1.0}
/// <- {"ok":true,"value":{"page":0}}
/// -> {"op":"evaluate","page":0,"script":"scene.getDuration()"}
/// <- {"ok":true,"value":2}
/// -> {"op":"screenshot","page":0,"path":"/…/frame0.png","type":"png","omitBackground":false,"encoding":null}
/// <- {"ok":true,"value":null}
/// -> {"op":"close"}
/// <- {"ok":true}
/// ```
///
/// Failures are reported as `{"ok":false,"error":"…"}`.
#[derive(Clone, Debug)]
pub struct DriverLauncher {
    program: String,
    args: Vec<String>,
}

impl DriverLauncher {
    /// Build a launcher from a command line (`program` followed by its arguments).
    pub fn from_command(command: &[String]) -> RenderResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RenderError::configuration("page driver command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl BrowserLauncher for DriverLauncher {
    fn launch(&self) -> RenderResult<Box<dyn Browser>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                RenderError::capture(format!(
                    "failed to spawn page driver '{}': {e}",
                    self.program
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::capture("failed to open page driver stdin (unexpected)"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RenderError::capture("failed to open page driver stdout (unexpected)"))?;
        tracing::debug!(program = %self.program, pid = child.id(), "page driver launched");

        Ok(Box::new(DriverBrowser {
            transport: Arc::new(Mutex::new(Transport {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
            })),
            closed: false,
        }))
    }
}

struct Transport {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request<'a> {
    Open(&'a PageOptions),
    Evaluate {
        page: u64,
        script: &'a str,
    },
    Screenshot {
        page: u64,
        path: &'a Path,
        #[serde(rename = "type")]
        image_type: &'static str,
        #[serde(rename = "omitBackground")]
        omit_background: bool,
        encoding: Option<&'static str>,
    },
    Close,
}

#[derive(Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl Transport {
    fn request(&mut self, req: &Request<'_>) -> RenderResult<serde_json::Value> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RenderError::capture("page driver is already closed"))?;
        let mut line = serde_json::to_vec(req)?;
        line.push(b'\n');
        stdin
            .write_all(&line)
            .and_then(|()| stdin.flush())
            .map_err(|e| RenderError::capture(format!("failed to write to page driver: {e}")))?;

        let mut reply = String::new();
        let n = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| RenderError::capture(format!("failed to read from page driver: {e}")))?;
        if n == 0 {
            return Err(RenderError::capture("page driver exited unexpectedly"));
        }
        let resp: Response = serde_json::from_str(reply.trim_end())
            .map_err(|e| RenderError::capture(format!("malformed page driver reply: {e}")))?;
        if resp.ok {
            Ok(resp.value)
        } else {
            Err(RenderError::capture(
                resp.error
                    .unwrap_or_else(|| "page driver reported an unknown error".to_string()),
            ))
        }
    }

    fn shutdown(&mut self) -> RenderResult<()> {
        let close = self.request(&Request::Close);
        drop(self.stdin.take());
        if close.is_err() {
            let _ = self.child.kill();
        }
        let status = self
            .child
            .wait()
            .map_err(|e| RenderError::capture(format!("failed to wait for page driver: {e}")))?;
        close?;
        if !status.success() {
            return Err(RenderError::capture(format!(
                "page driver exited with status {status}"
            )));
        }
        Ok(())
    }
}

fn lock(transport: &Mutex<Transport>) -> RenderResult<MutexGuard<'_, Transport>> {
    transport
        .lock()
        .map_err(|_| RenderError::capture("page driver transport has been poisoned"))
}

struct DriverBrowser {
    transport: Arc<Mutex<Transport>>,
    closed: bool,
}

impl Browser for DriverBrowser {
    fn open_page(&mut self, opts: &PageOptions) -> RenderResult<Box<dyn Page>> {
        let value = lock(&self.transport)?.request(&Request::Open(opts))?;
        let page = value
            .get("page")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Ok(Box::new(DriverPage {
            transport: Arc::clone(&self.transport),
            page,
        }))
    }

    fn close(&mut self) -> RenderResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        lock(&self.transport)?.shutdown()
    }
}

impl Drop for DriverBrowser {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(mut t) = self.transport.lock() {
            drop(t.stdin.take());
            let _ = t.child.kill();
            let _ = t.child.wait();
        }
    }
}

struct DriverPage {
    transport: Arc<Mutex<Transport>>,
    page: u64,
}

impl Page for DriverPage {
    fn evaluate(&mut self, script: &str) -> RenderResult<serde_json::Value> {
        lock(&self.transport)?.request(&Request::Evaluate {
            page: self.page,
            script,
        })
    }

    fn screenshot(&mut self, request: &ScreenshotRequest<'_>) -> RenderResult<Option<Vec<u8>>> {
        let value = lock(&self.transport)?.request(&Request::Screenshot {
            page: self.page,
            path: request.path,
            image_type: request.image_type.as_str(),
            omit_background: request.omit_background,
            encoding: request.buffer.then_some("base64"),
        })?;
        if !request.buffer {
            return Ok(None);
        }
        let encoded = value
            .as_str()
            .ok_or_else(|| RenderError::capture("page driver returned no screenshot data"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RenderError::capture(format!("invalid screenshot encoding: {e}")))?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/page/driver.rs"]
mod tests;
