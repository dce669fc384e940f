#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use scenecast::{
    Browser, BrowserLauncher, EncodeOptions, FINGERPRINT_FILE, MediaSceneInfo, Page, PageOptions, RecordSession,
    Recorder, RenderError, RenderResult, ScreenshotRequest,
};
use serde_json::{Value, json};
use url::Url;

/// Scene timing answered by fake pages.
#[derive(Clone, Copy, Debug)]
pub struct SceneTiming {
    pub delay: f64,
    pub duration: f64,
    pub iteration_count: f64,
    pub play_speed: f64,
}

impl SceneTiming {
    pub fn simple(duration: f64) -> Self {
        Self {
            delay: 0.0,
            duration,
            iteration_count: 1.0,
            play_speed: 1.0,
        }
    }
}

#[derive(Default)]
pub struct DriverLog {
    pub launched: usize,
    pub closed: usize,
    pub pages: Vec<PageOptions>,
    pub screenshots: Vec<PathBuf>,
    pub scripts: Vec<String>,
}

/// In-memory browser double. Browser `n` (launch order) owns page `n`.
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub scene: Option<SceneTiming>,
    pub media: Option<Value>,
    /// Browser index whose page fails its first screenshot.
    pub fail_browser: Option<usize>,
    pub log: Arc<Mutex<DriverLog>>,
}

impl FakeDriver {
    pub fn with_scene(timing: SceneTiming) -> Self {
        Self {
            scene: Some(timing),
            ..Self::default()
        }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::new(self.clone())
    }

    pub fn launched(&self) -> usize {
        self.log.lock().unwrap().launched
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn screenshots(&self) -> usize {
        self.log.lock().unwrap().screenshots.len()
    }
}

impl BrowserLauncher for FakeDriver {
    fn launch(&self) -> RenderResult<Box<dyn Browser>> {
        let mut log = self.log.lock().unwrap();
        let index = log.launched;
        log.launched += 1;
        Ok(Box::new(FakeBrowser {
            index,
            driver: self.clone(),
        }))
    }
}

struct FakeBrowser {
    index: usize,
    driver: FakeDriver,
}

impl Browser for FakeBrowser {
    fn open_page(&mut self, opts: &PageOptions) -> RenderResult<Box<dyn Page>> {
        self.driver.log.lock().unwrap().pages.push(opts.clone());
        Ok(Box::new(FakePage {
            fail: self.driver.fail_browser == Some(self.index),
            driver: self.driver.clone(),
        }))
    }

    fn close(&mut self) -> RenderResult<()> {
        self.driver.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

struct FakePage {
    fail: bool,
    driver: FakeDriver,
}

impl Page for FakePage {
    fn evaluate(&mut self, script: &str) -> RenderResult<Value> {
        self.driver
            .log
            .lock()
            .unwrap()
            .scripts
            .push(script.to_string());
        if script.ends_with(".finish().getInfo()") {
            return self
                .driver
                .media
                .clone()
                .ok_or_else(|| RenderError::capture("mediaScene is not defined"));
        }
        if script.contains(".setTime(") {
            return Ok(Value::Null);
        }
        let Some(scene) = self.driver.scene else {
            return Err(RenderError::capture("scene is not defined"));
        };
        match script {
            "scene.getDelay()" => Ok(json!(scene.delay)),
            "scene.getDuration()" => Ok(json!(scene.duration)),
            "scene.getIterationCount()" => Ok(json!(scene.iteration_count)),
            "scene.getPlaySpeed()" => Ok(json!(scene.play_speed)),
            other => Err(RenderError::capture(format!("unexpected script {other}"))),
        }
    }

    fn screenshot(&mut self, request: &ScreenshotRequest<'_>) -> RenderResult<Option<Vec<u8>>> {
        if self.fail {
            return Err(RenderError::capture("page crashed"));
        }
        self.driver
            .log
            .lock()
            .unwrap()
            .screenshots
            .push(request.path.to_path_buf());
        if request.buffer {
            return Ok(Some(b"frame".to_vec()));
        }
        std::fs::write(request.path, b"frame").unwrap();
        Ok(None)
    }
}

#[derive(Default)]
pub struct Recorded {
    pub inits: usize,
    pub destroys: usize,
    pub encodes: Vec<(EncodeOptions, u64)>,
}

/// Recorder that "encodes" by reporting the container and frame count it received.
#[derive(Default)]
pub struct CountingRecorder {
    pub session: RecordSession,
    pub recorded: Arc<Mutex<Recorded>>,
    /// Put a directory where the cache fingerprint goes, so persisting it fails.
    pub block_fingerprint: bool,
}

impl Recorder for CountingRecorder {
    fn session(&self) -> &RecordSession {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RecordSession {
        &mut self.session
    }

    fn init(&mut self) -> RenderResult<()> {
        self.recorded.lock().unwrap().inits += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.recorded.lock().unwrap().destroys += 1;
        self.session.reset();
    }

    fn record_media(&mut self, info: &MediaSceneInfo, _input_url: &Url) -> RenderResult<()> {
        self.session
            .set_audio(format!("audio:{}", info.medias.len()).into_bytes());
        Ok(())
    }

    fn record(&mut self, opts: &EncodeOptions) -> RenderResult<Vec<u8>> {
        let window = self.record_info(&opts.record_info())?;
        let frames = self.session.capture(&window)?;
        self.recorded
            .lock()
            .unwrap()
            .encodes
            .push((opts.clone(), frames.len() as u64));
        if self.block_fingerprint
            && let Some(folder) = self.session.cache_folder()
        {
            std::fs::create_dir_all(folder.join(FINGERPRINT_FILE)).unwrap();
        }
        Ok(format!("{}:{}", opts.format.extension(), frames.len()).into_bytes())
    }
}
