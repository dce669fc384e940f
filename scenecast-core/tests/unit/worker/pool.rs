use std::path::PathBuf;
use std::sync::Mutex;

use super::*;
use crate::foundation::core::ImageType;

#[derive(Default)]
struct Events {
    log: Vec<String>,
    frames: Vec<u64>,
}

struct ScriptedWorker {
    index: usize,
    state: WorkerState,
    fail_record: bool,
    fail_disconnect: bool,
    events: Arc<Mutex<Events>>,
}

impl ScriptedWorker {
    fn boxed(index: usize, events: &Arc<Mutex<Events>>) -> Box<dyn CaptureWorker> {
        Box::new(Self {
            index,
            state: WorkerState::Uninitialized,
            fail_record: false,
            fail_disconnect: false,
            events: events.clone(),
        })
    }
}

impl CaptureWorker for ScriptedWorker {
    fn index(&self) -> usize {
        self.index
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn start(&mut self, _opts: &ChildOptions) -> RenderResult<()> {
        self.events
            .lock()
            .unwrap()
            .log
            .push(format!("start {}", self.index));
        self.state = WorkerState::Started;
        Ok(())
    }

    fn record(&mut self, rec: &RecordOptions) -> RenderResult<u64> {
        let mut events = self.events.lock().unwrap();
        events.log.push(format!("record {}", self.index));
        if self.fail_record {
            self.state = WorkerState::Failed;
            return Err(RenderError::capture(format!("worker {} crashed", self.index)));
        }
        let frames = rec.frames().collect::<Vec<_>>();
        events.frames.extend(&frames);
        Ok(frames.len() as u64)
    }

    fn disconnect(&mut self) -> RenderResult<()> {
        self.events
            .lock()
            .unwrap()
            .log
            .push(format!("disconnect {}", self.index));
        self.state = WorkerState::Disconnected;
        if self.fail_disconnect {
            return Err(RenderError::capture("close failed"));
        }
        Ok(())
    }
}

fn child_options() -> ChildOptions {
    ChildOptions {
        has_only_media: false,
        name: "scene".to_string(),
        media: "mediaScene".to_string(),
        path: "file:///tmp/index.html".to_string(),
        width: 32,
        height: 32,
        scale: 1.0,
        delay: 0.0,
        has_media: false,
        referer: None,
        image_type: ImageType::Png,
        alpha: false,
        buffer: false,
        cache_folder: PathBuf::from("/tmp/cache"),
        play_speed: 1.0,
        fps: 30,
        end_time: 1.0,
        skip_frame: 0,
    }
}

fn window(start_frame: u64, end_frame: u64) -> RecordWindow {
    RecordWindow {
        start_frame,
        end_frame,
        start_time: start_frame as f64 / 30.0,
        end_time: end_frame as f64 / 30.0,
    }
}

fn count(events: &Events, prefix: &str) -> usize {
    events.log.iter().filter(|e| e.starts_with(prefix)).count()
}

#[test]
fn empty_pool_is_rejected() {
    assert!(WorkerPool::from_workers(Vec::new(), child_options()).is_err());
}

#[test]
fn stride_distribution_covers_every_frame_once() {
    for workers in 1..=5 {
        let events = Arc::new(Mutex::new(Events::default()));
        let list = (0..workers)
            .map(|i| ScriptedWorker::boxed(i, &events))
            .collect();
        let mut pool = WorkerPool::from_workers(list, child_options()).unwrap();
        let w = window(3, 47);

        assert_eq!(pool.capture(&w).unwrap(), w.frame_count());

        let mut frames = events.lock().unwrap().frames.clone();
        frames.sort_unstable();
        assert_eq!(frames, w.frames().collect::<Vec<_>>());
    }
}

#[test]
fn every_worker_starts_before_any_records() {
    let events = Arc::new(Mutex::new(Events::default()));
    let list = (0..4).map(|i| ScriptedWorker::boxed(i, &events)).collect();
    let mut pool = WorkerPool::from_workers(list, child_options()).unwrap();
    pool.capture(&window(0, 20)).unwrap();

    let events = events.lock().unwrap();
    let last_start = events
        .log
        .iter()
        .rposition(|e| e.starts_with("start"))
        .unwrap();
    let first_record = events
        .log
        .iter()
        .position(|e| e.starts_with("record"))
        .unwrap();
    assert!(last_start < first_record);
    assert_eq!(count(&events, "disconnect"), 4);
}

#[test]
fn failing_worker_still_disconnects_everyone_once() {
    let events = Arc::new(Mutex::new(Events::default()));
    let list = (0..3)
        .map(|i| {
            Box::new(ScriptedWorker {
                index: i,
                state: WorkerState::Uninitialized,
                fail_record: i == 1,
                fail_disconnect: false,
                events: events.clone(),
            }) as Box<dyn CaptureWorker>
        })
        .collect();
    let mut pool = WorkerPool::from_workers(list, child_options()).unwrap();

    let err = pool.capture(&window(0, 30)).unwrap_err();
    assert!(err.to_string().contains("worker 1 crashed"));
    assert!(
        pool.states()
            .iter()
            .all(|s| *s == WorkerState::Disconnected)
    );

    pool.disconnect_all().unwrap();
    drop(pool);
    assert_eq!(count(&events.lock().unwrap(), "disconnect"), 3);
}

#[test]
fn disconnect_errors_do_not_skip_remaining_workers() {
    let events = Arc::new(Mutex::new(Events::default()));
    let list = (0..3)
        .map(|i| {
            Box::new(ScriptedWorker {
                index: i,
                state: WorkerState::Uninitialized,
                fail_record: false,
                fail_disconnect: i == 0,
                events: events.clone(),
            }) as Box<dyn CaptureWorker>
        })
        .collect();
    let mut pool = WorkerPool::from_workers(list, child_options()).unwrap();

    assert!(pool.disconnect_all().is_err());
    assert_eq!(count(&events.lock().unwrap(), "disconnect"), 3);
}

#[test]
fn dropping_pool_disconnects_workers() {
    let events = Arc::new(Mutex::new(Events::default()));
    let list = (0..2).map(|i| ScriptedWorker::boxed(i, &events)).collect();
    let mut pool = WorkerPool::from_workers(list, child_options()).unwrap();
    pool.start_all().unwrap();
    drop(pool);
    assert_eq!(count(&events.lock().unwrap(), "disconnect"), 2);
}

#[test]
fn spawn_isolated_fills_up_to_multi() {
    struct NoLauncher;
    impl BrowserLauncher for NoLauncher {
        fn launch(&self) -> RenderResult<Box<dyn crate::page::Browser>> {
            Err(RenderError::capture("no browser"))
        }
    }

    let events = Arc::new(Mutex::new(Events::default()));
    let mut pool =
        WorkerPool::from_workers(vec![ScriptedWorker::boxed(0, &events)], child_options())
            .unwrap();
    pool.spawn_isolated(Arc::new(NoLauncher), 3);
    assert_eq!(pool.len(), 3);

    let err = pool.capture(&window(0, 10)).unwrap_err();
    assert!(matches!(err, RenderError::Capture(_)));
    assert_eq!(count(&events.lock().unwrap(), "record"), 0);
    assert_eq!(count(&events.lock().unwrap(), "disconnect"), 1);
}
