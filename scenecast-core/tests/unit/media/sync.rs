use std::sync::Mutex;

use serde_json::json;

use super::*;
use crate::page::ScreenshotRequest;

struct InfoPage {
    result: RenderResult<serde_json::Value>,
    scripts: Vec<String>,
}

impl Page for InfoPage {
    fn evaluate(&mut self, script: &str) -> RenderResult<serde_json::Value> {
        self.scripts.push(script.to_string());
        match &self.result {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(RenderError::capture(e.to_string())),
        }
    }

    fn screenshot(&mut self, _request: &ScreenshotRequest<'_>) -> RenderResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

fn page_url() -> Url {
    Url::parse("file:///srv/scenes/demo/index.html").unwrap()
}

#[test]
fn media_info_parses_with_defaults() {
    let mut page = InfoPage {
        result: Ok(json!({
            "duration": 4.5,
            "medias": [
                { "url": "./a.mp3", "delay": 1, "seek": [0.5, 3], "playSpeed": 2, "volume": 0.5 },
                { "url": "b.mp3" }
            ]
        })),
        scripts: Vec::new(),
    };
    let info = get_media_info(&mut page, "mediaScene").unwrap();
    assert_eq!(page.scripts, vec!["mediaScene.finish().getInfo()"]);
    assert_eq!(info.duration, 4.5);
    assert_eq!(info.medias.len(), 2);

    let a = &info.medias[0];
    assert_eq!(a.seek_start(), 0.5);
    assert_eq!(a.seek_end(), Some(3.0));
    assert_eq!(a.effective_play_speed(), 2.0);

    let b = &info.medias[1];
    assert_eq!(b.seek_end(), None);
    assert_eq!(b.effective_play_speed(), 1.0);
    assert_eq!(b.effective_volume(), 1.0);
}

#[test]
fn media_info_is_absent_on_errors_and_non_objects() {
    let mut page = InfoPage {
        result: Err(RenderError::capture("mediaScene is not defined")),
        scripts: Vec::new(),
    };
    assert!(get_media_info(&mut page, "mediaScene").is_none());

    let mut page = InfoPage {
        result: Ok(json!(null)),
        scripts: Vec::new(),
    };
    assert!(get_media_info(&mut page, "mediaScene").is_none());

    let mut page = InfoPage {
        result: Ok(json!({ "duration": 1 })),
        scripts: Vec::new(),
    };
    assert!(get_media_info(&mut page, "").is_none());
    assert!(page.scripts.is_empty());
}

#[test]
fn sources_resolve_against_the_page() {
    assert_eq!(
        resolve_media_source("./audio/a.mp3", &page_url()).unwrap(),
        MediaSource::Local(PathBuf::from("/srv/scenes/demo/audio/a.mp3"))
    );
    assert_eq!(
        resolve_media_source("file:///tmp/b.mp3", &page_url()).unwrap(),
        MediaSource::Local(PathBuf::from("/tmp/b.mp3"))
    );

    let remote = Url::parse("https://example.com/scene/index.html").unwrap();
    assert_eq!(
        resolve_media_source("c.mp3", &remote).unwrap(),
        MediaSource::Remote(Url::parse("https://example.com/scene/c.mp3").unwrap())
    );
    assert!(matches!(
        resolve_media_source("data:audio/mp3;base64,AAAA", &page_url()),
        Err(RenderError::Media(_))
    ));
}

#[test]
fn resolve_tracks_fetches_each_source_once() {
    let seen = Mutex::new(Vec::new());
    let fetch = |source: &MediaSource| -> RenderResult<Vec<u8>> {
        seen.lock().unwrap().push(source.clone());
        Ok(vec![1, 2, 3])
    };
    let info = MediaSceneInfo {
        duration: 2.0,
        medias: vec![
            MediaTrack {
                url: "a.mp3".to_string(),
                ..MediaTrack::default()
            },
            MediaTrack::default(),
        ],
    };
    let tracks = resolve_tracks(&info, &page_url(), &fetch).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].bytes, vec![1, 2, 3]);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn default_fetch_reads_local_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.mp3");
    std::fs::write(&path, b"ID3").unwrap();

    let fetch = DefaultFetchFile::new(None).unwrap();
    assert_eq!(fetch.fetch(&MediaSource::Local(path)).unwrap(), b"ID3");
    assert!(matches!(
        fetch.fetch(&MediaSource::Local(dir.path().join("missing.mp3"))),
        Err(RenderError::Media(_))
    ));
}
