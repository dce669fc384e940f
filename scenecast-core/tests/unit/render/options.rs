use super::*;

#[test]
fn defaults_match_documented_values() {
    let o = RenderOptions::default();
    assert_eq!(o.name, "scene");
    assert_eq!(o.media, "mediaScene");
    assert_eq!((o.fps, o.width, o.height), (60, 1920, 1080));
    assert_eq!(o.input, "./index.html");
    assert_eq!(o.output, "output.mp4");
    assert_eq!(o.bitrate, "4096k");
    assert_eq!(o.multi, 1);
    assert_eq!(o.image_type, ImageType::Png);
    assert_eq!(o.cache_folder, PathBuf::from(".scene_cache"));
    assert!(!o.alpha && !o.cache && !o.buffer);
    o.validate().unwrap();
}

#[test]
fn json_uses_camel_case_and_lenient_flags() {
    let o: RenderOptions = serde_json::from_str(
        r#"{
            "fps": 30,
            "startTime": 1.5,
            "imageType": "jpeg",
            "cacheFolder": "tmp/cache",
            "alpha": 1,
            "cache": true,
            "ffmpegPath": "/usr/bin/ffmpeg",
            "cpuUsed": 4
        }"#,
    )
    .unwrap();
    assert_eq!(o.fps, 30);
    assert_eq!(o.start_time, 1.5);
    assert_eq!(o.image_type, ImageType::Jpeg);
    assert_eq!(o.cache_folder, PathBuf::from("tmp/cache"));
    assert!(o.alpha);
    assert!(o.cache);
    assert_eq!(o.ffmpeg_path, Some(PathBuf::from("/usr/bin/ffmpeg")));
    assert_eq!(o.cpu_used, Some(4));
    assert_eq!(o.width, 1920);

    let o: RenderOptions = serde_json::from_str(r#"{ "alpha": 0, "buffer": null }"#).unwrap();
    assert!(!o.alpha && !o.buffer);
    assert!(serde_json::from_str::<RenderOptions>(r#"{ "alpha": "yes" }"#).is_err());
}

#[test]
fn validate_rejects_bad_values() {
    let cases: [fn(&mut RenderOptions); 6] = [
        |o| o.fps = 0,
        |o| o.width = 0,
        |o| o.scale = 0.0,
        |o| o.duration = -1.0,
        |o| o.output = " , ".to_string(),
        |o| o.driver.clear(),
    ];
    for mutate in cases {
        let mut o = RenderOptions::default();
        mutate(&mut o);
        assert!(matches!(o.validate(), Err(RenderError::Configuration(_))));
    }
}

#[test]
fn zero_workers_is_accepted() {
    let o = RenderOptions {
        multi: 0,
        ..RenderOptions::default()
    };
    o.validate().unwrap();
}

#[test]
fn from_path_reads_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("render.json");
    std::fs::write(&path, r#"{ "output": "a.webm,a.mp3", "multi": 4 }"#).unwrap();
    let o = RenderOptions::from_path(&path).unwrap();
    assert_eq!(o.output, "a.webm,a.mp3");
    assert_eq!(o.multi, 4);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        RenderOptions::from_path(&path),
        Err(RenderError::Serde(_))
    ));
    assert!(RenderOptions::from_path(&dir.path().join("missing.json")).is_err());
}

#[test]
fn debug_hides_hook_body() {
    let mut o = RenderOptions::default();
    o.created = Some(Arc::new(|_r: &mut dyn Recorder| {}));
    assert!(format!("{o:?}").contains("created: Some(\"Fn\")"));
}
