use super::*;

fn config(format: VideoFormat) -> EncodeConfig {
    EncodeConfig {
        program: PathBuf::from("ffmpeg"),
        width: 16,
        height: 16,
        fps: 30,
        format,
        codec: None,
        bitrate: "4096k".to_string(),
        cpu_used: None,
        alpha: false,
        audio: None,
        out_path: PathBuf::from("out/video.mp4"),
        log: false,
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[test]
fn config_validation_catches_bad_values() {
    let mut cfg = config(VideoFormat::Mp4);
    cfg.width = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = config(VideoFormat::Mp4);
    cfg.fps = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = config(VideoFormat::Mp4);
    cfg.bitrate = " ".to_string();
    assert!(cfg.validate().is_err());

    let mut cfg = config(VideoFormat::Mp4);
    cfg.audio = Some(AudioInputConfig {
        path: PathBuf::from("merge.mp3"),
        offset_sec: 0.0,
        duration_sec: 0.0,
    });
    assert!(matches!(cfg.validate(), Err(RenderError::Encode(_))));

    let mut cfg = config(VideoFormat::Mp4);
    cfg.width = 15;
    assert!(cfg.validate().is_ok());
}

#[test]
fn codec_falls_back_to_container_default() {
    assert_eq!(config(VideoFormat::Mp4).codec(), "libx264");
    assert_eq!(config(VideoFormat::Webm).codec(), "libvpx-vp9");

    let mut cfg = config(VideoFormat::Mp4);
    cfg.codec = Some("libx265".to_string());
    assert_eq!(cfg.codec(), "libx265");
}

#[test]
fn output_args_for_mp4_without_audio() {
    let args = output_args(&config(VideoFormat::Mp4));
    assert_eq!(arg_after(&args, "-c:v"), Some("libx264"));
    assert_eq!(arg_after(&args, "-b:v"), Some("4096k"));
    assert_eq!(arg_after(&args, "-pix_fmt"), Some("yuv420p"));
    assert_eq!(arg_after(&args, "-movflags"), Some("+faststart"));
    assert!(args.iter().any(|a| a == "-an"));
    assert!(!args.iter().any(|a| a == "-cpu-used"));
}

#[test]
fn output_args_for_transparent_webm_with_audio() {
    let mut cfg = config(VideoFormat::Webm);
    cfg.alpha = true;
    cfg.cpu_used = Some(4);
    cfg.audio = Some(AudioInputConfig {
        path: PathBuf::from("merge.mp3"),
        offset_sec: 1.0,
        duration_sec: 2.0,
    });
    assert!(cfg.keeps_alpha());

    let args = output_args(&cfg);
    assert_eq!(arg_after(&args, "-pix_fmt"), Some("yuva420p"));
    assert_eq!(arg_after(&args, "-cpu-used"), Some("4"));
    assert_eq!(arg_after(&args, "-c:a"), Some("libopus"));
    assert!(args.iter().any(|a| a == "1:a:0"));
    assert!(!args.iter().any(|a| a == "-an"));
    assert!(!args.iter().any(|a| a == "-movflags"));
}

#[test]
fn alpha_is_dropped_for_mp4() {
    let mut cfg = config(VideoFormat::Mp4);
    cfg.alpha = true;
    assert!(!cfg.keeps_alpha());
    assert_eq!(arg_after(&output_args(&cfg), "-pix_fmt"), Some("yuv420p"));
}

#[test]
fn flatten_straight_over_black_produces_expected_rgb() {
    let src = vec![255u8, 0, 0, 128, 10, 20, 30, 255];
    let mut dst = vec![0u8; 8];
    flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
    assert_eq!(dst, vec![128u8, 0, 0, 255, 10, 20, 30, 255]);
}

#[test]
fn flatten_rejects_mismatched_buffers() {
    let mut dst = vec![0u8; 4];
    assert!(flatten_to_opaque_rgba8(&mut dst, &[0u8; 8], [0, 0, 0, 255]).is_err());
}

#[test]
fn missing_program_is_reported() {
    assert!(!is_ffmpeg_available(Path::new("/nonexistent/ffmpeg-binary")));
    let mut cfg = config(VideoFormat::Mp4);
    cfg.program = PathBuf::from("/nonexistent/ffmpeg-binary");
    let dir = tempfile::tempdir().unwrap();
    cfg.out_path = dir.path().join("video.mp4");
    assert!(matches!(FfmpegEncoder::new(cfg), Err(RenderError::Encode(_))));
}

#[test]
fn streams_frames_into_ffmpeg_when_available() {
    if !is_ffmpeg_available(Path::new("ffmpeg")) {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(VideoFormat::Mp4);
    cfg.out_path = dir.path().join("video.mp4");

    let mut enc = FfmpegEncoder::new(cfg.clone()).unwrap();
    let frame = vec![200u8; 16 * 16 * 4];
    for _ in 0..3 {
        enc.push_frame(&frame).unwrap();
    }
    assert!(enc.push_frame(&frame[..4]).is_err());
    assert_eq!(enc.frames(), 3);
    enc.finish().unwrap();
    assert!(std::fs::metadata(&cfg.out_path).unwrap().len() > 0);
}
