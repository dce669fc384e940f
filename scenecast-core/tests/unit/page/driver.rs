use super::*;
use crate::foundation::core::ImageType;

#[test]
fn empty_command_is_rejected() {
    assert!(matches!(
        DriverLauncher::from_command(&[]),
        Err(RenderError::Configuration(_))
    ));
}

#[test]
fn requests_serialize_with_op_tag() {
    let opts = PageOptions {
        name: "scene".to_string(),
        media: "mediaScene".to_string(),
        width: 640,
        height: 480,
        path: "file:///tmp/index.html".to_string(),
        scale: 1.0,
        referer: None,
    };
    let open = serde_json::to_value(Request::Open(&opts)).unwrap();
    assert_eq!(open["op"], "open");
    assert_eq!(open["width"], 640);
    assert!(open.get("referer").is_none());

    let shot = serde_json::to_value(Request::Screenshot {
        page: 1,
        path: Path::new("/tmp/frame0.png"),
        image_type: "png",
        omit_background: true,
        encoding: None,
    })
    .unwrap();
    assert_eq!(shot["op"], "screenshot");
    assert_eq!(shot["omitBackground"], true);
    assert_eq!(shot["type"], "png");
}

#[cfg(unix)]
fn scripted_driver() -> DriverLauncher {
    let script = r#"
while IFS= read -r line; do
  case "$line" in
    *'"op":"open"'*) echo '{"ok":true,"value":{"page":3}}' ;;
    *'"script":"fail()"'*) echo '{"ok":false,"error":"ReferenceError: fail is not defined"}' ;;
    *'"op":"evaluate"'*) echo '{"ok":true,"value":2.5}' ;;
    *'"op":"screenshot"'*) echo '{"ok":true,"value":"aGVsbG8="}' ;;
    *'"op":"close"'*) echo '{"ok":true}'; exit 0 ;;
  esac
done
"#;
    DriverLauncher::from_command(&["sh".to_string(), "-c".to_string(), script.to_string()])
        .unwrap()
}

#[cfg(unix)]
#[test]
fn driver_round_trips_requests() {
    let launcher = scripted_driver();
    let mut browser = launcher.launch().unwrap();
    let mut page = browser
        .open_page(&PageOptions {
            name: "scene".to_string(),
            media: "mediaScene".to_string(),
            width: 64,
            height: 64,
            path: "file:///tmp/index.html".to_string(),
            scale: 1.0,
            referer: Some("https://example.com".to_string()),
        })
        .unwrap();

    assert_eq!(
        page.evaluate("scene.getDuration()").unwrap(),
        serde_json::json!(2.5)
    );

    let err = page.evaluate("fail()").unwrap_err();
    assert!(err.to_string().contains("fail is not defined"));

    let bytes = page
        .screenshot(&ScreenshotRequest {
            path: Path::new("/tmp/unused.png"),
            image_type: ImageType::Png,
            omit_background: false,
            buffer: true,
        })
        .unwrap();
    assert_eq!(bytes.as_deref(), Some(&b"hello"[..]));

    browser.close().unwrap();
    browser.close().unwrap();
    assert!(page.evaluate("scene.getDuration()").is_err());
}
