// 该文件是 SpaceGuard 项目的一部分。
// tests/pipeline.rs - 端到端检测流程测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use serde_json::json;
use url::Url;

use spaceguard::{
  FromUrl,
  input::InputWrapper,
  model::ReplayDetector,
  output::{OutputWrapper, draw::Draw},
  postprocess::ResultPostprocessor,
  task::{BatchTask, OneShotTask, Task},
  utils::{DISPLAY_BACKGROUND, letterbox_pad},
};

fn write_raw_output(path: &std::path::Path) {
  let raw = json!({
    "names": {"0": "crack", "1": "leak", "2": "toolbox"},
    "boxes": [
      {"cls": [0.0], "conf": [0.41], "xyxy": [[12.0, 40.0, 60.0, 90.0]]},
      {"cls": 0, "conf": 0.8, "xyxy": [70.0, 30.0, 120.0, 80.0]},
      {"cls": 1, "conf": 0.99, "xyxy": [5.0, 5.0, 5.0, 8.0]},
      {"cls": 2, "conf": 0.1, "xyxy": [0.0, 0.0, 50.0, 50.0]},
      {"cls": 9, "conf": 0.9, "xyxy": [0.0, 0.0, 50.0, 50.0]},
      {"cls": 1, "conf": "high", "xyxy": [0.0, 0.0, 50.0, 50.0]}
    ]
  });
  std::fs::write(path, serde_json::to_vec_pretty(&raw).unwrap()).unwrap();
}

fn url_of(scheme: &str, path: &std::path::Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

#[test]
fn one_shot_writes_annotated_image_and_response() {
  let dir = tempfile::tempdir().unwrap();
  let raw_path = dir.path().join("raw.json");
  let input_path = dir.path().join("input.png");
  let image_path = dir.path().join("out/annotated.png");
  let json_path = dir.path().join("out/response.json");

  write_raw_output(&raw_path);
  let original = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
  original.save(&input_path).unwrap();

  let input = InputWrapper::from_url(&url_of("image", &input_path)).unwrap();
  let detector = ReplayDetector::from_url(&url_of("replay", &raw_path)).unwrap();
  let outputs = vec![
    OutputWrapper::from_url(&url_of("image", &image_path)).unwrap(),
    OutputWrapper::from_url(&Url::parse(&format!("json://{}?summary", json_path.display())).unwrap())
      .unwrap(),
  ];
  let postprocessor = ResultPostprocessor::new(Draw::without_font());

  let report = OneShotTask
    .run_task(input, detector, &postprocessor, outputs)
    .unwrap();
  assert_eq!(report.frames, 1);
  assert_eq!(report.detections, 2);

  let response: serde_json::Value =
    serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
  let detections = response["detections"].as_array().unwrap();
  assert_eq!(detections.len(), 2);
  assert_eq!(detections[0]["class"], "crack");
  assert_eq!(detections[0]["bbox"], json!([12.0, 40.0, 60.0, 90.0]));
  assert_eq!(detections[1]["class"], "crack");
  assert_eq!(response["summary"][0]["class"], "crack");
  assert_eq!(response["summary"][0]["count"], 2);

  let annotated = image::open(&image_path).unwrap().into_rgb8();
  assert_eq!(annotated.dimensions(), original.dimensions());
  let color = postprocessor.draw().color_of(0);
  assert_eq!(*annotated.get_pixel(12, 60), color);
  assert_eq!(*annotated.get_pixel(30, 60), Rgb([20, 20, 20]));
  // 输入文件保持不变
  let reread = image::open(&input_path).unwrap().into_rgb8();
  assert_eq!(reread, original);
}

#[test]
fn batch_records_every_readable_image() {
  let dir = tempfile::tempdir().unwrap();
  let raw_path = dir.path().join("raw.json");
  let images = dir.path().join("images");
  let records = dir.path().join("records");
  std::fs::create_dir_all(&images).unwrap();

  write_raw_output(&raw_path);
  for name in ["a.png", "b.png"] {
    RgbImage::new(160, 120).save(images.join(name)).unwrap();
  }
  std::fs::write(images.join("c.png"), b"broken").unwrap();

  let input = InputWrapper::from_url(&url_of("folder", &images)).unwrap();
  let detector = ReplayDetector::from_url(&url_of("replay", &raw_path)).unwrap();
  let output = OutputWrapper::from_url(&url_of("folder", &records)).unwrap();
  let postprocessor = ResultPostprocessor::new(Draw::without_font());

  let report = BatchTask::default()
    .run_task(input, detector, &postprocessor, output)
    .unwrap();
  assert_eq!(report.frames, 2);
  assert_eq!(report.detections, 4);
  assert!(records.exists());
}

#[test]
fn annotated_image_can_be_letterboxed_for_display() {
  let image = RgbImage::from_pixel(1000, 500, Rgb([200, 10, 10]));
  let padded = letterbox_pad(&image, (800, 450), DISPLAY_BACKGROUND).unwrap();
  assert_eq!(padded.dimensions(), (800, 450));
  assert_eq!(*padded.get_pixel(0, 0), DISPLAY_BACKGROUND);
  assert_eq!(*padded.get_pixel(0, 225), Rgb([200, 10, 10]));
}
