// 该文件是 SpaceGuard 项目的一部分。
// src/input/read_image_file.rs - 图像文件与图像目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_path};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

fn read_image(path: &Path) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  Ok(image.into_rgb8())
}

/// 单张图像输入，打开时立即解码，解码失败直接返回错误
pub struct ImageFileInput {
  path: String,
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl Into<String>) -> Result<Self, ImageFileInputError> {
    let path = path.into();
    let image = read_image(Path::new(&path))?;
    debug!("读取图像 {}: {}x{}", path, image.width(), image.height());
    Ok(ImageFileInput {
      path,
      image: Some(image),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self
      .image
      .take()
      .map(|image| Frame::new(0, self.path.clone(), image))
  }
}

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 图像目录输入：按文件名排序，逐个解码；无法读取的文件记录错误后跳过
pub struct ImageFolderInput {
  files: std::vec::IntoIter<PathBuf>,
  index: usize,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFolderInputError::SchemaMismatch);
    }

    Self::open(url_path(url))
  }
}

impl ImageFolderInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, ImageFolderInputError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory.as_ref())? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    debug!(
      "目录 {} 中找到 {} 张图像",
      directory.as_ref().display(),
      files.len()
    );

    Ok(ImageFolderInput {
      files: files.into_iter(),
      index: 0,
    })
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    })
    .unwrap_or(false)
}

impl Iterator for ImageFolderInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      match read_image(&path) {
        Ok(image) => {
          let frame = Frame::new(self.index, path.display().to_string(), image);
          self.index += 1;
          return Some(frame);
        }
        Err(e) => error!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn image_file_yields_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.png");
    RgbImage::from_pixel(4, 3, Rgb([9, 8, 7])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let frame = input.next().unwrap();
    assert_eq!(frame.image.dimensions(), (4, 3));
    assert_eq!(frame.stem(), "in");
    assert!(input.next().is_none());
  }

  #[test]
  fn unreadable_image_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not a png").unwrap();

    assert!(matches!(
      ImageFileInput::open(path.display().to_string()),
      Err(ImageFileInputError::ImageLoadError(_))
    ));
    assert!(matches!(
      ImageFileInput::open(dir.path().join("missing.png").display().to_string()),
      Err(ImageFileInputError::IoError(_))
    ));
  }

  #[test]
  fn folder_skips_broken_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(3, 3).save(dir.path().join("a.PNG")).unwrap();
    std::fs::write(dir.path().join("c.jpg"), b"garbage").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    let input = ImageFolderInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 3);

    let frames: Vec<Frame> = input.collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].stem(), "a");
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].stem(), "b");
    assert_eq!(frames[1].index, 1);
  }
}
