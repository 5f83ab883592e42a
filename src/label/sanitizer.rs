// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/label/sanitizer.rs - 非法标注文件清理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{
  DEFAULT_LABEL_EXTENSIONS, DEFAULT_MAX_CLASS, MalformedLinePolicy, SanitizeError, Verdict,
  validate_file,
};

#[derive(Debug, Clone)]
pub struct SanitizerConfig {
  pub max_class: i64,
  pub extensions: Vec<String>,
  pub on_malformed: MalformedLinePolicy,
}

impl Default for SanitizerConfig {
  fn default() -> Self {
    Self {
      max_class: DEFAULT_MAX_CLASS,
      extensions: DEFAULT_LABEL_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect(),
      on_malformed: MalformedLinePolicy::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileVerdict {
  pub path: PathBuf,
  pub verdict: Verdict,
}

/// 删除文件时输出到标准输出的提示，例如 `❌ Removing train/labels/a.txt → Invalid class ID: 3`
pub fn removal_message(removed: &FileVerdict) -> String {
  format!(
    "❌ Removing {} → {}",
    removed.path.display(),
    removed.verdict
  )
}

#[derive(Debug, Default)]
pub struct SanitizeReport {
  pub scanned: usize,
  pub kept: usize,
  pub removed: Vec<FileVerdict>,
  /// 含有无法解析的行、但按策略保留的文件
  pub malformed: Vec<FileVerdict>,
  pub skipped_dirs: Vec<PathBuf>,
}

pub struct Sanitizer {
  config: SanitizerConfig,
}

impl Sanitizer {
  pub fn new(config: SanitizerConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SanitizerConfig {
    &self.config
  }

  pub fn run<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<SanitizeReport, SanitizeError> {
    self.run_with(dirs, |_| {})
  }

  /// 扫描各目录并删除非法标注文件，每删除一个文件回调一次 `on_remove`。
  ///
  /// 不存在的目录会被跳过；目录只扫描一层。删除不可恢复。
  pub fn run_with<P, F>(&self, dirs: &[P], mut on_remove: F) -> Result<SanitizeReport, SanitizeError>
  where
    P: AsRef<Path>,
    F: FnMut(&FileVerdict),
  {
    let mut report = SanitizeReport::default();

    for dir in dirs {
      let dir = dir.as_ref();
      if !dir.is_dir() {
        info!("目录不存在，跳过: {}", dir.display());
        report.skipped_dirs.push(dir.to_path_buf());
        continue;
      }

      info!("扫描标注目录: {}", dir.display());
      for path in self.label_files(dir)? {
        report.scanned += 1;
        let verdict = validate_file(&path, self.config.max_class, self.config.on_malformed)?;

        if verdict.should_remove() {
          std::fs::remove_file(&path).map_err(|source| SanitizeError::RemoveFile {
            path: path.clone(),
            source,
          })?;
          let removed = FileVerdict { path, verdict };
          on_remove(&removed);
          report.removed.push(removed);
          continue;
        }

        report.kept += 1;
        if let Verdict::Malformed { line, error, .. } = &verdict {
          warn!(
            "文件 {} 第 {} 行无法解析 ({}), 已保留",
            path.display(),
            line,
            error
          );
          report.malformed.push(FileVerdict { path, verdict });
        }
      }
    }

    info!(
      "扫描 {} 个文件, 保留 {} 个, 删除 {} 个",
      report.scanned,
      report.kept,
      report.removed.len()
    );
    Ok(report)
  }

  fn label_files(&self, dir: &Path) -> Result<Vec<PathBuf>, SanitizeError> {
    let read_dir = |source: std::io::Error| SanitizeError::ReadDir {
      path: dir.to_path_buf(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir)? {
      let path = entry.map_err(read_dir)?.path();
      if path.is_file() && self.is_label_file(&path) {
        files.push(path);
      } else {
        debug!("忽略: {}", path.display());
      }
    }
    files.sort();
    Ok(files)
  }

  fn is_label_file(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| self.config.extensions.iter().any(|known| known == ext))
      .unwrap_or(false)
  }
}
