// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/label.rs - 数据集标注文件解析与校验
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

use std::{
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use thiserror::Error;
use tracing::debug;

mod sanitizer;
pub use self::sanitizer::{
  FileVerdict, SanitizeReport, Sanitizer, SanitizerConfig, removal_message,
};

/// 默认最大类别 ID（闭区间上界），对应 0, 1, 2 共三个类别
pub const DEFAULT_MAX_CLASS: i64 = 2;

/// 默认扫描的标注目录
pub const DEFAULT_LABEL_DIRS: [&str; 3] = [
  "dataset/train/labels",
  "dataset/valid/labels",
  "dataset/test/labels",
];

/// 默认识别的标注文件扩展名
pub const DEFAULT_LABEL_EXTENSIONS: [&str; 1] = ["txt"];

/// 标注文件中的一行：类别 ID 加几何字段
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
  pub category_id: i64,
  /// 几何字段，校验时不使用
  pub geometry: Vec<f32>,
}

impl AnnotationRecord {
  /// 类别 ID 是否落在 `[0, max_class]` 内
  pub fn in_range(&self, max_class: i64) -> bool {
    (0..=max_class).contains(&self.category_id)
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelParseError {
  #[error("无法解析类别 ID: {token:?}")]
  InvalidClassId { token: String },
  #[error("该行不是合法的 UTF-8 文本")]
  InvalidEncoding,
}

/// 解析一行标注。空行返回 `Ok(None)`。
///
/// 首个空白分隔的字段必须是整数；几何字段按浮点数宽松解析，无法解析的字段被忽略。
pub fn parse_record(line: &str) -> Result<Option<AnnotationRecord>, LabelParseError> {
  let mut tokens = line.split_whitespace();
  let Some(head) = tokens.next() else {
    return Ok(None);
  };

  let category_id = head
    .parse::<i64>()
    .map_err(|_| LabelParseError::InvalidClassId {
      token: head.to_string(),
    })?;
  let geometry = tokens.filter_map(|t| t.parse::<f32>().ok()).collect();

  Ok(Some(AnnotationRecord {
    category_id,
    geometry,
  }))
}

/// 遇到无法解析的行时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
  /// 停止校验该文件并保留它
  #[default]
  Abort,
  /// 跳过该行，继续校验
  Skip,
  /// 视为非法文件并删除
  Delete,
}

impl FromStr for MalformedLinePolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "abort" => Ok(MalformedLinePolicy::Abort),
      "skip" => Ok(MalformedLinePolicy::Skip),
      "delete" => Ok(MalformedLinePolicy::Delete),
      other => Err(format!(
        "未知的处理方式 '{}', 可选: abort, skip, delete",
        other
      )),
    }
  }
}

impl fmt::Display for MalformedLinePolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MalformedLinePolicy::Abort => "abort",
      MalformedLinePolicy::Skip => "skip",
      MalformedLinePolicy::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// 单个标注文件的校验结论，行号从 1 开始
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
  Valid,
  OutOfRange {
    line: usize,
    category_id: i64,
  },
  Malformed {
    line: usize,
    error: LabelParseError,
    remove: bool,
  },
}

impl Verdict {
  pub fn should_remove(&self) -> bool {
    match self {
      Verdict::Valid => false,
      Verdict::OutOfRange { .. } => true,
      Verdict::Malformed { remove, .. } => *remove,
    }
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::Valid => write!(f, "valid"),
      Verdict::OutOfRange { category_id, .. } => {
        write!(f, "Invalid class ID: {}", category_id)
      }
      Verdict::Malformed { line, error, .. } => write!(f, "Malformed line {}: {}", line, error),
    }
  }
}

/// 逐行校验标注内容，在第一个越界类别 ID 处停止
pub fn validate_content(content: &str, max_class: i64, policy: MalformedLinePolicy) -> Verdict {
  validate_bytes(content.as_bytes(), max_class, policy)
}

/// 同 [`validate_content`]，按字节读取；非 UTF-8 的行按无法解析的行处理
pub fn validate_bytes(content: &[u8], max_class: i64, policy: MalformedLinePolicy) -> Verdict {
  for (index, raw) in content.split(|&b| b == b'\n').enumerate() {
    let line_no = index + 1;
    let parsed = std::str::from_utf8(raw)
      .map_err(|_| LabelParseError::InvalidEncoding)
      .and_then(parse_record);
    match parsed {
      Ok(None) => continue,
      Ok(Some(record)) => {
        if !record.in_range(max_class) {
          return Verdict::OutOfRange {
            line: line_no,
            category_id: record.category_id,
          };
        }
      }
      Err(error) => match policy {
        MalformedLinePolicy::Skip => {
          debug!("跳过第 {} 行: {}", line_no, error);
          continue;
        }
        MalformedLinePolicy::Abort => {
          return Verdict::Malformed {
            line: line_no,
            error,
            remove: false,
          };
        }
        MalformedLinePolicy::Delete => {
          return Verdict::Malformed {
            line: line_no,
            error,
            remove: true,
          };
        }
      },
    }
  }

  Verdict::Valid
}

#[derive(Error, Debug)]
pub enum SanitizeError {
  #[error("读取目录失败 {path}: {source}")]
  ReadDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("读取标注文件失败 {path}: {source}")]
  ReadFile {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("删除标注文件失败 {path}: {source}")]
  RemoveFile {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// 读取并校验单个标注文件
pub fn validate_file(
  path: &Path,
  max_class: i64,
  policy: MalformedLinePolicy,
) -> Result<Verdict, SanitizeError> {
  let content = std::fs::read(path).map_err(|source| SanitizeError::ReadFile {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(validate_bytes(&content, max_class, policy))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_record_reads_leading_class_id() {
    let record = parse_record("1 0.5 0.5 0.2 0.3").unwrap().unwrap();
    assert_eq!(record.category_id, 1);
    assert_eq!(record.geometry, vec![0.5, 0.5, 0.2, 0.3]);
  }

  #[test]
  fn parse_record_skips_blank_lines() {
    assert_eq!(parse_record(""), Ok(None));
    assert_eq!(parse_record("   \t "), Ok(None));
  }

  #[test]
  fn parse_record_rejects_non_integer_class() {
    let err = parse_record("knife 0.1 0.1 0.2 0.2").unwrap_err();
    assert_eq!(
      err,
      LabelParseError::InvalidClassId {
        token: "knife".to_string()
      }
    );
    assert!(parse_record("1.0 0.1 0.1 0.2 0.2").is_err());
  }

  #[test]
  fn range_is_inclusive_on_both_ends() {
    let record = |id| AnnotationRecord {
      category_id: id,
      geometry: Vec::new(),
    };
    assert!(record(0).in_range(2));
    assert!(record(2).in_range(2));
    assert!(!record(3).in_range(2));
    assert!(!record(-1).in_range(2));
  }

  #[test]
  fn out_of_range_stops_at_first_offending_line() {
    let content = "0 0.1 0.1 0.1 0.1\n1 0.2 0.2 0.2 0.2\n3 0.3 0.3 0.3 0.3\n7 0 0 0 0\n";
    let verdict = validate_content(content, 2, MalformedLinePolicy::Abort);
    assert_eq!(
      verdict,
      Verdict::OutOfRange {
        line: 3,
        category_id: 3
      }
    );
    assert!(verdict.should_remove());
  }

  #[test]
  fn ids_within_range_are_valid() {
    let content = "0 0.1 0.1 0.1 0.1\n1 0.2 0.2 0.2 0.2\n2 0.3 0.3 0.3 0.3\n\n";
    let verdict = validate_content(content, 2, MalformedLinePolicy::Abort);
    assert_eq!(verdict, Verdict::Valid);
    assert!(!verdict.should_remove());
  }

  #[test]
  fn malformed_line_follows_policy() {
    let content = "0 0 0 0 0\nfoo 0 0 0 0\n5 0 0 0 0\n";

    let abort = validate_content(content, 2, MalformedLinePolicy::Abort);
    assert!(matches!(abort, Verdict::Malformed { line: 2, .. }));
    assert!(!abort.should_remove());

    let skip = validate_content(content, 2, MalformedLinePolicy::Skip);
    assert_eq!(
      skip,
      Verdict::OutOfRange {
        line: 3,
        category_id: 5
      }
    );

    let delete = validate_content(content, 2, MalformedLinePolicy::Delete);
    assert!(matches!(delete, Verdict::Malformed { line: 2, .. }));
    assert!(delete.should_remove());
  }

  #[test]
  fn crlf_line_endings_are_accepted() {
    let content = "0 0 0 0 0\r\n2 0 0 0 0\r\n\r\n";
    assert_eq!(
      validate_content(content, 2, MalformedLinePolicy::Abort),
      Verdict::Valid
    );
  }

  #[test]
  fn undecodable_line_follows_policy() {
    let content: &[u8] = b"0 0 0 0 0\n\xff\xfe 0 0 0 0\n9 0 0 0 0\n";

    assert_eq!(
      validate_bytes(content, 2, MalformedLinePolicy::Abort),
      Verdict::Malformed {
        line: 2,
        error: LabelParseError::InvalidEncoding,
        remove: false
      }
    );
    assert_eq!(
      validate_bytes(content, 2, MalformedLinePolicy::Skip),
      Verdict::OutOfRange {
        line: 3,
        category_id: 9
      }
    );
    assert!(validate_bytes(content, 2, MalformedLinePolicy::Delete).should_remove());
  }

  #[test]
  fn verdict_display_names_the_offending_id() {
    let out_of_range = Verdict::OutOfRange {
      line: 3,
      category_id: 7,
    };
    assert_eq!(out_of_range.to_string(), "Invalid class ID: 7");

    let malformed = Verdict::Malformed {
      line: 2,
      error: LabelParseError::InvalidClassId {
        token: "foo".to_string(),
      },
      remove: true,
    };
    assert_eq!(
      malformed.to_string(),
      "Malformed line 2: 无法解析类别 ID: \"foo\""
    );
  }

  #[test]
  fn policy_parses_from_str() {
    assert_eq!(
      "skip".parse::<MalformedLinePolicy>(),
      Ok(MalformedLinePolicy::Skip)
    );
    assert_eq!(
      "DELETE".parse::<MalformedLinePolicy>(),
      Ok(MalformedLinePolicy::Delete)
    );
    assert!("drop".parse::<MalformedLinePolicy>().is_err());
  }
}
