// 该文件是 Xunzheng （寻证） 项目的一部分。
// src/bin/sanitize_labels.rs - 删除含非法类别 ID 的标注文件
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use xunzheng::label::{
  DEFAULT_LABEL_DIRS, DEFAULT_LABEL_EXTENSIONS, DEFAULT_MAX_CLASS, MalformedLinePolicy,
  Sanitizer, SanitizerConfig, removal_message,
};

/// 标注清理参数，不带参数运行时扫描默认数据集目录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 标注目录，可重复指定
  #[arg(long = "dir", value_name = "DIR", default_values_t = DEFAULT_LABEL_DIRS.map(String::from))]
  pub dirs: Vec<String>,

  /// 最大类别 ID（包含）
  #[arg(long, default_value_t = DEFAULT_MAX_CLASS, value_name = "ID")]
  pub max_class: i64,

  /// 标注文件扩展名，可重复指定
  #[arg(long = "ext", value_name = "EXT", default_values_t = DEFAULT_LABEL_EXTENSIONS.map(String::from))]
  pub extensions: Vec<String>,

  /// 遇到无法解析的行时的处理方式: abort（保留文件）, skip（跳过该行）, delete（删除文件）
  #[arg(long, default_value_t = MalformedLinePolicy::Abort, value_name = "POLICY")]
  pub on_malformed: MalformedLinePolicy,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("标注目录: {:?}", args.dirs);
  info!("最大类别 ID: {}", args.max_class);
  info!("文件扩展名: {:?}", args.extensions);
  info!("无法解析的行: {}", args.on_malformed);

  let sanitizer = Sanitizer::new(SanitizerConfig {
    max_class: args.max_class,
    extensions: args.extensions,
    on_malformed: args.on_malformed,
  });

  let report = sanitizer.run_with(args.dirs.as_slice(), |removed| {
    println!("{}", removal_message(removed));
  })?;

  for kept in &report.malformed {
    warn!("已保留但未完成校验: {} ({})", kept.path.display(), kept.verdict);
  }
  info!(
    "处理完成: 扫描 {} 个文件, 删除 {} 个, 跳过 {} 个不存在的目录",
    report.scanned,
    report.removed.len(),
    report.skipped_dirs.len()
  );

  Ok(())
}
