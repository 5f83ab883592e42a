use std::{fs, path::Path};

use tempfile::TempDir;
use xunzheng::label::{MalformedLinePolicy, Sanitizer, SanitizerConfig, Verdict};

fn write_label(dir: &Path, name: &str, content: &str) {
  fs::write(dir.join(name), content).expect("Failed to write label file");
}

fn dataset() -> (TempDir, Vec<std::path::PathBuf>) {
  let root = TempDir::new().expect("Failed to create temp directory");
  let train = root.path().join("train/labels");
  let valid = root.path().join("valid/labels");
  fs::create_dir_all(&train).unwrap();
  fs::create_dir_all(&valid).unwrap();
  (root, vec![train, valid])
}

#[test]
fn removes_files_with_out_of_range_ids_and_keeps_the_rest() {
  let (_root, dirs) = dataset();
  write_label(&dirs[0], "bad.txt", "0 0.5 0.5 0.1 0.1\n1 0.5 0.5 0.1 0.1\n3 0.5 0.5 0.1 0.1\n");
  write_label(&dirs[0], "good.txt", "0 0.5 0.5 0.1 0.1\n1 0.5 0.5 0.1 0.1\n2 0.5 0.5 0.1 0.1\n");
  write_label(&dirs[1], "also_bad.txt", "2 0.1 0.1 0.1 0.1\n9 0.1 0.1 0.1 0.1\n");
  write_label(&dirs[1], "empty.txt", "");

  let sanitizer = Sanitizer::new(SanitizerConfig::default());
  let mut printed = Vec::new();
  let report = sanitizer
    .run_with(&dirs, |removed| printed.push(removed.path.clone()))
    .unwrap();

  assert!(!dirs[0].join("bad.txt").exists());
  assert!(dirs[0].join("good.txt").exists());
  assert!(!dirs[1].join("also_bad.txt").exists());
  assert!(dirs[1].join("empty.txt").exists());

  assert_eq!(report.scanned, 4);
  assert_eq!(report.kept, 2);
  assert_eq!(report.removed.len(), 2);
  assert_eq!(printed, vec![dirs[0].join("bad.txt"), dirs[1].join("also_bad.txt")]);
  assert_eq!(
    report.removed[0].verdict,
    Verdict::OutOfRange {
      line: 3,
      category_id: 3
    }
  );
}

#[test]
fn missing_directories_are_skipped() {
  let (root, dirs) = dataset();
  write_label(&dirs[0], "bad.txt", "5 0 0 0 0\n");
  let missing = root.path().join("test/labels");

  let sanitizer = Sanitizer::new(SanitizerConfig::default());
  let report = sanitizer
    .run(&[missing.clone(), dirs[0].clone()])
    .unwrap();

  assert_eq!(report.skipped_dirs, vec![missing]);
  assert_eq!(report.removed.len(), 1);
  assert!(!dirs[0].join("bad.txt").exists());
}

#[test]
fn unrecognized_extensions_and_subdirectories_are_ignored() {
  let (_root, dirs) = dataset();
  write_label(&dirs[0], "notes.md", "9 not a label\n");
  write_label(&dirs[0], "image.jpg", "7 0 0 0 0\n");
  fs::create_dir_all(dirs[0].join("nested.txt")).unwrap();
  write_label(&dirs[0].join("nested.txt"), "deep.txt", "9 0 0 0 0\n");

  let sanitizer = Sanitizer::new(SanitizerConfig::default());
  let report = sanitizer.run(&dirs).unwrap();

  assert_eq!(report.scanned, 0);
  assert!(dirs[0].join("notes.md").exists());
  assert!(dirs[0].join("image.jpg").exists());
  assert!(dirs[0].join("nested.txt/deep.txt").exists());
}

#[test]
fn malformed_lines_keep_the_file_by_default() {
  let (_root, dirs) = dataset();
  write_label(&dirs[0], "odd.txt", "0 0 0 0 0\nknife 0 0 0 0\n9 0 0 0 0\n");

  let sanitizer = Sanitizer::new(SanitizerConfig::default());
  let report = sanitizer.run(&dirs).unwrap();

  assert!(dirs[0].join("odd.txt").exists());
  assert_eq!(report.kept, 1);
  assert_eq!(report.malformed.len(), 1);
  assert!(matches!(
    report.malformed[0].verdict,
    Verdict::Malformed { line: 2, .. }
  ));
}

#[test]
fn malformed_policy_can_skip_or_delete() {
  let (_root, dirs) = dataset();
  write_label(&dirs[0], "skip_then_bad.txt", "foo\n9 0 0 0 0\n");
  write_label(&dirs[1], "skip_then_good.txt", "foo\n1 0 0 0 0\n");

  let skip = Sanitizer::new(SanitizerConfig {
    on_malformed: MalformedLinePolicy::Skip,
    ..SanitizerConfig::default()
  });
  let report = skip.run(&dirs).unwrap();
  assert!(!dirs[0].join("skip_then_bad.txt").exists());
  assert!(dirs[1].join("skip_then_good.txt").exists());
  assert_eq!(report.removed.len(), 1);

  let delete = Sanitizer::new(SanitizerConfig {
    on_malformed: MalformedLinePolicy::Delete,
    ..SanitizerConfig::default()
  });
  let report = delete.run(&dirs).unwrap();
  assert!(!dirs[1].join("skip_then_good.txt").exists());
  assert_eq!(report.removed.len(), 1);
}

#[test]
fn max_class_and_extensions_are_configurable() {
  let (_root, dirs) = dataset();
  write_label(&dirs[0], "wide.txt", "5 0 0 0 0\n");
  write_label(&dirs[0], "wide.lbl", "6 0 0 0 0\n");

  let sanitizer = Sanitizer::new(SanitizerConfig {
    max_class: 5,
    extensions: vec!["txt".into(), "lbl".into()],
    ..SanitizerConfig::default()
  });
  let report = sanitizer.run(&dirs[..1]).unwrap();

  assert_eq!(report.scanned, 2);
  assert!(dirs[0].join("wide.txt").exists());
  assert!(!dirs[0].join("wide.lbl").exists());
}

#[test]
fn undecodable_file_does_not_stop_the_run() {
  let (_root, dirs) = dataset();
  fs::write(dirs[0].join("binary.txt"), b"\xff\xd8\xff\xe0 0 0 0 0\n").unwrap();
  write_label(&dirs[1], "bad.txt", "4 0 0 0 0\n");

  let sanitizer = Sanitizer::new(SanitizerConfig::default());
  let report = sanitizer.run(&dirs).unwrap();

  assert!(dirs[0].join("binary.txt").exists());
  assert!(!dirs[1].join("bad.txt").exists());
  assert_eq!(report.scanned, 2);
  assert_eq!(report.malformed.len(), 1);
  assert_eq!(report.removed.len(), 1);
}
