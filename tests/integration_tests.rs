/// Integration tests for origsort
///
/// These tests build real directory trees and run the complete
/// correction + walk + classify + move pipeline over them.
///
/// Test categories:
/// 1. End-to-end scenarios
/// 2. Idempotence and root-level exclusion
/// 3. Collision safety
/// 4. Spreadsheets
/// 5. Configuration, dry run and cancellation
/// 6. Error resilience
use origsort::cli::{Args, run_cli};
use origsort::config::SorterConfig;
use origsort::events::{CancelToken, Event, EventSink, MemorySink, SilentSink};
use origsort::organizer::{MoveOutcome, Reorganizer, RunOptions, RunSummary};
use origsort::SortError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A temporary tree with helpers to populate and inspect it.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestFixture { temp_dir }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file (and any parent directories) with content.
    fn create_file(&self, rel_path: &str, content: &str) {
        let path = self.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write file");
    }

    fn create_subdir(&self, rel_path: &str) {
        fs::create_dir_all(self.path().join(rel_path)).expect("Failed to create subdirectory");
    }

    fn read(&self, rel_path: &str) -> String {
        fs::read_to_string(self.path().join(rel_path)).expect("Failed to read file")
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    /// All files in the tree, relative to the root, sorted.
    fn list_files_recursive(&self) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        Self::walk_dir(self.path(), self.path(), &mut files);
        files
    }

    fn walk_dir(root: &Path, dir: &Path, files: &mut BTreeSet<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.insert(path.strip_prefix(root).unwrap().to_path_buf());
                } else if path.is_dir() {
                    Self::walk_dir(root, &path, files);
                }
            }
        }
    }

    /// Names of the files directly inside `rel_dir`.
    fn files_in(&self, rel_dir: &str) -> BTreeSet<String> {
        fs::read_dir(self.path().join(rel_dir))
            .expect("Failed to read directory")
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    /// Every file's content, as a multiset, so nothing is silently lost.
    fn all_contents(&self) -> Vec<String> {
        let mut contents: Vec<String> = self
            .list_files_recursive()
            .iter()
            .map(|rel| fs::read_to_string(self.path().join(rel)).unwrap())
            .collect();
        contents.sort();
        contents
    }

    fn run(&self) -> RunSummary {
        self.run_with(&SorterConfig::default(), RunOptions::default())
    }

    fn run_with(&self, config: &SorterConfig, options: RunOptions) -> RunSummary {
        Reorganizer::new(self.path(), config)
            .expect("Failed to create organizer")
            .with_options(options)
            .run(&SilentSink)
            .expect("Run failed")
    }

    fn run_collecting_events(&self) -> (RunSummary, Vec<Event>) {
        let sink = MemorySink::new();
        let summary = Reorganizer::new(self.path(), &SorterConfig::default())
            .expect("Failed to create organizer")
            .run(&sink)
            .expect("Run failed");
        (summary, sink.events())
    }
}

// ============================================================================
// Test Suite 1: End-to-end scenarios
// ============================================================================

#[test]
fn test_basic_scenario() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/修改后_a.jpg", "a");
    fixture.create_file("sub/b.jpg", "b");
    fixture.create_file("sub/report.xlsx", "r");

    let summary = fixture.run();

    fixture.assert_file_exists("处理图/修改后_a.jpg");
    fixture.assert_file_exists("原图/b.jpg");
    fixture.assert_file_exists("report.xlsx");
    assert!(fixture.files_in("sub").is_empty());
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.failed, 0);
}

#[test]
fn test_correction_scenario() {
    let fixture = TestFixture::new();
    fixture.create_file("原图/修改后_x.jpg", "x");
    fixture.create_file("原图/y.jpg", "y");

    let summary = fixture.run();

    fixture.assert_file_exists("处理图/修改后_x.jpg");
    fixture.assert_file_exists("原图/y.jpg");
    fixture.assert_file_not_exists("原图/修改后_x.jpg");
    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.total(), 1);
}

#[test]
fn test_correction_then_main_pass() {
    let fixture = TestFixture::new();
    fixture.create_file("原图/拷贝.png", "old");
    fixture.create_file("new/拷贝.png", "new");

    let summary = fixture.run();

    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(fixture.read("处理图/拷贝.png"), "old");
    assert_eq!(fixture.read("处理图/拷贝_1.png"), "new");
}

#[test]
fn test_deeply_nested_tree_is_consolidated() {
    let fixture = TestFixture::new();
    fixture.create_file("用户/第一级/第二级/普通图片1.jpg", "1");
    fixture.create_file("用户/第一级/第二级/IMG_2.png", "2");
    fixture.create_file("用户/第一级/第二级/第三级/IMG_3.png", "3");
    fixture.create_file("top.txt", "4");

    fixture.run();

    assert_eq!(
        fixture.files_in("原图"),
        ["IMG_2.png", "IMG_3.png", "top.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    );
    assert_eq!(
        fixture.files_in("处理图"),
        ["普通图片1.jpg"].iter().map(|s| s.to_string()).collect()
    );
    // Directories are left behind, empty of files.
    assert!(fixture.path().join("用户/第一级/第二级").is_dir());
    assert!(fixture.files_in("用户/第一级/第二级").is_empty());
}

// ============================================================================
// Test Suite 2: Idempotence and root-level exclusion
// ============================================================================

#[test]
fn test_second_run_changes_nothing() {
    let fixture = TestFixture::new();
    fixture.create_file("a/IMG_1.jpg", "1");
    fixture.create_file("a/IMG_1修改后.jpg", "2");
    fixture.create_file("b/IMG_1.jpg", "3");
    fixture.create_file("b/data.XLS", "4");
    fixture.create_file("原图/改后_old.jpg", "5");
    fixture.create_file("处理图/改后_old.jpg", "6");

    fixture.run();
    let after_first = fixture.list_files_recursive();
    let contents_first = fixture.all_contents();

    let second = fixture.run();

    assert_eq!(fixture.list_files_recursive(), after_first);
    assert_eq!(fixture.all_contents(), contents_first);
    assert_eq!(second.total(), 0);
    assert_eq!(second.renamed, 0);
    assert_eq!(second.failed, 0);
    assert!(second.outcomes.iter().all(|r| matches!(r.outcome, MoveOutcome::Skipped { .. })));
}

#[test]
fn test_root_level_destination_files_are_not_candidates() {
    let fixture = TestFixture::new();
    fixture.create_file("原图/a.jpg", "root-level");
    fixture.create_file("sub/原图/a.jpg", "nested");

    let (summary, events) = fixture.run_collecting_events();

    assert_eq!(summary.candidates, 1);
    assert_eq!(fixture.read("原图/a.jpg"), "root-level");
    assert_eq!(fixture.read("原图/a_1.jpg"), "nested");
    fixture.assert_file_not_exists("sub/原图/a.jpg");
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ClassificationFolderFound { path } if path.ends_with("原图")
    )));
}

#[test]
fn test_nested_modified_folder_contents_are_reclassified() {
    let fixture = TestFixture::new();
    // An ASCII name in a stray nested modified folder belongs with originals.
    fixture.create_file("sub/处理图/plain.jpg", "p");
    fixture.create_file("原图/deeper/拷贝.jpg", "c");

    fixture.run();

    fixture.assert_file_exists("原图/plain.jpg");
    fixture.assert_file_exists("处理图/拷贝.jpg");
}

// ============================================================================
// Test Suite 3: Collision safety
// ============================================================================

#[test]
fn test_rename_on_collision_keeps_existing_file() {
    let fixture = TestFixture::new();
    fixture.create_file("原图/c.jpg", "existing");
    fixture.create_file("incoming/c.jpg", "incoming");

    let summary = fixture.run();

    assert_eq!(fixture.read("原图/c.jpg"), "existing");
    assert_eq!(fixture.read("原图/c_1.jpg"), "incoming");
    assert_eq!(summary.renamed, 1);
    assert!(summary.outcomes.iter().any(|r| matches!(
        &r.outcome,
        MoveOutcome::Renamed { original_name, final_name, .. }
            if original_name == "c.jpg" && final_name == "c_1.jpg"
    )));
}

#[test]
fn test_same_name_from_many_folders_never_overwrites() {
    let fixture = TestFixture::new();
    for i in 0..5 {
        fixture.create_file(&format!("dir{}/photo.jpg", i), &format!("content {}", i));
    }
    let before = fixture.all_contents();

    fixture.run();

    assert_eq!(fixture.files_in("原图").len(), 5);
    assert_eq!(fixture.all_contents(), before);
    for name in ["photo.jpg", "photo_1.jpg", "photo_2.jpg", "photo_3.jpg", "photo_4.jpg"] {
        fixture.assert_file_exists(&format!("原图/{}", name));
    }
}

#[test]
fn test_no_file_lost_in_mixed_tree() {
    let fixture = TestFixture::new();
    fixture.create_file("x/a.jpg", "1");
    fixture.create_file("x/y/a.jpg", "2");
    fixture.create_file("x/y/增加.jpg", "3");
    fixture.create_file("z/增加.jpg", "4");
    fixture.create_file("z/t.xlsx", "5");
    fixture.create_file("t.xlsx", "6");
    let before = fixture.all_contents();

    fixture.run();

    assert_eq!(fixture.all_contents(), before);
    assert_eq!(fixture.list_files_recursive().len(), 6);
}

// ============================================================================
// Test Suite 4: Spreadsheets
// ============================================================================

#[test]
fn test_spreadsheets_go_to_root_regardless_of_name() {
    let fixture = TestFixture::new();
    fixture.create_file("a/报表修改后.xlsx", "1");
    fixture.create_file("a/b/DATA.XLS", "2");
    fixture.create_file("a/b/mixed.XlSx", "3");

    fixture.run();

    fixture.assert_file_exists("报表修改后.xlsx");
    fixture.assert_file_exists("DATA.XLS");
    fixture.assert_file_exists("mixed.XlSx");
    assert!(fixture.files_in("原图").is_empty());
    assert!(fixture.files_in("处理图").is_empty());
}

#[test]
fn test_spreadsheet_collision_at_root_is_renamed() {
    let fixture = TestFixture::new();
    fixture.create_file("report.xlsx", "root");
    fixture.create_file("sub/report.xlsx", "sub");

    fixture.run();

    assert_eq!(fixture.read("report.xlsx"), "root");
    assert_eq!(fixture.read("report_1.xlsx"), "sub");
}

#[test]
fn test_spreadsheets_processed_first() {
    let fixture = TestFixture::new();
    fixture.create_file("a.jpg", "a");
    fixture.create_file("sub/b.xlsx", "b");

    let (_, events) = fixture.run_collecting_events();
    let moved: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            Event::FileMoved { file_name, .. } => Some(file_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(moved, vec!["b.xlsx".to_string(), "a.jpg".to_string()]);
}

// ============================================================================
// Test Suite 5: Configuration, dry run and cancellation
// ============================================================================

#[test]
fn test_custom_layout_and_keywords() {
    let fixture = TestFixture::new();
    fixture.create_file("in/shot.jpg", "1");
    fixture.create_file("in/shot_edit.jpg", "2");
    fixture.create_file("in/data.csv", "3");

    let config = SorterConfig::from_toml_str(
        r#"
        [layout]
        original_dir_name = "originals"
        modified_dir_name = "edited"

        [classify]
        keywords = ["_edit"]
        spreadsheet_extensions = ["csv"]
        "#,
    )
    .unwrap();
    fixture.run_with(&config, RunOptions::default());

    fixture.assert_file_exists("originals/shot.jpg");
    fixture.assert_file_exists("edited/shot_edit.jpg");
    fixture.assert_file_exists("data.csv");
    fixture.assert_file_not_exists("原图");
}

#[test]
fn test_excluded_files_stay_in_place() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/.DS_Store", "hidden");
    fixture.create_file("sub/Thumbs.db", "thumbs");
    fixture.create_file("sub/a.jpg", "a");

    let mut config = SorterConfig::default();
    config.filters.enable_hidden_files = false;
    config.filters.exclude.filenames = vec!["Thumbs.db".to_string()];
    let summary = fixture.run_with(&config, RunOptions::default());

    assert_eq!(summary.excluded, 2);
    fixture.assert_file_exists("sub/.DS_Store");
    fixture.assert_file_exists("sub/Thumbs.db");
    fixture.assert_file_exists("原图/a.jpg");
}

#[test]
fn test_hidden_files_sorted_by_default() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/.hidden", "h");

    fixture.run();

    fixture.assert_file_exists("原图/.hidden");
}

#[test]
fn test_dry_run_leaves_tree_untouched() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/修改后_a.jpg", "a");
    fixture.create_file("sub/b.jpg", "b");
    fixture.create_file("sub/report.xlsx", "r");
    fixture.create_file("原图/改后.jpg", "m");
    let before = fixture.list_files_recursive();

    let summary = fixture.run_with(
        &SorterConfig::default(),
        RunOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    assert_eq!(fixture.list_files_recursive(), before);
    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.processed, 3);
    fixture.assert_file_not_exists("处理图");
}

#[test]
fn test_cancel_stops_between_files() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/a.jpg", "a");
    fixture.create_file("sub/b.jpg", "b");

    struct CancelAfterFirstMove {
        token: CancelToken,
        inner: MemorySink,
    }

    impl EventSink for CancelAfterFirstMove {
        fn emit(&self, event: Event) {
            if matches!(event, Event::FileMoved { .. }) {
                self.token.cancel();
            }
            self.inner.emit(event);
        }
    }

    let token = CancelToken::new();
    let sink = CancelAfterFirstMove {
        token: token.clone(),
        inner: MemorySink::new(),
    };
    let summary = Reorganizer::new(fixture.path(), &SorterConfig::default())
        .unwrap()
        .with_options(RunOptions {
            dry_run: false,
            cancel: token,
        })
        .run(&sink)
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.processed, 1);
    assert_eq!(fixture.files_in("原图").len(), 1);
    assert_eq!(fixture.files_in("sub").len(), 1);
    assert!(sink.inner.events().contains(&Event::Cancelled));
}

#[test]
fn test_run_cli_end_to_end() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/b.jpg", "b");

    let summary = run_cli(&Args::for_root(fixture.path())).expect("CLI run failed");

    assert_eq!(summary.processed, 1);
    fixture.assert_file_exists("原图/b.jpg");
}

#[test]
fn test_run_cli_with_config_file() {
    let fixture = TestFixture::new();
    fixture.create_file("sub/b.jpg", "b");
    let config_dir = TempDir::new().unwrap();
    let config_path = config_dir.path().join("origsort.toml");
    fs::write(&config_path, "[layout]\noriginal_dir_name = \"raw\"\n").unwrap();

    let mut args = Args::for_root(fixture.path());
    args.config = Some(config_path);
    run_cli(&args).expect("CLI run failed");

    fixture.assert_file_exists("raw/b.jpg");
}

#[test]
fn test_run_cli_missing_config_file_is_error() {
    let fixture = TestFixture::new();
    let mut args = Args::for_root(fixture.path());
    args.config = Some(fixture.path().join("missing.toml"));
    assert!(run_cli(&args).is_err());
}

// ============================================================================
// Test Suite 6: Error resilience
// ============================================================================

#[test]
fn test_invalid_root_has_no_side_effects() {
    let fixture = TestFixture::new();
    fixture.create_file("file.txt", "x");

    let result = Reorganizer::new(&fixture.path().join("file.txt"), &SorterConfig::default());
    assert!(matches!(result, Err(SortError::InvalidRoot { .. })));
    let result = Reorganizer::new(&fixture.path().join("missing"), &SorterConfig::default());
    assert!(matches!(result, Err(SortError::InvalidRoot { .. })));

    fixture.assert_file_exists("file.txt");
    fixture.assert_file_not_exists("原图");
}

#[test]
fn test_destination_blocked_by_file_is_setup_failure() {
    let fixture = TestFixture::new();
    fixture.create_file("处理图", "not a directory");
    fixture.create_file("sub/a.jpg", "a");

    let sink = MemorySink::new();
    let result = Reorganizer::new(fixture.path(), &SorterConfig::default())
        .unwrap()
        .run(&sink);

    assert!(matches!(result, Err(SortError::SetupFailed { .. })));
    assert!(sink.events().contains(&Event::State {
        state: origsort::RunState::Failed
    }));
    fixture.assert_file_exists("sub/a.jpg");
}

#[cfg(unix)]
#[test]
fn test_file_that_cannot_be_renamed_fails_alone() {
    let fixture = TestFixture::new();
    // 255 bytes fits NAME_MAX; the collision suffix pushes it over.
    let long_name = format!("{}.jpg", "a".repeat(251));
    fixture.create_file(&format!("原图/{}", long_name), "existing");
    fixture.create_file(&format!("sub/{}", long_name), "incoming");
    fixture.create_file("sub/b.jpg", "b");

    let (summary, events) = fixture.run_collecting_events();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(fixture.read(&format!("原图/{}", long_name)), "existing");
    assert_eq!(fixture.read(&format!("sub/{}", long_name)), "incoming");
    fixture.assert_file_exists("原图/b.jpg");
    assert!(summary.outcomes.iter().any(|r| matches!(
        &r.outcome,
        MoveOutcome::Failed { file_name, .. } if *file_name == long_name
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::FileFailed { file_name, source, .. } if *file_name == long_name && source == "sub"
    )));
    assert!(events.contains(&Event::State {
        state: origsort::RunState::Done
    }));
}

/// Deletes a folder when the walk reports it, so its listing fails.
struct RemoveOnDiscovery {
    root: PathBuf,
    doomed: &'static str,
    inner: MemorySink,
}

impl EventSink for RemoveOnDiscovery {
    fn emit(&self, event: Event) {
        if let Event::ClassificationFolderFound { path } = &event
            && path == self.doomed
        {
            fs::remove_dir_all(self.root.join(self.doomed)).expect("Failed to remove directory");
        }
        self.inner.emit(event);
    }
}

#[test]
fn test_unlistable_directory_does_not_stop_siblings() {
    let fixture = TestFixture::new();
    fixture.create_file("gone/处理图/x.jpg", "x");
    fixture.create_file("open/a.jpg", "a");
    fixture.create_file("open/deeper/b.jpg", "b");

    let sink = RemoveOnDiscovery {
        root: fixture.path().to_path_buf(),
        doomed: "gone",
        inner: MemorySink::new(),
    };
    let summary = Reorganizer::new(fixture.path(), &SorterConfig::default())
        .unwrap()
        .run(&sink)
        .expect("Run failed");

    assert_eq!(summary.skipped_dirs, 1);
    assert_eq!(summary.access_denied_dirs, 0);
    assert_eq!(summary.processed, 2);
    fixture.assert_file_exists("原图/a.jpg");
    fixture.assert_file_exists("原图/b.jpg");
    assert!(sink.inner.events().iter().any(|e| matches!(
        e,
        Event::DirectorySkipped { path, .. } if path == "gone"
    )));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TestFixture::new();
    fixture.create_file("locked/secret.jpg", "s");
    fixture.create_file("open/a.jpg", "a");
    fixture.create_subdir("open/deeper");
    fixture.create_file("open/deeper/b.jpg", "b");

    let locked = fixture.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Running with privileges that ignore permissions.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let (summary, events) = fixture.run_collecting_events();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(summary.skipped_dirs, 1);
    assert_eq!(summary.access_denied_dirs, 1);
    assert_eq!(summary.processed, 2);
    fixture.assert_file_exists("原图/a.jpg");
    fixture.assert_file_exists("原图/b.jpg");
    fixture.assert_file_exists("locked/secret.jpg");
    assert!(events.iter().any(|e| matches!(e, Event::DirectorySkipped { .. })));
}

#[cfg(unix)]
#[test]
fn test_failed_move_does_not_abort_run() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = TestFixture::new();
    fixture.create_file("stuck/a.jpg", "a");
    fixture.create_file("free/b.jpg", "b");

    // Files can be listed but not removed from a read-only directory.
    let stuck = fixture.path().join("stuck");
    fs::set_permissions(&stuck, fs::Permissions::from_mode(0o555)).unwrap();
    let probe = stuck.join(".probe");
    if fs::write(&probe, "").is_ok() {
        let _ = fs::remove_file(&probe);
        fs::set_permissions(&stuck, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let (summary, events) = fixture.run_collecting_events();
    fs::set_permissions(&stuck, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 1);
    fixture.assert_file_exists("stuck/a.jpg");
    fixture.assert_file_exists("原图/b.jpg");
    assert!(events.iter().any(|e| matches!(
        e,
        Event::FileFailed { file_name, .. } if file_name == "a.jpg"
    )));
}
