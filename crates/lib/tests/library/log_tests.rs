//! Log streaming and archived logs.

use pkgrepo_lib::ErrorKind;
use pkgrepo_lib::PackageService;
use pkgrepo_lib::config::ServiceConfig;
use pkgrepo_lib::store::{FileStore, RecordStore};
use pkgrepo_lib::types::BuildState;
use tempfile::TempDir;

use super::common::{ScriptedExecutor, TestService, alice};

#[tokio::test]
async fn readers_before_during_and_after_see_the_same_bytes() {
  let t = TestService::new(ScriptedExecutor::gated());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  let handle = t.service.request_build(&alice(), pkg.id).unwrap();
  let before = t.service.attach_logs(pkg.id).unwrap();
  let before = tokio::spawn(before.read_to_end());

  while handle.log().is_empty() {
    tokio::task::yield_now().await;
  }
  let during = t.service.attach_logs(pkg.id).unwrap();
  let during = tokio::spawn(during.read_to_end());

  t.executor.release(1);
  assert!(handle.wait().await.is_success());

  let after = t.service.attach_logs(pkg.id).unwrap().read_to_end().await;
  let before = before.await.unwrap();
  let during = during.await.unwrap();

  assert_eq!(after, b"start libfoo\nfinish libfoo\n");
  assert_eq!(before, after);
  assert_eq!(during, after);
}

#[tokio::test]
async fn dropped_reader_does_not_disturb_the_build() {
  let t = TestService::new(ScriptedExecutor::gated());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  let handle = t.service.request_build(&alice(), pkg.id).unwrap();
  let mut abandoned = handle.attach_reader();
  assert!(abandoned.next_chunk().await.is_some());
  drop(abandoned);

  t.executor.release(1);
  assert!(handle.wait().await.is_success());
  assert_eq!(t.state(pkg.id), BuildState::Succeeded);
}

#[tokio::test]
async fn failed_build_log_ends_after_its_last_line() {
  let t = TestService::new(ScriptedExecutor::open());
  t.executor.fail("libfoo");
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  let outcome = t.service.request_build(&alice(), pkg.id).unwrap().wait().await;
  assert_eq!(outcome.state(), BuildState::Failed);

  let log = t.service.attach_logs(pkg.id).unwrap().read_to_end().await;
  assert_eq!(log, b"start libfoo\nfinish libfoo\n");

  let mut reader = t.service.attach_logs(pkg.id).unwrap();
  let mut chunks = Vec::new();
  while let Some(chunk) = reader.next_chunk().await {
    chunks.extend_from_slice(&chunk);
  }
  assert_eq!(chunks, log);
  assert!(reader.next_chunk().await.is_none());
}

#[tokio::test]
async fn never_built_package_has_no_logs() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  let err = t.service.attach_logs(pkg.id).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert_eq!(err.public_message(), "No logs available");
}

#[cfg(unix)]
#[tokio::test]
async fn archived_log_survives_a_restart() {
  let temp = TempDir::new().unwrap();
  let config = ServiceConfig::new(temp.path()).with_build_command("echo compiling $PKGREPO_PACKAGE");

  let pkg = {
    let service = PackageService::open(&config).unwrap();
    let repo = service.create_repo(&alice(), "main").unwrap();
    let pkg = service.add_package(&alice(), repo.id, "libfoo").unwrap();
    assert!(service.request_build(&alice(), pkg.id).unwrap().wait().await.is_success());
    pkg
  };

  let service = PackageService::open(&config).unwrap();
  let info = service.package_info(pkg.id).unwrap();
  assert_eq!(info.package.build_state, BuildState::Succeeded);
  assert!(info.logs_available);

  let log = service.attach_logs(pkg.id).unwrap().read_to_end().await;
  assert_eq!(log, b"compiling libfoo\n");
}

#[test]
fn open_fails_builds_left_running() {
  let temp = TempDir::new().unwrap();
  let config = ServiceConfig::new(temp.path());

  let stale = {
    let store = FileStore::open(temp.path()).unwrap();
    let repo = store.create_repo("main").unwrap();
    let pkg = store.create_package(repo.id, "libfoo").unwrap();
    store.set_build_state(pkg.id, BuildState::Building).unwrap();
    pkg
  };

  let service = PackageService::open(&config).unwrap();
  assert_eq!(
    service.package_info(stale.id).unwrap().package.build_state,
    BuildState::Failed
  );
}

#[test]
fn read_only_open_leaves_unfinished_builds_alone() {
  let temp = TempDir::new().unwrap();
  let config = ServiceConfig::new(temp.path());

  let stale = {
    let store = FileStore::open(temp.path()).unwrap();
    let repo = store.create_repo("main").unwrap();
    let pkg = store.create_package(repo.id, "libfoo").unwrap();
    store.set_build_state(pkg.id, BuildState::Queued).unwrap();
    pkg
  };

  let service = PackageService::open_read_only(&config).unwrap();
  assert_eq!(
    service.package_info(stale.id).unwrap().package.build_state,
    BuildState::Queued
  );

  let store = FileStore::open(temp.path()).unwrap();
  assert_eq!(store.package(stale.id).unwrap().unwrap().build_state, BuildState::Queued);
}
