//! Build scheduling scenarios.

use std::collections::BTreeSet;
use std::sync::Arc;

use pkgrepo_lib::auth::Session;
use pkgrepo_lib::build::BuildOutcome;
use pkgrepo_lib::store::RecordStore;
use pkgrepo_lib::types::BuildState;
use pkgrepo_lib::{ErrorKind, ServiceError};

use super::common::{ScriptedExecutor, TestService, alice};

#[tokio::test]
async fn end_to_end_main_libfoo_libbar() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();

  let libfoo = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();
  let outcome = t.service.request_build(&alice(), libfoo.id).unwrap().wait().await;
  assert_eq!(outcome, BuildOutcome::Succeeded);
  assert_eq!(
    t.store.transitions_of(libfoo.id),
    vec![BuildState::Queued, BuildState::Building, BuildState::Succeeded]
  );

  let libbar = t.service.add_package(&alice(), repo.id, "libbar").unwrap();
  t.service
    .set_dependencies(&alice(), libbar.id, BTreeSet::from([libfoo.id]))
    .unwrap();
  assert!(t.service.request_build(&alice(), libbar.id).unwrap().wait().await.is_success());
  assert_eq!(t.state(libbar.id), BuildState::Succeeded);
}

#[tokio::test]
async fn unbuilt_dependency_blocks_until_it_succeeds() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let libfoo = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();
  let libbar = t.service.add_package(&alice(), repo.id, "libbar").unwrap();
  t.service
    .set_dependencies(&alice(), libbar.id, BTreeSet::from([libfoo.id]))
    .unwrap();

  let err = t.service.request_build(&alice(), libbar.id).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);
  assert_eq!(err.status_code(), 412);
  assert!(err.to_string().contains(&format!("package {} is unbuilt", libfoo.id)));
  assert_eq!(t.state(libbar.id), BuildState::Unbuilt);
  assert!(t.store.transitions_of(libbar.id).is_empty());

  assert!(t.service.request_build(&alice(), libfoo.id).unwrap().wait().await.is_success());
  assert!(t.service.request_build(&alice(), libbar.id).unwrap().wait().await.is_success());
}

#[tokio::test]
async fn failed_dependency_blocks() {
  let t = TestService::new(ScriptedExecutor::open());
  t.executor.fail("libfoo");
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let libfoo = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();
  let libbar = t.service.add_package(&alice(), repo.id, "libbar").unwrap();
  t.service
    .set_dependencies(&alice(), libbar.id, BTreeSet::from([libfoo.id]))
    .unwrap();

  let outcome = t.service.request_build(&alice(), libfoo.id).unwrap().wait().await;
  assert_eq!(
    outcome,
    BuildOutcome::Failed {
      reason: "scripted failure of libfoo".to_string()
    }
  );

  let err = t.service.request_build(&alice(), libbar.id).unwrap_err();
  assert!(matches!(err, ServiceError::Dependency { ref blockers, .. } if blockers.len() == 1));
  assert_eq!(t.state(libbar.id), BuildState::Unbuilt);
}

#[tokio::test]
async fn dependency_requeued_just_before_commit_fails_the_dependent() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let libfoo = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();
  let libbar = t.service.add_package(&alice(), repo.id, "libbar").unwrap();
  t.service
    .set_dependencies(&alice(), libbar.id, BTreeSet::from([libfoo.id]))
    .unwrap();
  assert!(t.service.request_build(&alice(), libfoo.id).unwrap().wait().await.is_success());

  // Another writer requeues libfoo right before libbar commits its result.
  let libfoo_id = libfoo.id;
  t.store.before_commit(libbar.id, BuildState::Succeeded, move |records| {
    records.set_build_state(libfoo_id, BuildState::Queued).unwrap();
  });

  let outcome = t.service.request_build(&alice(), libbar.id).unwrap().wait().await;
  let BuildOutcome::Failed { reason } = outcome else {
    panic!("libbar must not succeed while libfoo is queued");
  };
  assert!(reason.contains("no longer satisfied"), "{}", reason);
  assert_eq!(t.state(libbar.id), BuildState::Failed);
  assert_eq!(t.state(libfoo.id), BuildState::Queued);
  assert_eq!(
    t.store.transitions_of(libbar.id),
    vec![BuildState::Queued, BuildState::Building, BuildState::Failed]
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_requests_build_once() {
  let t = Arc::new(TestService::new(ScriptedExecutor::gated()));
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let id = t.service.add_package(&alice(), repo.id, "libfoo").unwrap().id;

  let requests: Vec<_> = (0..2)
    .map(|_| {
      let t = Arc::clone(&t);
      tokio::spawn(async move { t.service.request_build(&alice(), id) })
    })
    .collect();

  let mut handles = Vec::new();
  let mut conflicts = 0;
  for request in requests {
    match request.await.unwrap() {
      Ok(handle) => handles.push(handle),
      Err(err) => {
        assert_eq!(err.kind(), ErrorKind::BuildConflict);
        assert_eq!(err.status_code(), 409);
        conflicts += 1;
      }
    }
  }
  assert_eq!(handles.len(), 1);
  assert_eq!(conflicts, 1);
  assert_eq!(t.state(id), BuildState::Building);

  t.executor.release(1);
  let outcome = handles.pop().unwrap().wait().await;
  assert!(outcome.is_success());

  let terminal: Vec<_> = t
    .store
    .transitions_of(id)
    .into_iter()
    .filter(|s| s.is_terminal())
    .collect();
  assert_eq!(terminal, vec![BuildState::Succeeded]);
}

#[tokio::test]
async fn edits_are_refused_during_a_build() {
  let t = TestService::new(ScriptedExecutor::gated());
  let main = t.service.create_repo(&alice(), "main").unwrap();
  let other = t.service.create_repo(&alice(), "other").unwrap();
  let pkg = t.service.add_package(&alice(), main.id, "libfoo").unwrap();

  let handle = t.service.request_build(&alice(), pkg.id).unwrap();

  let err = t.service.set_dependencies(&alice(), pkg.id, BTreeSet::new()).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BuildConflict);
  let err = t.service.reassign(&alice(), pkg.id, other.id).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::BuildConflict);

  t.executor.release(1);
  assert!(handle.wait().await.is_success());
  assert!(t.service.reassign(&alice(), pkg.id, other.id).is_ok());
}

#[tokio::test]
async fn anonymous_build_trigger_changes_nothing() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  let err = t.service.request_build(&Session::anonymous(), pkg.id).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotLoggedIn);
  assert_eq!(t.state(pkg.id), BuildState::Unbuilt);
  assert!(t.store.transitions_of(pkg.id).is_empty());
  assert!(!t.service.package_info(pkg.id).unwrap().logs_available);
}

#[tokio::test]
async fn rebuild_replaces_the_previous_attempt() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  let pkg = t.service.add_package(&alice(), repo.id, "libfoo").unwrap();

  t.executor.fail("libfoo");
  let first = t.service.request_build(&alice(), pkg.id).unwrap().wait().await;
  assert_eq!(first.state(), BuildState::Failed);

  let second = t.service.request_build(&alice(), pkg.id).unwrap().wait().await;
  assert_eq!(second.state(), BuildState::Failed);
  assert_eq!(
    t.store.transitions_of(pkg.id),
    vec![
      BuildState::Queued,
      BuildState::Building,
      BuildState::Failed,
      BuildState::Queued,
      BuildState::Building,
      BuildState::Failed,
    ]
  );
}
