//! Repo and package admission through the service.

use std::collections::BTreeSet;

use pkgrepo_lib::ErrorKind;
use pkgrepo_lib::auth::Session;
use pkgrepo_lib::types::{PackageId, RepoId};

use super::common::{ScriptedExecutor, TestService, alice};

#[test]
fn invalid_repo_name_persists_nothing() {
  let t = TestService::new(ScriptedExecutor::open());

  let err = t.service.create_repo(&alice(), "no spaces/allowed").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidCharacters);
  assert_eq!(err.status_code(), 412);
  assert!(t.service.list_repos().unwrap().is_empty());
}

#[test]
fn duplicate_repo_yields_exactly_one() {
  let t = TestService::new(ScriptedExecutor::open());

  t.service.create_repo(&alice(), "main").unwrap();
  let err = t.service.create_repo(&alice(), "main").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Exists);
  assert_eq!(t.service.list_repos().unwrap().len(), 1);
}

#[test]
fn concurrent_duplicate_repo_creates_one() {
  let t = TestService::new(ScriptedExecutor::open());

  let results: Vec<_> = std::thread::scope(|scope| {
    let handles: Vec<_> = (0..8)
      .map(|_| scope.spawn(|| t.service.create_repo(&alice(), "main")))
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
  for err in results.into_iter().filter_map(Result::err) {
    assert_eq!(err.kind(), ErrorKind::Exists);
  }
  assert_eq!(t.service.list_repos().unwrap().len(), 1);
}

#[test]
fn package_under_missing_repo_persists_nothing() {
  let t = TestService::new(ScriptedExecutor::open());

  let err = t.service.add_package(&alice(), RepoId(3), "libfoo").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert_eq!(err.status_code(), 404);
  assert!(t.service.list_packages(None).unwrap().is_empty());
}

#[test]
fn listing_is_stable_without_mutation() {
  let t = TestService::new(ScriptedExecutor::open());
  let repo = t.service.create_repo(&alice(), "main").unwrap();
  for name in ["c", "a", "b"] {
    t.service.add_package(&alice(), repo.id, name).unwrap();
  }

  let first = t.service.list_packages(Some(repo.id)).unwrap();
  let second = t.service.list_packages(Some(repo.id)).unwrap();
  assert_eq!(first, second);

  let names: Vec<_> = first.iter().map(|p| p.name.as_str()).collect();
  assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn anonymous_session_cannot_mutate() {
  let t = TestService::new(ScriptedExecutor::open());
  let anon = Session::anonymous();

  let err = t.service.create_repo(&anon, "main").unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotLoggedIn);
  assert_eq!(err.status_code(), 401);
  assert!(t.service.list_repos().unwrap().is_empty());
}

#[test]
fn dependency_edits_stay_within_repo() {
  let t = TestService::new(ScriptedExecutor::open());
  let main = t.service.create_repo(&alice(), "main").unwrap();
  let other = t.service.create_repo(&alice(), "other").unwrap();
  let libfoo = t.service.add_package(&alice(), main.id, "libfoo").unwrap();
  let foreign = t.service.add_package(&alice(), other.id, "foreign").unwrap();

  let err = t
    .service
    .set_dependencies(&alice(), libfoo.id, BTreeSet::from([foreign.id]))
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Dependency);

  let err = t
    .service
    .set_dependencies(&alice(), libfoo.id, BTreeSet::from([PackageId(404)]))
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  assert!(t.service.package_info(libfoo.id).unwrap().package.dependencies.is_empty());
}
