//! `pkgrepo package` subcommands.

use std::collections::BTreeSet;

use anyhow::Result;

use pkgrepo_lib::types::{PackageId, RepoId};

use super::CmdContext;
use crate::output::{format_ids, format_state, print_info, print_json, print_stat, print_success};

pub fn cmd_package_add(ctx: &CmdContext, name: &str, repo_id: RepoId) -> Result<()> {
  let service = ctx.open()?;
  let package = service.add_package(&ctx.session, repo_id, name)?;

  if ctx.output.is_json() {
    print_json(&package)?;
  } else {
    print_success(&format!("Added package '{}' to repo {}", package.name, repo_id));
    print_stat("Id", &package.id.to_string());
  }

  Ok(())
}

pub fn cmd_package_list(ctx: &CmdContext, repo_id: Option<RepoId>) -> Result<()> {
  let service = ctx.open_read_only()?;
  let packages = service.list_packages(repo_id)?;

  if ctx.output.is_json() {
    print_json(&packages)?;
  } else if packages.is_empty() {
    print_info("No packages.");
  } else {
    for package in &packages {
      println!("{:>6}  {}", package.id.0, package.name);
    }
  }

  Ok(())
}

pub fn cmd_package_info(ctx: &CmdContext, id: PackageId) -> Result<()> {
  let service = ctx.open_read_only()?;
  let info = service.package_info(id)?;

  if ctx.output.is_json() {
    print_json(&info)?;
  } else {
    let package = &info.package;
    print_success(&format!("Package '{}' ({})", package.name, package.id));
    print_stat("Repo", &package.repo_id.to_string());
    print_stat("State", &format_state(package.build_state));
    print_stat("Dependencies", &format_ids(&package.dependencies));
    print_stat("Dependents", &format_ids(&info.dependents));
    print_stat("Logs", if info.logs_available { "available" } else { "none" });
  }

  Ok(())
}

pub fn cmd_package_depend(ctx: &CmdContext, id: PackageId, deps: BTreeSet<PackageId>) -> Result<()> {
  let service = ctx.open()?;
  let package = service.set_dependencies(&ctx.session, id, deps)?;

  if ctx.output.is_json() {
    print_json(&package)?;
  } else {
    print_success(&format!("Updated dependencies of '{}'", package.name));
    print_stat("Dependencies", &format_ids(&package.dependencies));
  }

  Ok(())
}

pub fn cmd_package_move(ctx: &CmdContext, id: PackageId, repo_id: RepoId) -> Result<()> {
  let service = ctx.open()?;
  let package = service.reassign(&ctx.session, id, repo_id)?;

  if ctx.output.is_json() {
    print_json(&package)?;
  } else {
    print_success(&format!("Moved '{}' to repo {}", package.name, package.repo_id));
    if ctx.verbose {
      print_stat("Dependencies", "cleared");
    }
  }

  Ok(())
}
