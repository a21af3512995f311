//! `pkgrepo repo` subcommands.

use anyhow::Result;


use super::CmdContext;
use crate::output::{print_info, print_json, print_stat, print_success};

pub fn cmd_repo_create(ctx: &CmdContext, name: &str) -> Result<()> {
  let service = ctx.open()?;
  let repo = service.create_repo(&ctx.session, name)?;

  if ctx.output.is_json() {
    print_json(&repo)?;
  } else {
    print_success(&format!("Created repo '{}'", repo.name));
    print_stat("Id", &repo.id.to_string());
  }

  Ok(())
}

pub fn cmd_repo_list(ctx: &CmdContext) -> Result<()> {
  let service = ctx.open_read_only()?;
  let repos = service.list_repos()?;

  if ctx.output.is_json() {
    print_json(&repos)?;
  } else if repos.is_empty() {
    print_info("No repos. Run 'pkgrepo repo create <name>' to create one.");
  } else {
    for repo in &repos {
      println!("{:>6}  {}", repo.id.0, repo.name);
    }
  }

  Ok(())
}
