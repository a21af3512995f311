//! `pkgrepo build`: trigger a build and follow its log.

use std::time::Instant;

use anyhow::{Result, bail};
use tokio::io::AsyncWriteExt;

use pkgrepo_lib::build::BuildOutcome;
use pkgrepo_lib::types::PackageId;

use super::CmdContext;
use crate::output::{format_duration, print_info, print_json, print_stat, print_success};

pub async fn cmd_build(ctx: &CmdContext, id: PackageId) -> Result<()> {
  let start = Instant::now();
  let service = ctx.open()?;
  let handle = service.request_build(&ctx.session, id)?;

  if !ctx.output.is_json() {
    print_info(&format!("Building package {}", handle.package_id()));
    let mut reader = handle.attach_reader();
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = reader.next_chunk().await {
      stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;
  }

  let log = handle.log().clone();
  let outcome = handle.wait().await;

  if ctx.output.is_json() {
    print_json(&serde_json::json!({
      "package": id,
      "outcome": outcome,
      "log": String::from_utf8_lossy(&log.contents()),
    }))?;
  }

  match outcome {
    BuildOutcome::Succeeded => {
      if !ctx.output.is_json() {
        print_success(&format!("Build of package {} succeeded", id));
        print_stat("Duration", &format_duration(start.elapsed()));
      }
      Ok(())
    }
    BuildOutcome::Failed { reason } => bail!("Build of package {} failed: {}", id, reason),
  }
}
