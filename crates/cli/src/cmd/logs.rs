//! `pkgrepo logs`: print the latest build log of a package.

use anyhow::{Result, anyhow};
use tokio::io::AsyncWriteExt;

use pkgrepo_lib::ErrorKind;
use pkgrepo_lib::types::PackageId;

use super::CmdContext;
use crate::output::print_json;

pub async fn cmd_logs(ctx: &CmdContext, id: PackageId) -> Result<()> {
  let service = ctx.open_read_only()?;
  let reader = service.attach_logs(id).map_err(|err| match err.kind() {
    ErrorKind::NotFound => anyhow!(err.public_message()),
    _ => anyhow::Error::from(err),
  })?;
  let content = reader.read_to_end().await;

  if ctx.output.is_json() {
    print_json(&serde_json::json!({
      "package": id,
      "log": String::from_utf8_lossy(&content),
    }))?;
  } else {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&content).await?;
    stdout.flush().await?;
  }

  Ok(())
}
