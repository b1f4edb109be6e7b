use std::env;

use anyhow::{Context, Result};
use ftp_helper::*;

/// Usage: upload_download <config.json> <local file> <remote path>
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        println!("Usage: {} <config.json> <local file> <remote path>", args[0]);
        return Ok(());
    }

    let config = SessionConfig::from_json_file(&args[1]).context("Failed to load session config")?;
    let session = FtpSession::new(config);
    let (local, remote) = (&args[2], &args[3]);

    println!("⬆️  Uploading {} to {}", local, remote);
    let sent = session.try_upload_file(local, remote, true).await?;
    println!("  ✅ {} bytes sent", sent);

    println!("🔍 Remote file exists: {}", session.file_exists(remote).await?);

    let copy = format!("{}.copy", local);
    if session.download_file(remote, &copy).await {
        println!("⬇️  Downloaded back to {}", copy);
    } else if let Some(error) = session.last_error() {
        println!("❌ Download failed: {}", error);
    }

    if !session.delete_file(remote).await {
        println!("❌ Cleanup failed: {:?}", session.last_error());
    }

    Ok(())
}
