use anyhow::Result;
use ftp_helper::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("🚀 FTP Listing Demo");

    let config = SessionConfig::new("ftp://ftp.datasus.gov.br/", "anonymous", "anonymous@")?;
    let session = FtpSession::new(config);

    if !session.check_server().await {
        println!("❌ Server is not reachable");
        return Ok(());
    }

    let path = "/dissemin/publicos";
    println!("📂 Listing {}...", path);
    let records = session.list_directory(path).await?;

    let (directories, files): (Vec<_>, Vec<_>) = records.iter().partition(|r| r.is_directory);
    println!("  {} directories, {} files", directories.len(), files.len());
    for record in directories.iter().take(10) {
        println!("  📁 {}", record);
    }
    for record in files.iter().take(10) {
        println!("  📄 {}", record);
    }

    let exists = session.directory_exists(path, "SIHSUS").await?;
    println!("\n🔍 SIHSUS present: {}", exists);

    Ok(())
}
