use std::path::Path;
use std::process::Command;

use dubsync_media::{check_ffmpeg, check_ffprobe};
use dubsync_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "dubsync-selfcheck: starting with work_dir={} sync_mode={}",
        config.work_dir.display(),
        config.sync_mode
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg", check_ffmpeg().map_err(anyhow::Error::from))?;
    ensure_tool("ffprobe", check_ffprobe().map_err(anyhow::Error::from))?;

    println!("dubsync-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await.ok();
    Ok(())
}

fn ensure_tool(name: &str, located: anyhow::Result<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = located?;
    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            name,
            output.status
        ));
    }
    println!("dubsync-selfcheck: {} at {}", name, path.display());
    Ok(())
}
