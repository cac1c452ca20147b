use crate::cli::{Cli, Command};
use crate::config::load_config;
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::time::UNIX_EPOCH;
use stowage_envelope::SecretKey;
use stowage_storage::{
    FileSource, ListOptions, LocalStorage, StorageConfig, SubDirectories, UploadOptions,
};
use tokio::io::{self, AsyncWriteExt};

pub async fn run(cli: Cli) -> Result<()> {
    if cli.command == Command::Keygen {
        return keygen();
    }

    let config: StorageConfig = load_config(&cli.config).context("Configuration is malformed")?;
    let storage = LocalStorage::from_config(&config)
        .await
        .with_context(|| format!("Cannot open storage at {}", config.root_path.display()))?;

    let outcome = dispatch(&storage, cli.command).await;
    storage.shutdown().await;
    outcome
}

async fn dispatch(storage: &LocalStorage, command: Command) -> Result<()> {
    match command {
        Command::Put { source, key } => put(storage, &source, key).await,
        Command::Get { key, output } => get(storage, &key, output.as_deref()).await,
        Command::Stat { key } => stat(storage, &key).await,
        Command::Ls { per_page } => ls(storage, per_page).await,
        Command::Rm { keys } => rm(storage, &keys).await,
        Command::Cp { from, to } => {
            storage.copy(&from, &to).await.with_context(|| format!("Cannot copy {from}"))?;
            Ok(())
        },
        Command::Mv { from, to } => {
            storage.rename(&from, &to).await.with_context(|| format!("Cannot move {from}"))?;
            Ok(())
        },
        Command::Keygen => keygen(),
    }
}

fn keygen() -> Result<()> {
    let key = SecretKey::generate().context("System RNG unavailable")?;
    println!("{}", key.to_base64());
    Ok(())
}

async fn put(storage: &LocalStorage, source: &Path, key: Option<String>) -> Result<()> {
    let input = FileSource::Path(source.to_path_buf());
    let receipt = match key {
        Some(key) => storage.write(&key, input).await,
        None => {
            let mut options = UploadOptions::new().sub_directories(SubDirectories::Random);
            if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
                options = options.extension(ext);
            }
            storage.upload(input, &options).await
        },
    }
    .with_context(|| format!("Cannot store {}", source.display()))?;

    println!("{}", receipt.key);
    Ok(())
}

/// Stages first so nothing reaches the output before the tag is verified.
async fn get(storage: &LocalStorage, key: &str, output: Option<&Path>) -> Result<()> {
    let staged = storage.stage(key).await.with_context(|| format!("Cannot read {key}"))?;

    match output {
        Some(path) => {
            tokio::fs::copy(staged.path(), path)
                .await
                .with_context(|| format!("Cannot write {}", path.display()))?;
        },
        None => {
            let mut file = staged.open().await?;
            let mut stdout = io::stdout();
            io::copy(&mut file, &mut stdout).await.context("Cannot write to stdout")?;
            stdout.flush().await?;
        },
    }

    staged.remove().await?;
    Ok(())
}

async fn stat(storage: &LocalStorage, key: &str) -> Result<()> {
    let stats = storage.stats(key).await.with_context(|| format!("Cannot stat {key}"))?;
    let encrypted = storage.get_file(key).await?.encrypted;
    let modified = stats
        .modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map_or_else(|| "-".to_owned(), |d| d.as_secs().to_string());

    println!("key:       {}", stats.key);
    println!("bucket:    {}", stats.bucket);
    println!("path:      {}", stats.absolute_path.display());
    println!("size:      {}", stats.size);
    println!("modified:  {modified}");
    println!("encrypted: {encrypted}");
    println!("type:      {}", stats.mime_type.as_deref().unwrap_or("-"));
    Ok(())
}

async fn ls(storage: &LocalStorage, per_page: Option<usize>) -> Result<()> {
    let mut cursor = match per_page {
        Some(per_page) => storage.files_cursor(ListOptions::per_page(per_page))?,
        None => storage.files(),
    };

    while let Some(page) = cursor.next_page().await.context("Listing failed")? {
        for file in page {
            println!("{:>12}  {}", file.size, file.key);
        }
    }
    Ok(())
}

async fn rm(storage: &LocalStorage, keys: &[String]) -> Result<()> {
    let mut failed = 0usize;
    for (key, result) in keys.iter().zip(storage.delete_many(keys).await) {
        if let Err(err) = result {
            eprintln!("{key}: {err}");
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} deletions failed", keys.len());
    }
    Ok(())
}
