use std::path::PathBuf;

use anyhow::{Context, Result};

use wipecast_cloud::{
    compare_images, save_comparison, ComparisonStore, DiffService, GeminiClient, LocalStore, User,
};
use wipecast_core::WipecastConfig;
use wipecast_render::image_loader::{parse_data_uri, parse_image_data_uri};
use wipecast_render::ImageLoader;

use crate::output;

/// Data URI for a source, loading and re-encoding anything that is not one already.
///
/// Every source passes the upload gate, data URIs included.
async fn data_uri(loader: &ImageLoader, source: &str) -> Result<String> {
    let trimmed = source.trim();
    if trimmed.starts_with("data:") {
        parse_image_data_uri(trimmed, loader.max_bytes())
            .context("rejected image data URI")?;
        return Ok(trimmed.to_string());
    }
    let handle = loader
        .load(source)
        .await
        .with_context(|| format!("failed to load image: {}", source))?;
    Ok(handle.to_data_uri()?)
}

async fn data_uri_pair(config: &WipecastConfig, before: &str, after: &str) -> Result<(String, String)> {
    let loader = ImageLoader::from_config(&config.upload);
    tokio::try_join!(data_uri(&loader, before), data_uri(&loader, after))
}

/// Local store identity for a user id given on the command line.
fn local_user(uid: String) -> User {
    User {
        email: format!("{}@localhost", uid),
        uid,
        email_verified: true,
    }
}

pub async fn cmd_compare(
    config: WipecastConfig,
    before: String,
    after: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = GeminiClient::from_env(config.ai.clone())?;
    let (image1, image2) = data_uri_pair(&config, &before, &after).await?;

    let result = compare_images(&client, &image1, &image2).await?;
    println!("{}", result.summary);

    if let Some(dir) = output {
        let (mime, bytes) = parse_data_uri(&result.comparison_image)?;
        let ext = mime.split('/').nth(1).unwrap_or("png");
        let highlight = dir.join(format!("highlight.{}", ext));
        output::write_file(&highlight, &bytes)?;
        output::write_file(&dir.join("summary.txt"), result.summary.as_bytes())?;
        println!("Wrote {} and summary.txt", highlight.display());
    }
    Ok(())
}

pub async fn cmd_generate_video(
    config: WipecastConfig,
    before: String,
    after: String,
    output: PathBuf,
) -> Result<()> {
    let client = GeminiClient::from_env(config.ai.clone())?;
    let (before_uri, after_uri) = data_uri_pair(&config, &before, &after).await?;

    println!("Generating video, this can take a few minutes...");
    let video = client
        .generate_transition_video(&before_uri, &after_uri)
        .await
        .context("video generation failed")?;

    let path = output::with_extension_or_default(&output, "transition", video.extension());
    output::write_file(&path, &video.data)?;
    println!("Wrote {} ({} bytes)", path.display(), video.data.len());
    Ok(())
}

pub async fn cmd_save(
    config: WipecastConfig,
    user: String,
    name: String,
    before: String,
    after: String,
) -> Result<()> {
    let store = LocalStore::from_config(&config.store);
    let user = local_user(user);
    let (image1, image2) = data_uri_pair(&config, &before, &after).await?;

    let record = save_comparison(&store, &user, &name, &image1, &image2, &config.upload)
        .await
        .context("failed to save comparison")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn cmd_list(config: WipecastConfig, user: String) -> Result<()> {
    let store = LocalStore::from_config(&config.store);
    let records = store
        .list_comparison_records(&local_user(user))
        .await
        .context("failed to list comparisons")?;

    if records.is_empty() {
        println!("No saved comparisons.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {}",
            record.created_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            record.id,
            record.name
        );
    }
    Ok(())
}
