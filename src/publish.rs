use std::path::Path;

use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};

/// Publish the artifact to `s3://<bucket>/<prefix><filename>` and return
/// the remote address.
///
/// Publishing is strictly best-effort: a missing or misconfigured storage
/// client (no AWS credentials, unreachable endpoint, denied write) logs a
/// warning and yields `None`. The local copy is always retained.
pub async fn publish(path: &Path, bucket: &str, prefix: &str) -> Option<String> {
    match upload(path, bucket, prefix).await {
        Ok(uri) => {
            info!(target = "invoice", %uri, "invoice published");
            Some(uri)
        }
        Err(err) => {
            warn!(target = "invoice", error = %format!("{err:#}"), "skipping S3 upload");
            None
        }
    }
}

async fn upload(path: &Path, bucket: &str, prefix: &str) -> anyhow::Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("artifact path has no file name")?;
    let key = object_key(prefix, file_name);

    let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = aws_sdk_s3::Client::new(&config);

    let body = ByteStream::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(body)
        .send()
        .await
        .with_context(|| format!("failed to upload to s3://{bucket}/{key}"))?;

    Ok(format!("s3://{bucket}/{key}"))
}

fn object_key(prefix: &str, file_name: &str) -> String {
    format!("{prefix}{file_name}")
}
