use std::path::PathBuf;

use tracing::{debug, info};

use crate::browser::BrowserSession;
use crate::config::{self, FetchConfig};
use crate::credentials;
use crate::error::Result;
use crate::portal::{self, FetchOutcome};
use crate::publish;

/// One complete run: resolve credentials, drive the portal session, then
/// optionally publish the artifact.
pub async fn execute(
    output_dir: Option<PathBuf>,
    headed: bool,
    bucket: Option<String>,
    prefix: Option<String>,
) -> Result<()> {
    let cfg = FetchConfig::resolve(output_dir, headed, bucket, prefix);

    // Credentials come first; without them no browser is ever opened.
    let creds = credentials::resolve().await?;

    std::fs::create_dir_all(&cfg.output_dir)?;
    let staging_dir = cfg.output_dir.join("incoming");
    std::fs::create_dir_all(&staging_dir)?;
    info!(
        target = "invoice",
        dir = %cfg.output_dir.display(),
        headless = cfg.headless,
        "starting invoice fetch"
    );

    // From here until close() nothing may early-return: the session is
    // released exactly once on every path.
    let session = BrowserSession::launch(cfg.headless, &staging_dir).await?;
    let outcome =
        portal::download_latest_invoice(&session, &creds, &cfg.output_dir, &staging_dir).await;
    if outcome.is_err() {
        session.try_screenshot(&cfg.output_dir.join(config::ERROR_SNAPSHOT)).await;
    }
    session.close().await;

    match outcome? {
        FetchOutcome::Downloaded(path) => {
            println!("{}", path.display());
            match &cfg.bucket {
                Some(bucket) => {
                    publish::publish(&path, bucket, &cfg.key_prefix).await;
                }
                None => {
                    debug!(target = "invoice", "no S3 bucket configured; keeping local copy only")
                }
            }
        }
        FetchOutcome::NoInvoice => println!("no invoice available"),
    }
    Ok(())
}
