//! The authenticate-navigate-download sequence against the billing portal.
//!
//! Strictly linear, one pass per run. The portal's markup is not under
//! our control, so every element lookup goes through the ordered matcher
//! strategies in [`crate::browser::locate`] and the billing page is
//! always snapshotted before anything is located on it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::Element;
use chrono::{Local, NaiveDate};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::{locate, BrowserSession};
use crate::config;
use crate::credentials::{redact, Credentials};
use crate::error::{InvoiceError, Result};

const RENDER_PAUSE: Duration = Duration::from_secs(2);
const SHORT_PAUSE: Duration = Duration::from_secs(1);
const POST_LOGIN_PAUSE: Duration = Duration::from_secs(3);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of one portal pass. An empty billing history is a legitimate
/// result, distinct from any failure.
#[derive(Debug)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    NoInvoice,
}

/// Run the whole sequence: log in, open the billing history, locate the
/// most recent invoice and capture it under `output_dir`.
pub async fn download_latest_invoice(
    session: &BrowserSession,
    creds: &Credentials,
    output_dir: &Path,
    staging_dir: &Path,
) -> Result<FetchOutcome> {
    log_in(session, creds).await?;
    open_billing_history(session, output_dir).await?;

    let mut candidates = locate::locate(session.page(), &locate::DOWNLOAD_TEXT).await?;
    if candidates.is_empty() {
        probe_invoice_rows(session).await;
        candidates = locate::locate(session.page(), &locate::DOWNLOAD_ATTR).await?;
    }
    if candidates.is_empty() {
        // Could equally mean "no invoices yet" or drifted markup; the
        // billing snapshot is the tiebreaker for a human.
        info!(
            target = "invoice",
            "no invoice download links found; none may be available yet, or the page \
             structure changed (check {})",
            config::BILLING_SNAPSHOT
        );
        return Ok(FetchOutcome::NoInvoice);
    }
    info!(target = "invoice", count = candidates.len(), "found invoice download links");

    // First candidate is taken as the most recent invoice; the portal's
    // default ordering is trusted.
    let path = capture_download(&candidates[0], staging_dir, output_dir).await?;
    Ok(FetchOutcome::Downloaded(path))
}

async fn log_in(session: &BrowserSession, creds: &Credentials) -> Result<()> {
    info!(target = "invoice", url = config::LOGIN_URL, "navigating to login");
    session.goto(config::LOGIN_URL).await?;
    tokio::time::sleep(RENDER_PAUSE).await;

    // Some portal states interpose a landing page; clicking through it is
    // opportunistic and never an error.
    if let Some(button) = first(session, &locate::LANDING_LOGIN).await? {
        debug!(target = "invoice", "dismissing landing page");
        if click(&button).await.is_ok() {
            tokio::time::sleep(RENDER_PAUSE).await;
        }
    }

    let email_input = match first(session, &locate::EMAIL_INPUT).await? {
        Some(input) => input,
        None => {
            if let Some(button) = first(session, &locate::CONTINUE_WITH_EMAIL).await? {
                click(&button).await?;
                tokio::time::sleep(SHORT_PAUSE).await;
            }
            first(session, &locate::EMAIL_INPUT).await?.ok_or(InvoiceError::ElementNotFound {
                target: locate::EMAIL_INPUT.name,
            })?
        }
    };
    info!(target = "invoice", email = %redact(&creds.email), "entering email");
    fill(&email_input, &creds.email).await?;

    let advance = require(session, &locate::ADVANCE_BUTTON).await?;
    click(&advance).await?;
    tokio::time::sleep(RENDER_PAUSE).await;

    info!(target = "invoice", "entering password");
    let password_input = require(session, &locate::PASSWORD_INPUT).await?;
    fill(&password_input, &creds.password).await?;

    let submit = require(session, &locate::SUBMIT_LOGIN).await?;
    click(&submit).await?;

    info!(target = "invoice", "waiting for login to complete");
    wait_for_authenticated(session, LOGIN_TIMEOUT).await?;
    tokio::time::sleep(POST_LOGIN_PAUSE).await;
    info!(target = "invoice", "login successful");
    Ok(())
}

/// Poll the location until it reaches the authenticated portal area.
/// On timeout, a verification/second-factor location is surfaced as its
/// own fatal kind since only a human can act on it.
async fn wait_for_authenticated(session: &BrowserSession, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = session.url().await;
        if is_authenticated_url(&url) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            if is_verification_url(&url) {
                warn!(target = "invoice", %url, "login stopped at a verification step");
                return Err(InvoiceError::VerificationRequired);
            }
            return Err(InvoiceError::Timeout { what: "login", ms: timeout.as_millis() as u64 });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn is_authenticated_url(url: &str) -> bool {
    url.contains("platform.openai.com") && !url.contains("/login")
}

fn is_verification_url(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains("verify") || url.contains("mfa")
}

async fn open_billing_history(session: &BrowserSession, output_dir: &Path) -> Result<()> {
    info!(target = "invoice", url = config::BILLING_URL, "navigating to billing history");
    session.goto(config::BILLING_URL).await?;
    tokio::time::sleep(POST_LOGIN_PAUSE).await;

    // Primary debugging aid when the markup drifts: snapshot the page
    // before trying to locate anything on it.
    let snapshot = output_dir.join(config::BILLING_SNAPSHOT);
    session.screenshot(&snapshot).await?;
    info!(target = "invoice", path = %snapshot.display(), "billing page snapshot saved");
    Ok(())
}

async fn probe_invoice_rows(session: &BrowserSession) {
    match locate::locate(session.page(), &locate::INVOICE_ROWS).await {
        Ok(rows) => {
            info!(target = "invoice", count = rows.len(), "potential invoice rows on the page")
        }
        Err(err) => debug!(target = "invoice", error = %err, "invoice row probe failed"),
    }
}

/// Click the download affordance and watch the staging directory for the
/// browser to finish writing the file, bounded by [`DOWNLOAD_TIMEOUT`].
async fn capture_download(
    link: &Element,
    staging_dir: &Path,
    output_dir: &Path,
) -> Result<PathBuf> {
    let before = list_files(staging_dir)?;
    click(link).await?;

    let captured = wait_for_download(staging_dir, &before, DOWNLOAD_TIMEOUT).await?;
    let dest = output_dir.join(invoice_filename(Local::now().date_naive()));
    move_file(&captured, &dest)?;
    info!(target = "invoice", path = %dest.display(), "invoice downloaded");
    Ok(dest)
}

/// Artifact name for the current billing period. Uses the run date, not
/// the invoice's own billing date.
fn invoice_filename(date: NaiveDate) -> String {
    format!("openai_invoice_{}.pdf", date.format("%Y%m"))
}

async fn wait_for_download(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut last_seen: Option<(PathBuf, u64)> = None;
    loop {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if before.contains(&path) || is_partial_download(&path) {
                continue;
            }
            let size = std::fs::metadata(&path)?.len();
            // Two consecutive sightings at the same non-zero size means
            // the browser is done writing.
            let stable = matches!(&last_seen, Some((seen, prev)) if *seen == path && *prev == size && size > 0);
            if stable {
                return Ok(path);
            }
            last_seen = Some((path, size));
            break;
        }
        if Instant::now() >= deadline {
            return Err(InvoiceError::Timeout {
                what: "invoice download",
                ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn is_partial_download(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("crdownload" | "tmp"))
}

/// Rename with a copy fallback; staging and output may differ only in
/// name, but nothing guarantees they share a filesystem.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

fn list_files(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        files.insert(entry?.path());
    }
    Ok(files)
}

async fn first(session: &BrowserSession, target: &locate::Target) -> Result<Option<Element>> {
    Ok(locate::locate(session.page(), target).await?.into_iter().next())
}

async fn require(session: &BrowserSession, target: &locate::Target) -> Result<Element> {
    first(session, target)
        .await?
        .ok_or(InvoiceError::ElementNotFound { target: target.name })
}

async fn click(element: &Element) -> Result<()> {
    element.click().await?;
    Ok(())
}

async fn fill(element: &Element, value: &str) -> Result<()> {
    element.click().await?;
    element.type_str(value).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_deterministic_per_month() {
        let march = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(invoice_filename(march), "openai_invoice_202503.pdf");
        // Same month, different day: same artifact name.
        let later = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(invoice_filename(later), invoice_filename(march));
    }

    #[test]
    fn verification_urls_are_distinguished() {
        assert!(is_verification_url("https://auth.openai.com/verify-email"));
        assert!(is_verification_url("https://auth.openai.com/MFA/challenge"));
        assert!(!is_verification_url("https://auth.openai.com/authorize"));
    }

    #[test]
    fn login_page_is_not_authenticated() {
        assert!(!is_authenticated_url("https://platform.openai.com/login"));
        assert!(!is_authenticated_url("https://auth.openai.com/authorize"));
        assert!(is_authenticated_url("https://platform.openai.com/settings/organization"));
    }

    #[test]
    fn partial_downloads_are_skipped() {
        assert!(is_partial_download(Path::new("/tmp/x/invoice.pdf.crdownload")));
        assert!(!is_partial_download(Path::new("/tmp/x/invoice.pdf")));
    }

    #[tokio::test]
    async fn download_watch_picks_up_new_stable_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.pdf"), b"already there").unwrap();
        let before = list_files(dir.path()).unwrap();

        let target = dir.path().join("invoice.pdf");
        std::fs::write(&target, b"%PDF-1.7 payload").unwrap();

        let found = wait_for_download(dir.path(), &before, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, target);
    }

    #[tokio::test]
    async fn download_watch_ignores_in_progress_files() {
        let dir = tempfile::tempdir().unwrap();
        let before = list_files(dir.path()).unwrap();
        std::fs::write(dir.path().join("invoice.pdf.crdownload"), b"partial").unwrap();

        let err = wait_for_download(dir.path(), &before, Duration::from_millis(600))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::Timeout { what: "invoice download", .. }));
    }

    #[tokio::test]
    async fn download_watch_times_out_when_nothing_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let before = list_files(dir.path()).unwrap();

        let err = wait_for_download(dir.path(), &before, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::Timeout { .. }));
    }

    #[test]
    fn move_file_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("staged.pdf");
        let to = dir.path().join("openai_invoice_202503.pdf");
        std::fs::write(&from, b"new bytes").unwrap();
        std::fs::write(&to, b"stale bytes").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new bytes");
    }
}
