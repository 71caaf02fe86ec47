use std::path::PathBuf;

pub const LOGIN_URL: &str = "https://platform.openai.com/login";
pub const BILLING_URL: &str = "https://platform.openai.com/settings/organization/billing/history";

/// Snapshot of the billing page, written on every run that reaches it.
pub const BILLING_SNAPSHOT: &str = "billing_page.png";
/// Snapshot written when a run fails after the browser is up.
pub const ERROR_SNAPSHOT: &str = "error_screenshot.png";

const OUTPUT_DIR_VAR: &str = "OUTPUT_DIR";
const HEADLESS_VAR: &str = "HEADLESS";
const BUCKET_VAR: &str = "S3_BUCKET";

const DEFAULT_OUTPUT_DIR: &str = "/tmp/invoices";
const DEFAULT_KEY_PREFIX: &str = "invoices/openai/";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub output_dir: PathBuf,
    pub headless: bool,
    pub bucket: Option<String>,
    pub key_prefix: String,
}

impl FetchConfig {
    /// CLI flags win over the environment; the environment wins over defaults.
    pub fn resolve(
        output_dir: Option<PathBuf>,
        headed: bool,
        bucket: Option<String>,
        prefix: Option<String>,
    ) -> Self {
        let output_dir = output_dir
            .or_else(|| env_nonempty(OUTPUT_DIR_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let headless = !headed && env_flag(HEADLESS_VAR, true);
        let bucket = bucket.or_else(|| env_nonempty(BUCKET_VAR));
        let key_prefix = prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());

        Self { output_dir, headless, bucket, key_prefix }
    }
}

pub(crate) fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_flag(key: &str, default: bool) -> bool {
    match env_nonempty(key) {
        Some(v) => !(v == "0" || v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no")),
        None => default,
    }
}
