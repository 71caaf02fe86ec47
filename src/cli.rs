use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "invoice")]
#[command(about = "Download the latest OpenAI invoice from the billing portal")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in to the billing portal and download the latest invoice
    Fetch {
        /// Directory for the invoice and diagnostic screenshots (env: OUTPUT_DIR)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Run with a visible browser window for debugging (env: HEADLESS=false)
        #[arg(long)]
        headed: bool,

        /// S3 bucket to publish the invoice to (env: S3_BUCKET)
        #[arg(long, value_name = "BUCKET")]
        bucket: Option<String>,

        /// S3 key prefix for published invoices
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fetch_defaults() {
        let cli = Cli::try_parse_from(["invoice", "fetch"]).unwrap();
        match cli.command {
            Commands::Fetch { output_dir, headed, bucket, prefix } => {
                assert!(output_dir.is_none());
                assert!(!headed);
                assert!(bucket.is_none());
                assert!(prefix.is_none());
            }
        }
    }

    #[test]
    fn parse_fetch_with_options() {
        let args = [
            "invoice", "fetch", "-o", "/tmp/out", "--headed", "--bucket", "acme-invoices",
            "--prefix", "billing/",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Fetch { output_dir, headed, bucket, prefix } => {
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/out")));
                assert!(headed);
                assert_eq!(bucket.as_deref(), Some("acme-invoices"));
                assert_eq!(prefix.as_deref(), Some("billing/"));
            }
        }
    }

    #[test]
    fn verbose_flag_counts() {
        let cli = Cli::try_parse_from(["invoice", "-v", "fetch"]).unwrap();
        assert_eq!(cli.verbose, 1);

        let cli = Cli::try_parse_from(["invoice", "-vv", "fetch"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn invalid_command_fails() {
        assert!(Cli::try_parse_from(["invoice", "upload"]).is_err());
    }
}
