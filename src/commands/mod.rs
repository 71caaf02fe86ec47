mod fetch;

use crate::cli::Commands;
use crate::error::Result;

pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Fetch { output_dir, headed, bucket, prefix } => {
            fetch::execute(output_dir, headed, bucket, prefix).await
        }
    }
}
