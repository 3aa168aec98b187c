//! runmon CLI entry point.

use runmon_lib::cli::{self, Cli};
use runmon_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
