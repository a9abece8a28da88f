mod cli;

pub use cli::Cli;
use cli::Commands;

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match &self.command {
            Commands::GetError(get_error) => {
                self.get_error(get_error).await?;
            },
            Commands::GetLog(get_log) => {
                self.get_log(get_log).await?;
            },
        }

        Ok(())
    }
}
