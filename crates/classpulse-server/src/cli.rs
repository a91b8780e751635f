use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "classpulse-server", about = "Live classroom polling server")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "classpulse.toml")]
    pub config: String,

    /// Override the bind address from the config file.
    #[arg(long)]
    pub bind: Option<String>,
}
