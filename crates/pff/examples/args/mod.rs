use clap::Parser;

#[derive(Parser)]
#[command(version, about, long_about)]
pub struct Args {
    pub file: String,

    /// Codepage name for 8-bit strings, e.g. `windows-1252`.
    #[clap(long)]
    pub codepage: Option<String>,
}
