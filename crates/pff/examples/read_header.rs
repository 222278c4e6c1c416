use clap::Parser;
use pff::PffFile;

mod args;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = args::Args::try_parse()?;
    let mut file = PffFile::new();
    file.open(&args.file, "r")?;

    println!("File Size: {}", file.size()?);
    println!("Content Type: {:?}", file.content_type()?);
    println!("Encryption: {:?}", file.encryption_type()?);
    println!("Orphan Items: {}", file.number_of_orphan_items()?);

    file.close()?;
    Ok(())
}
