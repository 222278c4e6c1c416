use clap::Parser;
use pff::{Item, ItemType, PffFile};

mod args;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = args::Args::try_parse()?;
    let mut file = PffFile::new();
    file.open(&args.file, "r")?;
    if let Some(codepage) = &args.codepage {
        file.set_ascii_codepage(codepage)?;
    }

    let store = file.message_store()?;
    println!("Store: {}", store.display_name()?.unwrap_or_default());

    match file.root_folder()? {
        Some(root) => print_folder(&root, 0)?,
        None => println!("No root folder"),
    }

    for orphan in file.orphan_items()? {
        println!(
            "Orphan 0x{:08X}: {:?}",
            orphan.identifier(),
            orphan.item_type()
        );
    }

    file.close()?;
    Ok(())
}

fn print_folder(folder: &Item, depth: usize) -> anyhow::Result<()> {
    let indent = "  ".repeat(depth);
    let name = folder.display_name()?.unwrap_or_default();
    println!(
        "{indent}{name} ({} messages)",
        folder.number_of_sub_messages()?
    );

    for index in 0..folder.number_of_sub_messages()? {
        let message = folder.sub_message(index)?;
        if message.item_type() != ItemType::Message {
            continue;
        }
        let subject = message.subject()?.unwrap_or_default();
        println!(
            "{indent}  - {subject} [{} attachments]",
            message.number_of_attachments()?
        );
    }

    for index in 0..folder.number_of_sub_folders()? {
        print_folder(&folder.sub_folder(index)?, depth + 1)?;
    }
    Ok(())
}
