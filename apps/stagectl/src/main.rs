use anyhow::Result;
use clap::Parser;
use storage::ScriptureDb;

mod cli;
mod client;

use cli::{parse_mode, Cli, Command, DbCommand};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    if let Some(frame) = cli.command.frame()? {
        client::send_frame(&cli.server_url, &frame).await?;
        println!("sent {}", serde_json::to_string(&frame)?);
        return Ok(());
    }

    match cli.command {
        Command::Info => {
            let info = client::fetch_info(&cli.server_url).await?;
            println!("connect phones to {}:{}", info.ip, info.port);
            if info.devices.is_empty() {
                println!("no phones connected");
            }
            for device in info.devices {
                println!("  {} {}", device.id, device.address);
            }
        }
        Command::Watch { mode } => {
            client::watch(&cli.server_url, parse_mode(&mode)?).await?;
        }
        Command::Db(db) => run_db(db).await?,
        Command::Timer(_) | Command::Agenda(_) | Command::Present { .. } | Command::Clear => {}
    }

    Ok(())
}

async fn run_db(command: DbCommand) -> Result<()> {
    match command {
        DbCommand::AddBook {
            index,
            name,
            abbrev,
            database_url,
        } => {
            let db = ScriptureDb::open(&database_url).await?;
            db.seed_book(index, &name, &abbrev).await?;
            println!("stored book {index} {name}");
        }
        DbCommand::AddVerse {
            version,
            book,
            chapter,
            verse,
            text,
            database_url,
        } => {
            let db = ScriptureDb::open(&database_url).await?;
            db.insert_verse(&version, book, chapter, verse, &text).await?;
            println!("stored {version} {book}:{chapter}:{verse}");
        }
        DbCommand::Books { database_url } => {
            let db = ScriptureDb::open(&database_url).await?;
            for (index, book) in db.list_books().await?.into_iter().enumerate() {
                let chapters = book
                    .chapter_count
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "?".into());
                println!("{index:>3} {} ({}) {chapters} chapters", book.name, book.abbreviation);
            }
        }
    }
    Ok(())
}
