use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use dewey::db::{MemoryStorage, RecordStorage, SqliteStorage};
use dewey::feed::FeedController;
use dewey::recommendation::HttpRecommendationSource;
use dewey::{AppConfig, Book, EngagementTracker, FeedStatus, LibraryStore, ReadingStatus, Session};

#[derive(Parser, Debug)]
#[command(name = "dewey", about = "Book recommendations and a personal reading library")]
struct Cli {
    /// Log state transitions
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep the library in memory for this run only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Library database file (overrides DEWEY_LIBRARY_PATH)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Feed API base URL (overrides DEWEY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show recommendations, hiding books already in the library
    Feed {
        /// Search prompt; empty for the general feed
        #[arg(short, long, default_value = "")]
        query: String,
        /// Number of pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Manage the personal library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    /// List owned books, optionally only one status
    List {
        #[arg(short, long)]
        status: Option<ReadingStatus>,
    },
    /// Add a book
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, default_value = "want_to_read")]
        status: ReadingStatus,
    },
    /// Change a book's reading status
    Mark { id: String, status: ReadingStatus },
    /// Remove a book
    Remove { id: String },
}

fn open_library(cli: &Cli, config: &AppConfig) -> Result<LibraryStore> {
    let storage: Box<dyn RecordStorage> = if cli.ephemeral {
        Box::new(MemoryStorage::new())
    } else {
        Box::new(SqliteStorage::open(&config.library_path)?)
    };
    Ok(LibraryStore::new(storage))
}

fn print_book(index: usize, book: &Book) {
    let author = book.author.as_deref().unwrap_or("unknown author");
    println!("{:>3}. [{}] {} by {}", index + 1, book.id, book.title, author);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dewey::init_tracing(cli.verbose);

    let mut config = AppConfig::from_env();
    if let Some(path) = &cli.library {
        config.library_path = path.clone();
    }
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }

    let mut library = open_library(&cli, &config)?;

    match &cli.command {
        Command::Feed { query, pages } => {
            let source = HttpRecommendationSource::new(
                config.api_url.clone(),
                config.project_name.clone(),
                config.api_token.clone(),
            );
            let feed = FeedController::new(source, config.feed_settings());
            // No viewport in a terminal, so there is no dwell to report.
            let mut session = Session::new(library, feed, EngagementTracker::detached());

            session.search(query).await;
            for _ in 1..*pages {
                if !session.load_more().await {
                    break;
                }
            }

            let page = session.feed().page();
            if page.status == FeedStatus::Error {
                let message = page.error_message.as_deref().unwrap_or("unknown error");
                anyhow::bail!("failed to load recommendations: {message}");
            }
            let shown = session.display_feed();
            if shown.is_empty() {
                println!("No recommendations.");
            }
            for (i, book) in shown.iter().enumerate() {
                print_book(i, book);
            }
        }
        Command::Library { action } => match action {
            LibraryAction::List { status } => {
                let books = match status {
                    Some(s) => library.all_by_status(*s),
                    None => library.list(),
                };
                if books.is_empty() {
                    println!("Library is empty.");
                }
                for (i, book) in books.iter().enumerate() {
                    print_book(i, book);
                    println!("       {}", book.status);
                }
            }
            LibraryAction::Add {
                id,
                title,
                author,
                status,
            } => {
                let mut book = Book::new(id.clone(), title.clone());
                book.author = author.clone();
                library.add_with_status(&book, *status)?;
                println!("Added {id} as {status}");
            }
            LibraryAction::Mark { id, status } => {
                if !library.is_member(id) {
                    println!("{id} is not in the library");
                    return Ok(());
                }
                library.set_status(id, *status)?;
                println!("Marked {id} as {status}");
            }
            LibraryAction::Remove { id } => {
                library.remove(id)?;
                println!("Removed {id}");
            }
        },
    }

    Ok(())
}
