use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};
use sea_orm::{Database, DatabaseConnection};
use serde::Serialize;

use tagboard_query::config::Config;
use tagboard_query::{
    store, MatchMode, Pagination, QueryError, SortDirection, SortField, TagSearch,
    TagSearchRequest,
};

mod strings;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create any missing tables
    Init,

    /// Show a tag, following its alias, with its hierarchy
    Tag { id: i32 },

    /// List images by tag
    Images {
        /// Comma separated tag ids; omit for an unfiltered listing
        #[arg(long, value_delimiter = ',')]
        tags: Vec<i32>,

        /// With a single tag, report it missing instead of listing nothing
        #[arg(long)]
        strict: bool,

        #[arg(long, default_value = "any")]
        mode: MatchMode,

        #[arg(long, default_value = "id")]
        sort: SortField,

        #[arg(long, default_value = "desc")]
        order: SortDirection,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        page: u64,

        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
        per_page: u64,
    },

    /// Show a user's merged activity feed
    History {
        user_id: i32,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        page: u64,

        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
        per_page: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, CliError> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    info!("Starting tagboard-query");

    // connect to db
    let db = Database::connect(cli.config.connect_options())
        .await
        .map_err(QueryError::from)?;

    match run(cli, db).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(CliError::Query(QueryError::TagNotFound(id))) => {
            eprintln!("{}: {id}", strings::TAG_NOT_FOUND);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!("{e}");
            Err(e)
        }
    }
}

async fn run(cli: Cli, db: DatabaseConnection) -> Result<(), CliError> {
    let search = TagSearch::new(db.clone(), cli.config.hierarchy_cache_ttl());

    match cli.command {
        Command::Init => {
            store::create_tables(&db).await?;
            println!("{}", strings::TABLES_CREATED);
        }
        Command::Tag { id } => {
            let detail = search.tag_detail(id).await?;
            print_json(&detail)?;
        }
        Command::Images {
            tags,
            strict,
            mode,
            sort,
            order,
            page,
            per_page,
        } => {
            let page = Pagination::new(page, per_page);
            let images = match (strict, tags.as_slice()) {
                (true, [tag_id]) => search.images_for_tag(*tag_id, sort, order, page).await?,
                _ => {
                    let request = TagSearchRequest {
                        tag_ids: tags,
                        mode,
                        sort,
                        direction: order,
                        page,
                    };
                    search.search_images(&request).await?
                }
            };
            if images.images.is_empty() {
                eprintln!("{} ({} total)", strings::NO_IMAGES, images.total);
            }
            print_json(&images)?;
        }
        Command::History {
            user_id,
            page,
            per_page,
        } => {
            let history = search
                .user_history(user_id, Pagination::new(page, per_page))
                .await?;
            if history.items.is_empty() {
                eprintln!("{} ({} total)", strings::NO_HISTORY, history.total);
            }
            print_json(&history)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Problem originated from the query layer or the database below it
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Problem encoding a result for printing
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
