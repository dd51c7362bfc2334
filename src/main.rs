use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{info, warn};

use pulse::config::Config;
use pulse::error::DispatchError;
use pulse::model::Post;
use pulse::mutation::{Action, DispatchOutcome};
use pulse::output::terminal;
use pulse::session::Session;

/// Pulse: a terminal client for the Pulse social feed.
///
/// Every action is applied locally first and reconciled with the server's
/// answer, or rolled back if the server refuses it.
#[derive(Parser)]
#[command(name = "pulse", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the home feed
    Feed,

    /// Search posts by text or entity
    Search {
        /// The search query
        query: String,
    },

    /// Explore posts mentioning an entity (person, place, hashtag)
    Explore {
        /// The entity's surface text (e.g. "Bengaluru" or "#cricket")
        entity: String,
    },

    /// Show a user's profile and posts
    Profile {
        /// Username, without the @
        username: String,
    },

    /// Show your bookmarked posts
    Bookmarks,

    /// Show trending topics from the last 24 hours
    Trending,

    /// Like or unlike a post
    Like { post_id: String },

    /// Bookmark or un-bookmark a post
    Bookmark { post_id: String },

    /// Follow a user
    Follow { username: String },

    /// Unfollow a user
    Unfollow { username: String },

    /// Delete one of your posts
    Delete { post_id: String },

    /// Translate a post (run again to toggle back to the original)
    Translate { post_id: String },

    /// Add a comment to a post
    Comment {
        post_id: String,
        /// The comment text
        text: String,
    },

    /// Regenerate the background context for a post
    Context { post_id: String },

    /// Show session status (API, credentials, cache)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pulse=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let session = Session::from_config(&config)?;

    match cli.command {
        Commands::Feed => {
            let posts = with_spinner("Loading feed...", session.load_feed()).await?;
            terminal::display_posts("Feed", &posts);
        }

        Commands::Search { query } => {
            let posts = with_spinner("Searching...", session.load_search(&query)).await?;
            terminal::display_posts(&format!("Search: {query}"), &posts);
        }

        Commands::Explore { entity } => {
            let posts = with_spinner("Exploring...", session.load_entity(&entity)).await?;
            terminal::display_posts(&entity, &posts);
        }

        Commands::Profile { username } => {
            let username = username.trim_start_matches('@');
            let (user, posts) =
                with_spinner("Loading profile...", session.load_profile(username)).await?;
            terminal::display_user(&user);
            terminal::display_posts("Posts", &posts);
        }

        Commands::Bookmarks => {
            config.require_token()?;
            let posts = with_spinner("Loading bookmarks...", session.load_bookmarks()).await?;
            terminal::display_posts("Bookmarks", &posts);
        }

        Commands::Trending => {
            let topics = with_spinner("Loading trends...", session.load_trending()).await?;
            terminal::display_trending(&topics);
        }

        Commands::Like { post_id } => {
            config.require_token()?;
            run_post_action(&session, Action::like(&post_id)).await?;
        }

        Commands::Bookmark { post_id } => {
            config.require_token()?;
            run_post_action(&session, Action::bookmark(&post_id)).await?;
        }

        Commands::Delete { post_id } => {
            config.require_token()?;
            ensure_post_loaded(&session, &post_id).await?;
            let outcome = dispatch(&session, Action::delete(&post_id)).await?;
            terminal::display_outcome(&outcome);
        }

        Commands::Translate { post_id } => {
            run_post_action(&session, Action::translate(&post_id)).await?;
        }

        Commands::Context { post_id } => {
            config.require_token()?;
            run_post_action(&session, Action::regenerate_context(&post_id)).await?;
        }

        Commands::Comment { post_id, text } => {
            config.require_token()?;
            load_current_user(&session).await;
            ensure_post_loaded(&session, &post_id).await?;
            session.load_comments(&post_id).await?;

            let outcome = dispatch(&session, Action::comment(&post_id, text)).await?;
            terminal::display_outcome(&outcome);
            terminal::display_comments(&session.cache().comments(&post_id));
        }

        Commands::Follow { username } => {
            config.require_token()?;
            run_follow(&session, &username, true).await?;
        }

        Commands::Unfollow { username } => {
            config.require_token()?;
            run_follow(&session, &username, false).await?;
        }

        Commands::Status => {
            load_current_user(&session).await;
            pulse::status::show(&session, &config);
        }
    }

    Ok(())
}

/// Load the post, dispatch `action` against it and show the reconciled post.
async fn run_post_action(session: &Session, action: Action) -> Result<()> {
    let post_id = action.target().to_string();
    ensure_post_loaded(session, &post_id).await?;

    let outcome = dispatch(session, action).await?;
    terminal::display_outcome(&outcome);
    if let Some(post) = session.cache().post(&post_id) {
        terminal::display_post(&post);
    }
    Ok(())
}

/// Resolve the username to an id, then follow or unfollow across every
/// cached post by that user.
async fn run_follow(session: &Session, username: &str, follow: bool) -> Result<()> {
    load_current_user(session).await;
    let username = username.trim_start_matches('@');
    let (user, _) = with_spinner("Loading profile...", session.load_profile(username)).await?;

    let action = if follow {
        Action::follow(&user.id)
    } else {
        Action::unfollow(&user.id)
    };
    let outcome = dispatch(session, action).await?;
    terminal::display_outcome(&outcome);
    if let Some(user) = session.cache().user(&user.id) {
        terminal::display_user(&user);
    }
    Ok(())
}

async fn dispatch(session: &Session, action: Action) -> Result<DispatchOutcome> {
    let kind = action.kind();
    let target = action.target().to_string();
    let outcome = session.dispatch(action).await.map_err(|e| match e {
        DispatchError::UnknownTarget(_) => anyhow::anyhow!("{target} could not be found"),
        other => anyhow::Error::from(other),
    })?;
    info!(action = %kind, target_id = %target, outcome = ?outcome, "Dispatched");
    Ok(outcome)
}

/// Put the post in the cache, from the feed if it is there, otherwise by id.
async fn ensure_post_loaded(session: &Session, post_id: &str) -> Result<Post> {
    if let Some(post) = session.cache().post(post_id) {
        return Ok(post);
    }
    let feed = with_spinner("Loading feed...", session.load_feed()).await?;
    if let Some(post) = feed.into_iter().find(|p| p.id == post_id) {
        return Ok(post);
    }
    session.load_post(post_id).await
}

/// The current user authors comment placeholders and guards against
/// self-follows. Failure here is not fatal.
async fn load_current_user(session: &Session) {
    if let Err(e) = session.load_current_user().await {
        warn!(error = %e, "Could not load current user");
        println!("{}", "Not signed in; some details may be missing.".dimmed());
    }
}

async fn with_spinner<T, F>(message: &'static str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .context("Invalid spinner template")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    let result = fut.await;
    pb.finish_and_clear();
    result
}
