// Colored terminal output for feeds, profiles and mutation results.
//
// This module handles all terminal-specific formatting: colors, tables,
// badges. The main.rs command handlers delegate here.

use chrono::Utc;
use colored::Colorize;

use crate::cache::CacheStats;
use crate::model::{Comment, EntityTag, Post, TagSource, TrendingTopic, UserSummary};
use crate::mutation::{DispatchOutcome, MutationRecord, Notice, Resolution};

/// Display a list of posts under a heading.
pub fn display_posts(title: &str, posts: &[Post]) {
    println!("\n{}", format!("=== {} ({} posts) ===", title, posts.len()).bold());
    if posts.is_empty() {
        println!("  Nothing here yet.");
        return;
    }
    println!();
    for post in posts {
        display_post(post);
    }
}

/// Display a single post card.
pub fn display_post(post: &Post) {
    let now = Utc::now();
    let age = super::time_ago(post.created_at.as_deref(), now);
    let follow_badge = if post.author_followed {
        " following".green().to_string()
    } else {
        String::new()
    };

    println!(
        "  {} @{}{}  {}",
        post.id.dimmed(),
        post.author_name.bold(),
        follow_badge,
        age.dimmed()
    );

    if post.is_high_risk() {
        println!(
            "    {} flagged content (risk {:.2})",
            "!!".red().bold(),
            post.risk_score
        );
    }

    let text = super::truncate_chars(post.display_text(), 280);
    println!("    {text}");
    if post.translation.as_ref().is_some_and(|t| t.visible) {
        println!("    {}", "(translated)".italic().dimmed());
    }

    if !post.entities.is_empty() {
        let tags: Vec<String> = post.entities.iter().map(format_tag).collect();
        println!("    {}", tags.join("  "));
    }

    let heart = if post.liked {
        "♥".red().to_string()
    } else {
        "♡".normal().to_string()
    };
    let bookmark = if post.bookmarked { "saved".yellow().to_string() } else { String::new() };
    println!(
        "    {} {}   {} comments   {}",
        heart,
        post.likes,
        post.comment_count,
        bookmark
    );

    if let Some(ctx) = &post.context_data {
        if let Some(news) = &ctx.news {
            println!("    {} {}", "news:".dimmed(), news.headline);
        }
    }
    println!();
}

fn format_tag(tag: &EntityTag) -> String {
    match tag.tag_source() {
        Some(TagSource::Mention) => tag.text.blue().to_string(),
        Some(TagSource::Hashtag) => tag.text.cyan().to_string(),
        _ => format!("{} {}", tag.text.magenta(), format!("[{}]", tag.label_name()).dimmed()),
    }
}

/// Display a user profile header.
pub fn display_user(user: &UserSummary) {
    println!("\n{}", format!("=== @{} ===", user.username).bold());
    if let Some(bio) = user.bio.as_deref().filter(|b| !b.trim().is_empty()) {
        println!("  {}", bio);
    }
    let followed = if user.followed {
        "following".green().to_string()
    } else {
        "not following".dimmed().to_string()
    };
    println!(
        "  {} followers  {} following  ({})",
        user.followers_count, user.following_count, followed
    );
}

pub fn display_comments(comments: &[Comment]) {
    println!("\n{}", format!("=== Comments ({}) ===", comments.len()).bold());
    let now = Utc::now();
    for comment in comments {
        let status = if comment.pending {
            " (sending)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  @{}{}  {}",
            comment.username.bold(),
            status,
            super::time_ago(comment.created_at.as_deref(), now).dimmed()
        );
        println!("    {}", super::truncate_chars(&comment.content, 280));
    }
}

/// Display trending topics as a ranked table.
pub fn display_trending(topics: &[TrendingTopic]) {
    if topics.is_empty() {
        println!("No trending topics in the last 24 hours.");
        return;
    }

    println!("\n{}", "=== Trending ===".bold());
    println!();
    println!("  {:>4}  {:<32} {:>6}", "Rank".dimmed(), "Topic".dimmed(), "Posts".dimmed());
    println!("  {}", "-".repeat(46).dimmed());
    for (i, topic) in topics.iter().enumerate() {
        println!("  {:>4}. {:<32} {:>6}", i + 1, topic.topic, topic.count);
    }
}

/// Report how a dispatched mutation ended.
pub fn display_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Settled(Resolution::Confirmed) => {
            println!("{}", "Done.".green());
        }
        DispatchOutcome::Settled(Resolution::RolledBack(notice)) => display_notice(notice),
        DispatchOutcome::Settled(Resolution::Stale) => {
            println!("{}", "That post is no longer available.".dimmed());
        }
        DispatchOutcome::Local => println!("{}", "Toggled.".green()),
        DispatchOutcome::Ignored => {
            println!("{}", "Already in progress.".yellow());
        }
    }
}

pub fn display_notice(notice: &Notice) {
    if notice.session_expired {
        println!("  {} {}", "!!".red().bold(), notice.message.red());
    } else {
        println!("  {} {}", "!".bright_red(), notice.message);
    }
}

/// Cache and in-flight summary for `pulse status`.
pub fn display_stats(stats: &CacheStats, pending: &[MutationRecord]) {
    println!("\n{}", "=== Session ===".bold());
    println!(
        "  Posts: {}  Users: {}  Lists: {}  Comments: {}  Trending: {}",
        stats.posts, stats.users, stats.lists, stats.comments, stats.trending
    );
    if pending.is_empty() {
        println!("  Pending mutations: none");
        return;
    }
    println!("  Pending mutations: {}", pending.len());
    for record in pending {
        println!(
            "    #{} {} {} ({}, issued {})",
            record.id,
            record.action.kind(),
            record.action.target(),
            record.status,
            record.issued_at.format("%H:%M:%S")
        );
    }
}
