// Session status display — API endpoint, credentials, cache and in-flight counts.

use crate::config::Config;
use crate::output::terminal;
use crate::session::Session;

/// Display session status to the terminal.
pub fn show(session: &Session, config: &Config) {
    println!("API: {}", config.api_url);
    match &config.token {
        Some(_) => println!("Token: configured"),
        None => {
            println!("Token: not set");
            println!("  Set PULSE_TOKEN to like, follow, bookmark or comment");
        }
    }
    println!("Translation language: {}", config.target_lang);
    println!(
        "Pending timeout: {}s  Request timeout: {}s",
        config.pending_timeout.as_secs(),
        config.request_timeout.as_secs()
    );

    match session.cache().current_user() {
        Some(me) => println!("Signed in as: @{}", me.username),
        None => println!("Signed in as: unknown"),
    }

    let derived = session.derived().len();
    println!("Cached translations/context: {}", derived);

    terminal::display_stats(&session.cache().stats(), &session.pending());
}
