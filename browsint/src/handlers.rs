use anyhow::{Context, bail};
use browsint_core::config::Settings;
use browsint_core::crawl::{CrawlEngine, CrawlMode, CrawlRequest, CrawlStats};
use browsint_core::data::Database;
use browsint_scanner::{PolicyDecision, RobotsPolicy};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    let line = line.trim();
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.has_host()
        && !line.contains(char::is_whitespace)
    {
        return Some(with_scheme);
    }

    None
}

pub fn mode_from_arg(value: &str) -> Option<CrawlMode> {
    match value.to_ascii_lowercase().as_str() {
        "download" => Some(CrawlMode::Download),
        "osint" | "osint-survey" => Some(CrawlMode::OsintSurvey),
        _ => None,
    }
}

/// Operator answer to the override prompt. Only an explicit yes overrides.
pub fn decision_from_answer(answer: &str) -> PolicyDecision {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PolicyDecision::Override,
        _ => PolicyDecision::Respect,
    }
}

pub struct InitOutcome {
    pub settings: Settings,
    pub database_created: bool,
    pub replaced_existing: bool,
}

/// Create the data directory tree and database. An existing database is kept unless `force`.
pub fn initialize(data_dir: &str, force: bool) -> anyhow::Result<InitOutcome> {
    let settings = Settings::from_data_dir(data_dir);
    settings
        .ensure_dirs()
        .with_context(|| format!("Failed to create {}", settings.data_dir.display()))?;

    let existed = Database::exists(&settings.database_path);
    if existed && !force {
        return Ok(InitOutcome {
            settings,
            database_created: false,
            replaced_existing: false,
        });
    }

    if existed {
        Database::drop(&settings.database_path).with_context(|| {
            format!("Failed to remove {}", settings.database_path.display())
        })?;
    }
    Database::new(&settings.database_path).with_context(|| {
        format!("Failed to create database at {}", settings.database_path.display())
    })?;

    Ok(InitOutcome {
        settings,
        database_created: true,
        replaced_existing: existed,
    })
}

pub fn render_policy(policy: &RobotsPolicy) -> String {
    let mut out = String::new();
    let disallowed = policy.rules.iter().filter(|r| !r.allow).count();
    let _ = writeln!(
        out,
        "{} {} rules ({} disallow, {} allow)",
        "→".blue(),
        policy.rules.len(),
        disallowed,
        policy.rules.len() - disallowed
    );

    for rule in &policy.rules {
        let verb = if rule.allow {
            "Allow   ".green()
        } else {
            "Disallow".red()
        };
        let marker = if rule.sensitive {
            " (sensitive)".yellow().bold().to_string()
        } else {
            String::new()
        };
        let _ = writeln!(out, "  {} {}{}", verb, rule.path.bright_white(), marker);
    }

    if !policy.sensitive_paths.is_empty() {
        let _ = writeln!(out, "{}", "⚠ Sensitive paths".yellow().bold());
        for path in &policy.sensitive_paths {
            let _ = writeln!(out, "  {} {}", "•".yellow(), path);
        }
    }

    for sitemap in &policy.sitemaps {
        let _ = writeln!(out, "{} Sitemap: {}", "→".blue(), sitemap);
    }

    if let Some(delay) = policy.crawl_delay {
        let _ = writeln!(out, "{} Crawl-delay: {}s", "→".blue(), delay);
    }
    out
}

pub fn render_summary(stats: &CrawlStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Run:".blue(), stats.run_id);
    let _ = writeln!(out, "{} URLs visited: {}", "✓".green().bold(), stats.urls_visited);
    let _ = writeln!(out, "{} Pages saved: {}", "✓".green().bold(), stats.pages_saved);

    let errors = if stats.errors > 0 {
        stats.errors.to_string().red().bold()
    } else {
        stats.errors.to_string().normal()
    };
    let _ = writeln!(out, "{} Errors: {}", "•".blue(), errors);

    if stats.restricted_paths_crawled > 0 {
        let _ = writeln!(
            out,
            "{} Restricted paths crawled: {}",
            "⚠".yellow().bold(),
            stats.restricted_paths_crawled
        );
    }
    if let Some(path) = &stats.download_path {
        let _ = writeln!(out, "{} Files: {}", "→".blue(), path.display().to_string().bright_white());
    }

    if let Some(summary) = &stats.osint_summary {
        let emails: Vec<&str> = summary.emails().collect();
        let _ = writeln!(out, "{} Emails: {}", "→".blue(), emails.len());
        for email in emails {
            let _ = writeln!(out, "  {} {}", "•".cyan(), email);
        }
        for profile in summary.social_profiles() {
            let _ = writeln!(out, "  {} {}: {}", "•".cyan(), profile.platform, profile.url);
        }
        for (page, technologies) in &summary.page_technologies {
            let names: Vec<&str> = technologies
                .framework_cms
                .iter()
                .chain(&technologies.js_libraries)
                .chain(&technologies.analytics)
                .map(String::as_str)
                .collect();
            let _ = writeln!(out, "  {} {}: {}", "•".cyan(), page, names.join(", "));
        }
    }
    out
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

pub fn handle_init(args: &ArgMatches) -> anyhow::Result<()> {
    let data_dir = args
        .get_one::<String>("PATH")
        .context("missing data directory")?;
    let force = args.get_flag("force");

    print_divider();
    println!("{}", "  BROWSINT INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let outcome = initialize(data_dir, force)?;
    let settings = &outcome.settings;

    println!(
        "{} Data directory: {}",
        "✓".green().bold(),
        settings.data_dir.display().to_string().bright_white()
    );
    println!(
        "{} Downloads: {}",
        "✓".green().bold(),
        settings.downloads_dir.display().to_string().bright_white()
    );

    if outcome.replaced_existing {
        println!("{} Existing database removed (force mode)", "→".yellow().bold());
    }
    if outcome.database_created {
        println!(
            "{} Database initialized: {}",
            "✓".green().bold(),
            settings.database_path.display().to_string().bright_white()
        );
    } else {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!(
            "Database already exists at {}. Use --force to overwrite it.",
            settings.database_path.display().to_string().bright_white()
        );
    }
    println!();
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches) -> anyhow::Result<()> {
    let raw_url = args.get_one::<String>("url").context("missing --url")?;
    let Some(start_url) = parse_url_line(raw_url) else {
        bail!("Invalid URL '{}'", raw_url);
    };
    let depth = args.get_one::<usize>("depth").copied().unwrap_or(2);
    let delay = args.get_one::<f64>("delay").copied().unwrap_or(1.0);
    let mode_arg = args.get_one::<String>("mode").map(String::as_str).unwrap_or("download");
    let Some(mode) = mode_from_arg(mode_arg) else {
        bail!("Unknown mode '{}'", mode_arg);
    };
    let robots = args.get_one::<String>("robots").map(String::as_str).unwrap_or("ask");
    let data_dir = args
        .get_one::<String>("data-dir")
        .context("missing --data-dir")?;
    let json = args.get_flag("json");

    let mut settings = Settings::from_data_dir(data_dir);
    if let Some(user_agent) = args.get_one::<String>("user-agent") {
        settings = settings.with_user_agent(user_agent);
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        settings = settings.with_timeout(*timeout);
    }

    let engine = match mode {
        CrawlMode::Download => {
            if !settings.is_initialized() {
                bail!(
                    "No database at {}. Run `browsint init {}` first.",
                    settings.database_path.display(),
                    data_dir
                );
            }
            settings.ensure_dirs()?;
            CrawlEngine::from_settings(&settings)?
        }
        CrawlMode::OsintSurvey => CrawlEngine::survey_from_settings(&settings)?,
    };

    let mut request = CrawlRequest::new(start_url.as_str())
        .with_depth_limit(depth)
        .with_delay(delay)
        .with_mode(mode)
        .with_save_to_disk(!args.get_flag("no-save"));
    request = match robots {
        "override" => request.with_policy_decision(PolicyDecision::Override),
        "ask" => {
            let preview = engine.preview_robots(&start_url).await;
            let decision = ask_robots_decision(preview.as_ref().map(|(policy, _)| policy))?;
            request
                .with_policy_decision(decision)
                .with_previewed_robots(preview)
        }
        _ => request.with_policy_decision(PolicyDecision::Respect),
    };

    if !json {
        println!(
            "\n🕷️  Crawling {} (depth {}, delay {}s, mode {})\n",
            start_url.bright_white(),
            depth,
            delay,
            mode_arg
        );
    }

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Starting crawl...");

    let progress = spinner.clone();
    let engine = engine.with_progress_callback(Arc::new(
        move |count: usize, url: &str, depth: usize| {
            progress.set_message(format!("[{}] depth {} {}", count, depth, url));
        },
    ));

    let result = engine.start_crawl(request).await;
    spinner.finish_and_clear();
    let stats = result.context("Crawl failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_divider();
        println!("{}", "  CRAWL COMPLETE".green().bold());
        print_divider();
        print!("{}", render_summary(&stats));
    }
    Ok(())
}

fn ask_robots_decision(policy: Option<&RobotsPolicy>) -> anyhow::Result<PolicyDecision> {
    let Some(policy) = policy else {
        println!("{} No robots.txt found, all paths allowed", "→".blue());
        return Ok(PolicyDecision::Respect);
    };

    print_divider();
    println!("{}", "  ROBOTS.TXT".bright_white().bold());
    print_divider();
    print!("{}", render_policy(policy));
    println!();

    if policy.rules.iter().all(|r| r.allow) {
        return Ok(PolicyDecision::Respect);
    }

    let answer = print_prompt("Ignore robots.txt and crawl disallowed paths? [y/N]:")?;
    Ok(decision_from_answer(&answer))
}
