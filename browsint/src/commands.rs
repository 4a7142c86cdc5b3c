use crate::CLAP_STYLING;
use browsint_core::config::DEFAULT_DATA_DIR;
use browsint_scanner::MAX_CRAWL_DELAY_SECS;
use clap::{arg, command};

fn parse_delay(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !(0.0..=MAX_CRAWL_DELAY_SECS).contains(&seconds) {
        return Err(format!(
            "delay must be between 0 and {} seconds",
            MAX_CRAWL_DELAY_SECS
        ));
    }
    Ok(seconds)
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("browsint")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("browsint")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("init")
                .about("Initializes the browsint data directory and database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the browsint data directory")
                        .default_value(DEFAULT_DATA_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a website breadth-first, saving pages and mapping the site, or \
                survey it for OSINT.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to start crawling from"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth from the start URL")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"delay" <SECONDS>)
                        .required(false)
                        .help("Politeness delay before each request, in seconds")
                        .value_parser(parse_delay)
                        .default_value("1.0"),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("download: save pages and map the site; osint: collect emails, phones and technologies")
                        .value_parser(["download", "osint"])
                        .default_value("download"),
                )
                .arg(
                    arg!(--"no-save")
                        .required(false)
                        .help("Do not write fetched pages to disk")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-r --"robots" <DECISION>)
                        .required(false)
                        .help("How to treat robots.txt: respect, override, or ask after previewing it")
                        .value_parser(["respect", "override", "ask"])
                        .default_value("ask"),
                )
                .arg(
                    arg!(--"data-dir" <PATH>)
                        .required(false)
                        .help("Location of the browsint data directory")
                        .default_value(DEFAULT_DATA_DIR),
                )
                .arg(
                    arg!(--"user-agent" <AGENT>)
                        .required(false)
                        .help("User-Agent header sent with every request"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print crawl statistics as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command_argument_builder().debug_assert();
    }

    #[test]
    fn test_crawl_defaults() {
        let matches = command_argument_builder()
            .try_get_matches_from(["browsint", "crawl", "--url", "example.com"])
            .unwrap();
        let (name, crawl) = matches.subcommand().unwrap();
        assert_eq!(name, "crawl");
        assert_eq!(crawl.get_one::<usize>("depth"), Some(&2));
        assert_eq!(crawl.get_one::<f64>("delay"), Some(&1.0));
        assert_eq!(crawl.get_one::<String>("mode").map(String::as_str), Some("download"));
        assert_eq!(crawl.get_one::<String>("robots").map(String::as_str), Some("ask"));
        assert!(!crawl.get_flag("no-save"));
        assert!(!crawl.get_flag("json"));
    }

    #[test]
    fn test_delay_must_be_in_range() {
        for delay in ["inf", "NaN", "-1", "1e20", "soon"] {
            let result = command_argument_builder().try_get_matches_from([
                "browsint", "crawl", "--url", "example.com", "--delay", delay,
            ]);
            assert!(result.is_err(), "delay {} was accepted", delay);
        }

        let matches = command_argument_builder()
            .try_get_matches_from(["browsint", "crawl", "--url", "example.com", "--delay", "0"])
            .unwrap();
        let (_, crawl) = matches.subcommand().unwrap();
        assert_eq!(crawl.get_one::<f64>("delay"), Some(&0.0));
    }

    #[test]
    fn test_http_options() {
        let matches = command_argument_builder()
            .try_get_matches_from([
                "browsint", "crawl", "--url", "example.com", "--user-agent", "Acme/1.0",
                "--timeout", "5",
            ])
            .unwrap();
        let (_, crawl) = matches.subcommand().unwrap();
        assert_eq!(
            crawl.get_one::<String>("user-agent").map(String::as_str),
            Some("Acme/1.0")
        );
        assert_eq!(crawl.get_one::<u64>("timeout"), Some(&5));

        let result = command_argument_builder().try_get_matches_from([
            "browsint", "crawl", "--url", "example.com", "--timeout", "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let result = command_argument_builder().try_get_matches_from([
            "browsint", "crawl", "--url", "example.com", "--mode", "fuzz",
        ]);
        assert!(result.is_err());
    }
}
