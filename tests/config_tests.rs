//! Loading configuration files from disk.

use std::io::Write;
use std::time::Duration;

use telemetry_receivers::config::{Config, DEFAULT_ENDPOINT};
use telemetry_receivers::webhook::AttributeNaming;
use telemetry_receivers::{ConfigError, ReceiverError};

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn full_file_loads_and_validates() {
    let file = write_config(
        r#"
log_level = "debug"

[github_rate_limit]
token = "ghp_abc"
name = "ci-bot"
target = "my-org"
scrape_interval = 30

[webhook]
endpoint = "0.0.0.0:9000"
attribute_naming = "prefixed"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.effective_log_level(), "debug");

    let poller = config.github_rate_limit.as_ref().unwrap().validate().unwrap();
    assert_eq!(poller.endpoint(), DEFAULT_ENDPOINT);
    assert_eq!(poller.interval(), Duration::from_secs(30));

    let webhook = config.webhook.as_ref().unwrap().validate().unwrap();
    assert_eq!(webhook.addr.port(), 9000);
    assert_eq!(webhook.path, "/events");
    assert_eq!(webhook.attribute_naming, AttributeNaming::Prefixed);
}

#[test]
fn section_log_level_is_used_without_top_level() {
    let file = write_config(
        r#"
[github_rate_limit]
token = "t"
name = "n"
target = "o"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.effective_log_level(), "error");
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ReceiverError::Io(_)), "{err:?}");
}

#[test]
fn unknown_key_is_parse_error() {
    let file = write_config("[github_rate_limit]\ntokn = \"typo\"\n");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ReceiverError::Toml(_)), "{err:?}");
}

#[test]
fn empty_file_has_no_receivers() {
    let file = write_config("");
    let config = Config::from_file(file.path()).unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::NoReceivers)));
}

#[test]
fn invalid_section_surfaces_its_error() {
    let file = write_config(
        r#"
[github_rate_limit]
token = "t"
name = "n"
target = "o"
scrape_interval = 0
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidScrapeInterval)
    ));
}
