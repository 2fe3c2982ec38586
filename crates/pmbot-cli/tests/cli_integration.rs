use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn pmbot() -> Command {
    let mut command = Command::new(assert_cmd::cargo::cargo_bin!("pmbot"));
    for key in [
        "PMBOT_DISCORD_TOKEN",
        "PMBOT_REPORT_CHANNEL_ID",
        "PMBOT_REPORT_HOURS",
        "PMBOT_TIMEZONE",
        "PMBOT_GITHUB_REPOS",
        "PMBOT_REVIEW_RECIPIENT",
        "PMBOT_STATE_DIR",
    ] {
        command.env_remove(key);
    }
    command
}

#[test]
fn functional_help_lists_environment_variables() {
    pmbot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("PMBOT_DISCORD_TOKEN"))
        .stdout(predicate::str::contains("--report-hours"))
        .stdout(predicate::str::contains("--review-recipient"));
}

#[test]
fn regression_missing_token_is_a_usage_error() {
    pmbot()
        .args(["--report-channel-id", "123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--discord-token"));
}

#[test]
fn regression_invalid_timezone_and_recipient_are_rejected() {
    pmbot()
        .args([
            "--discord-token",
            "token",
            "--report-channel-id",
            "123",
            "--timezone",
            "Mars/Olympus",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown timezone"));

    pmbot()
        .args([
            "--discord-token",
            "token",
            "--report-channel-id",
            "123",
            "--review-recipient",
            "everyone",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid review recipient"));
}

#[test]
fn integration_rejected_bot_token_stops_startup() {
    let server = MockServer::start();
    let me = server.mock(|when, then| {
        when.method(GET)
            .path("/users/@me")
            .header("authorization", "Bot bad-token");
        then.status(401)
            .json_body(json!({"message": "401: Unauthorized", "code": 0}));
    });
    let state = tempdir().expect("tempdir");

    pmbot()
        .args([
            "--discord-token",
            "bad-token",
            "--discord-api-base",
            &server.base_url(),
            "--report-channel-id",
            "123",
            "--retry-max-attempts",
            "1",
        ])
        .arg("--state-dir")
        .arg(state.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to resolve bot identity"));
    me.assert_calls(1);
}
