//! Process supervisor tests driven by fake shell workers.

mod common;

use common::{bash_worker, missing_interpreter, supervisor, urls};
use rankwatch_crawl::{BatchOutcome, CrawlError};
use uuid::Uuid;

#[tokio::test]
async fn exit_zero_is_success_and_stdin_carries_json_urls() {
    let sup = supervisor(bash_worker("payload=$(cat)\necho \"got:$payload\"\nexit 0\n"));

    let run = sup
        .run(Uuid::new_v4(), &urls(&["https://a", "https://b"]))
        .await;

    assert_eq!(run.outcome, BatchOutcome::Success);
    assert_eq!(run.stdout_tail, vec![r#"got:["https://a","https://b"]"#]);
}

#[tokio::test]
async fn exit_three_is_non_zero_exit_with_stderr_captured() {
    let sup = supervisor(bash_worker("cat >/dev/null\necho boom >&2\nexit 3\n"));

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.outcome, BatchOutcome::NonZeroExit(3));
    assert_eq!(run.stderr_tail, vec!["boom"]);
}

#[tokio::test]
async fn progress_lines_are_counted() {
    let body = r#"cat >/dev/null
echo '{"type":"progress","index":1,"total":2,"asin":"A","url":"https://a","status":"updated"}'
echo 'Fetching https://b'
echo '{"type":"progress","index":2,"total":2,"asin":"B","url":"https://b","status":"updated"}'
"#;
    let sup = supervisor(bash_worker(body));

    let run = sup
        .run(Uuid::new_v4(), &urls(&["https://a", "https://b"]))
        .await;

    assert!(run.outcome.is_success());
    assert_eq!(run.items_reported, 2);
    assert_eq!(run.stdout_tail.len(), 3);
}

#[tokio::test]
async fn capture_keeps_only_most_recent_lines() {
    let mut config = bash_worker("cat >/dev/null\nfor i in $(seq 1 100); do echo \"line $i\"; done\n");
    config.max_captured_lines = 10;
    let sup = supervisor(config);

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.stdout_tail.len(), 10);
    assert_eq!(run.stdout_tail.first().map(String::as_str), Some("line 91"));
    assert_eq!(run.stdout_tail.last().map(String::as_str), Some("line 100"));
}

#[tokio::test]
async fn missing_interpreter_spawns_nothing() {
    let sup = supervisor(missing_interpreter());

    let err = sup.resolve_interpreter().await.unwrap_err();
    assert!(matches!(err, CrawlError::InterpreterNotFound { .. }));

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;
    assert_eq!(run.outcome, BatchOutcome::InterpreterNotFound);
    assert!(run.stdout_tail.is_empty());
    assert!(run.stderr_tail.is_empty());
}

#[tokio::test]
async fn unusable_working_directory_is_spawn_error() {
    let mut config = bash_worker("exit 0\n");
    config.project_root = std::env::temp_dir().join(format!("rankwatch-missing-{}", Uuid::new_v4()));
    let sup = supervisor(config);

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert!(matches!(run.outcome, BatchOutcome::SpawnError(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn killed_worker_reports_minus_one() {
    let sup = supervisor(bash_worker("cat >/dev/null\nkill -9 $$\n"));

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.outcome, BatchOutcome::NonZeroExit(-1));
}

#[tokio::test]
async fn worker_ignoring_stdin_is_classified_by_exit_code() {
    let sup = supervisor(bash_worker("exit 0\n"));

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.outcome, BatchOutcome::Success);
}

#[tokio::test]
async fn non_utf8_output_is_decoded_lossily_and_draining_continues() {
    let mut config = bash_worker(
        "cat >/dev/null\nprintf 'Caf\\xe9 title\\n'\nfor i in $(seq 1 20000); do echo \"line $i\"; done\necho done\nexit 0\n",
    );
    config.max_captured_lines = 5;
    let sup = supervisor(config);

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.outcome, BatchOutcome::Success);
    assert_eq!(run.stdout_tail.last().map(String::as_str), Some("done"));
    assert_eq!(run.stdout_tail.len(), 5);
}

#[tokio::test]
async fn non_utf8_line_is_kept_with_replacement_character() {
    let sup = supervisor(bash_worker("cat >/dev/null\nprintf 'Caf\\xe9\\n' >&2\nexit 0\n"));

    let run = sup.run(Uuid::new_v4(), &urls(&["https://a"])).await;

    assert_eq!(run.outcome, BatchOutcome::Success);
    assert_eq!(run.stderr_tail, vec!["Caf\u{fffd}"]);
}
