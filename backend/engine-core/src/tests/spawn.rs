// Unit tests for spawn module private functions
// Integration tests with fake sidecars are in integration_tests/supervisor.rs

use crate::supervisor::spawn::build_spawn_command;

/// **VALUE**: Verifies that `build_spawn_command()` uses the configured program and args.
///
/// **WHY THIS MATTERS**: The program name comes from host.toml; if it is dropped or the
/// args reordered, the engine starts with the wrong entry point or not at all.
///
/// **BUG THIS CATCHES**: Would catch hardcoding the default binary name or losing args.
#[test]
fn given_program_and_args_when_build_spawn_command_called_then_uses_both() {
    // GIVEN: A custom program and arguments
    let args = vec!["--profile".to_string(), "fast".to_string()];

    // WHEN: Building the spawn command
    let cmd = build_spawn_command("my-engine", &args);

    // THEN: Program and args are passed through unchanged
    let std_cmd = cmd.as_std();
    assert_eq!(std_cmd.get_program(), "my-engine");
    let collected: Vec<_> = std_cmd.get_args().collect();
    assert_eq!(collected, vec!["--profile", "fast"]);
}

/// **VALUE**: Verifies the child's stdout is captured.
///
/// **BUG THIS CATCHES**: Would catch a refactor that inherits stdout, which makes the
/// announcement unreadable and every spawn time out.
#[cfg(unix)]
#[tokio::test]
async fn given_spawn_command_when_spawned_then_stdout_is_piped() {
    // GIVEN/WHEN: Spawning a trivial command through the builder
    let mut child = build_spawn_command("sh", &["-c".to_string(), "echo hi".to_string()])
        .spawn()
        .expect("sh should be available");

    // THEN: stdout and stderr are available to the host
    assert!(child.stdout.take().is_some());
    assert!(child.stderr.take().is_some());
    let _ = child.wait().await;
}
