use std::process::Command;

#[test]
fn prints_version() {
    let exe = env!("CARGO_BIN_EXE_arena-roll");
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .expect("run arena-roll --version");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "stdout was: {}",
        stdout.trim()
    );
}

#[test]
fn prints_help() {
    let exe = env!("CARGO_BIN_EXE_arena-roll");
    let output = Command::new(exe)
        .arg("-h")
        .output()
        .expect("run arena-roll -h");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("stdout utf8");
    assert!(stdout.contains("arena-roll"));
    assert!(stdout.contains("--channel"));
    assert!(stdout.contains("--version"));
}

#[test]
fn unknown_flags_fail_with_an_error() {
    let exe = env!("CARGO_BIN_EXE_arena-roll");
    let output = Command::new(exe)
        .arg("--bogus")
        .output()
        .expect("run arena-roll --bogus");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    assert!(stderr.starts_with("error: "), "stderr was: {stderr}");
}

#[test]
fn flags_missing_their_value_fail() {
    let exe = env!("CARGO_BIN_EXE_arena-roll");
    let output = Command::new(exe)
        .arg("--channel")
        .output()
        .expect("run arena-roll --channel");
    assert_eq!(output.status.code(), Some(1));
}
