use assert_cmd::Command;
use predicates::prelude::*;

fn write_trace(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("trace.txt");
    std::fs::write(
        &path,
        "IT 0x1000 E bl f\n\
         CALL\n\
         IT 0x2000 E nop\n\
         RET\n\
         IT 0x1004 E ret\n",
    )
    .unwrap();
    path
}

/// Literal S1 scenario, driven through the actual compiled binary.
#[test]
fn index_then_callinfo_round_trips_through_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_trace(dir.path());

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["index", trace.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["callinfo", "--no-index", trace.to_str().unwrap(), "0x1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("line:1"));
}

#[test]
fn flamegraph_emits_collapsed_stacks() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_trace(dir.path());

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["flamegraph", trace.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("0x1000;0x2000 1"));
}

#[test]
fn vcd_emits_register_dump() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("trace.txt");
    std::fs::write(&trace, "IT 0x1000 E mov r0, #1\nR r0 00000001\n").unwrap();

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["vcd", &trace.to_string_lossy(), "--reg", "r0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$var wire 32 ! r0 $end"));
}

#[test]
fn no_index_without_an_existing_index_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_trace(dir.path());

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["callinfo", "--no-index", trace.to_str().unwrap(), "0x1000"])
        .assert()
        .code(3);
}

#[test]
fn callinfo_resolves_symbol_names_via_image() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_trace(dir.path());
    let src = dir.path().join("image.c");
    let elf = dir.path().join("image.elf");
    std::fs::write(&src, "void f(void) {}\nvoid g(void) {}\n").unwrap();
    let status = std::process::Command::new("cc")
        .args(["-c", "-o"])
        .arg(&elf)
        .arg(&src)
        .status()
        .unwrap();
    assert!(status.success());

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["callinfo", "--image"])
        .arg(&elf)
        .arg(&trace)
        .arg("f")
        .assert()
        .success()
        .stdout(predicate::str::contains("Symbol 'f'").and(predicate::str::contains("bytes) called from")));
}

#[test]
fn only_index_builds_without_running_the_query() {
    let dir = tempfile::tempdir().unwrap();
    let trace = write_trace(dir.path());

    Command::cargo_bin("tarmac-vm")
        .unwrap()
        .args(["callinfo", "--only-index", trace.to_str().unwrap(), "0x1000"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    assert!(trace.with_extension("tarmac-index").exists());
}
