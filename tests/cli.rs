use assert_cmd::prelude::*;
use predicates::str::contains;
use std::process::Command;

#[test]
fn headless_run_simulates_default_ten_seconds() {
    let mut cmd = Command::cargo_bin("seascape").expect("binary exists");
    cmd.arg("--headless");
    cmd.assert()
        .success()
        .stdout(contains("Composed ocean scene:"))
        .stdout(contains(" - water: 10000 x 10000 plane, distortion scale 3.7"))
        .stdout(contains(" - sky: turbidity 10, rayleigh 2"))
        .stdout(contains(" - sun: elevation 2 deg, azimuth 180 deg, direction ("))
        .stdout(contains("0.0349, -0.9994)"))
        .stdout(contains(
            "Simulated 600 frames: water time 10.000 s, 600 submissions",
        ));
}

#[test]
fn headless_frame_count_is_configurable() {
    let mut cmd = Command::cargo_bin("seascape").expect("binary exists");
    cmd.arg("--headless").arg("--frames").arg("90");
    cmd.assert().success().stdout(contains(
        "Simulated 90 frames: water time 1.500 s, 90 submissions",
    ));
}

#[test]
fn unknown_argument_is_rejected() {
    let mut cmd = Command::cargo_bin("seascape").expect("binary exists");
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}

#[test]
fn frames_flag_requires_a_number() {
    let mut cmd = Command::cargo_bin("seascape").expect("binary exists");
    cmd.arg("--headless").arg("--frames").arg("soon");
    cmd.assert()
        .failure()
        .stderr(contains("invalid frame count: soon"));
}
