use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn image_to_xva_happy_path() {
    let td = assert_fs::TempDir::new().unwrap();
    let img = td.child("demo.img");
    // 2.5 MiB dense image: chunks 0..=2 with a short trailing chunk.
    let data: Vec<u8> = (0..(2 * 1024 * 1024 + 512 * 1024)).map(|i| (i % 251) as u8).collect();
    img.write_binary(&data).unwrap();

    let xva = td.child("demo.xva");
    Command::cargo_bin("img2xva")
        .unwrap()
        .current_dir(td.path())
        .args([
            "--cpus",
            "1",
            "--memory",
            "1",
            "--output",
            xva.path().to_str().unwrap(),
            img.path().to_str().unwrap(),
        ])
        .assert()
        .success();
    xva.assert(predicate::path::is_file());

    // Member names must have the staging prefix stripped: ova.xml at the
    // root, chunks under the VDI ref.
    let listing = Command::new("tar").arg("-tzf").arg(xva.path()).output().unwrap();
    assert!(listing.status.success());
    let members = String::from_utf8(listing.stdout).unwrap();
    assert!(members.contains("ova.xml"));
    for idx in 0..3 {
        assert!(members.contains(&format!("Ref:VDI-1-root/{idx:020}\n")));
        assert!(members.contains(&format!("Ref:VDI-1-root/{idx:020}.checksum")));
    }
    assert!(!members.contains("/tmp/"));
}

#[test]
fn missing_image_fails() {
    let td = assert_fs::TempDir::new().unwrap();
    Command::cargo_bin("img2xva")
        .unwrap()
        .current_dir(td.path())
        .arg("no-such-image.img")
        .assert()
        .failure();
}
