//! Build script
//!
//! Locates the FFmpeg decoding libraries before the sys crate does, so a
//! missing system install surfaces as one readable warning instead of a
//! linker error. Nothing here is fatal: with the bundled-build feature the
//! sys crate compiles its own FFmpeg when the probe comes up empty.

use std::env;
use std::path::PathBuf;

const FFMPEG_LIBS: &[&str] = &[
    "libavformat",
    "libavcodec",
    "libavutil",
    "libswscale",
    "libswresample",
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");

    if configure_from_env() {
        return;
    }

    let missing: Vec<&str> = FFMPEG_LIBS
        .iter()
        .copied()
        .filter(|lib| {
            pkg_config::Config::new()
                .cargo_metadata(false)
                .probe(lib)
                .is_err()
        })
        .collect();

    if missing.is_empty() {
        return;
    }

    println!(
        "cargo:warning=System FFmpeg incomplete ({} not found); falling back to the bundled build",
        missing.join(", ")
    );
    print_install_hint();
}

/// Honor an explicit FFmpeg prefix
fn configure_from_env() -> bool {
    match env::var("FFMPEG_DIR") {
        Ok(dir) => {
            let lib_dir = PathBuf::from(&dir).join("lib");
            if lib_dir.exists() {
                println!("cargo:rustc-link-search=native={}", lib_dir.display());
                true
            } else {
                println!(
                    "cargo:warning=FFMPEG_DIR is set but {} does not exist",
                    lib_dir.display()
                );
                false
            }
        }
        Err(_) => false,
    }
}

fn print_install_hint() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    match target_os.as_str() {
        "linux" => println!(
            "cargo:warning=  Debian/Ubuntu: apt install libavformat-dev libavcodec-dev libavutil-dev libswscale-dev libswresample-dev"
        ),
        "macos" => println!("cargo:warning=  brew install ffmpeg"),
        "windows" => println!("cargo:warning=  set FFMPEG_DIR to an extracted FFmpeg build"),
        _ => {}
    }
}
