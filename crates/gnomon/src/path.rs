//! Output path resolution for sinks.
//!
//! Path specs may start with a directory token (`<temp>`, `<home>`,
//! `<current>`) followed by further directories, or consist of a stream
//! token (`<cout>`, `<clog>`, `<cerr>`) naming the entire destination.
//! File names are synthesized as `<program>-<pid>-<salt>.<ext>` with a
//! four-digit random salt so concurrent processes never collide.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use rand::Rng;

/// Resolved destination for a sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkTarget {
    File(PathBuf),
    Stdout,
    /// `<cerr>` and `<clog>` both map here; there is no separate log stream.
    Stderr,
}

/// Resolve a path spec into a concrete target, creating directories as
/// needed.
///
/// # Errors
///
/// Returns an error when the directory cannot be created or canonicalized.
pub fn resolve_target(path_spec: &str, extension: &str) -> io::Result<SinkTarget> {
    match path_spec {
        "<cout>" => Ok(SinkTarget::Stdout),
        "<cerr>" | "<clog>" => Ok(SinkTarget::Stderr),
        _ => {
            let directory = resolve_directory(path_spec)?;
            Ok(SinkTarget::File(directory.join(sink_filename(extension))))
        }
    }
}

/// Expand a leading directory token, canonicalize, and create the directory.
pub fn resolve_directory(path_spec: &str) -> io::Result<PathBuf> {
    let (mut directory, rest) = if let Some(rest) = path_spec.strip_prefix("<temp>") {
        (env::temp_dir(), rest)
    } else if let Some(rest) = path_spec.strip_prefix("<home>") {
        (home_path(), rest)
    } else if let Some(rest) = path_spec.strip_prefix("<current>") {
        (env::current_dir()?, rest)
    } else if path_spec.is_empty() {
        (env::current_dir()?, "")
    } else {
        // No token: the string itself is the directory, absolute or relative.
        (PathBuf::from(path_spec), "")
    };

    let rest = rest.trim_start_matches('/');
    if !rest.is_empty() {
        directory.push(rest);
    }
    fs::create_dir_all(&directory)?;
    directory.canonicalize()
}

/// Synthesized sink file name, `<program>-<pid>-<salt>.<ext>`.
pub fn sink_filename(extension: &str) -> String {
    let salt: u32 = rand::rng().random_range(0..10_000);
    format!(
        "{}-{}-{:04}.{}",
        program_name(),
        std::process::id(),
        salt,
        extension.trim_start_matches('.'),
    )
}

/// Name of the running program, from the invocation path.
pub fn program_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
        .unwrap_or_else(|| String::from("unknown"))
}

fn home_path() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home);
    }
    if let (Ok(drive), Ok(path)) = (env::var("HOMEDRIVE"), env::var("HOMEPATH")) {
        return PathBuf::from(format!("{drive}{path}"));
    }
    if let Ok(profile) = env::var("USERPROFILE") {
        return PathBuf::from(profile);
    }
    PathBuf::new()
}
