use mediaflow_core::FileKind;
use std::path::PathBuf;

/// Parse a `kind=path` upload argument, e.g. `main_video=clip.mp4`.
pub fn parse_file_arg(arg: &str) -> Result<(FileKind, PathBuf), String> {
    let (kind, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=PATH, got '{}'", arg))?;
    let kind: FileKind = kind.trim().parse()?;
    let path = path.trim();
    if path.is_empty() {
        return Err(format!("missing path for {}", kind));
    }
    Ok((kind, PathBuf::from(path)))
}

/// Initialize tracing for the CLI. `MEDIAFLOW_LOG_FORMAT=json` switches to
/// JSON lines; the filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("MEDIAFLOW_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_arg_ok() {
        let (kind, path) = parse_file_arg("main_video=clips/intro.mp4").unwrap();
        assert_eq!(kind, FileKind::MainVideo);
        assert_eq!(path, PathBuf::from("clips/intro.mp4"));

        let (kind, _) = parse_file_arg("image_3 = a.png").unwrap();
        assert_eq!(kind, FileKind::Image(3));
    }

    #[test]
    fn parse_file_arg_rejects_bad_input() {
        assert!(parse_file_arg("clip.mp4").is_err());
        assert!(parse_file_arg("banner=clip.mp4").is_err());
        assert!(parse_file_arg("avatar=").is_err());
    }
}
