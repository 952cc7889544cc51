use std::io::{Read, Write};
use std::path::Path;

/// `-` reads standard input.
pub fn load_script(path: &Path) -> Result<String, std::io::Error> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
}

/// Writes to `path`, or standard output when there is none.
pub fn save_script(path: Option<&Path>, text: &str) -> Result<(), std::io::Error> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::write(path, text),
        _ => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()
        }
    }
}

/// Origin label used when rendering diagnostics.
pub fn display_name(path: &Path) -> String {
    if path == Path::new("-") {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("sieveform-io-{}.sieve", std::process::id()));
        save_script(Some(&path), "keep;\n").unwrap();
        assert_eq!(load_script(&path).unwrap(), "keep;\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("-")), "<stdin>");
        assert_eq!(display_name(Path::new("a.sieve")), "a.sieve");
    }
}
