//! Detail redaction
//!
//! Turns raw tool inputs into short, non-sensitive fragments. Only a file's
//! base name, a command's category, or a URL's host ever leave this module.

use reqwest::Url;

/// Base-name fragments that mark a file as sensitive
const SENSITIVE_NAME_PARTS: &[&str] = &[
    "env",
    "secret",
    "key",
    "credential",
    "password",
    "token",
    ".pem",
    "id_rsa",
];

const MAX_FILE_NAME_CHARS: usize = 40;
const MAX_HOST_CHARS: usize = 30;

/// Command categories, checked in order; the first match wins.
const COMMAND_CATEGORIES: &[(&[&str], &str)] = &[
    (&["test", "pytest", "jest", "vitest"], "running tests"),
    (&["build", "tsc", "make", "webpack", "vite"], "building"),
    (&["install", "add "], "installing packages"),
    (
        &["npm", "yarn", "pnpm", "npx", "bun", "pip", "cargo"],
        "package manager",
    ),
];

/// Reduce a file path to its base name, hiding sensitive files entirely.
pub fn redact_path(path: Option<&str>) -> String {
    let Some(name) = path.and_then(|p| {
        p.rsplit(|c: char| c == '/' || c == '\\')
            .find(|s| !s.is_empty())
    }) else {
        return "file".to_string();
    };

    let lower = name.to_lowercase();
    if SENSITIVE_NAME_PARTS.iter().any(|part| lower.contains(part)) {
        return "config file".to_string();
    }

    truncate_chars(name, MAX_FILE_NAME_CHARS)
}

/// Map a shell command to a coarse category label.
pub fn categorize_command(command: Option<&str>) -> &'static str {
    let command = command.unwrap_or_default().trim().to_lowercase();

    if command.starts_with("git ") || command.starts_with("gh ") {
        return "git operation";
    }

    COMMAND_CATEGORIES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| command.contains(n)))
        .map(|(_, label)| *label)
        .unwrap_or("terminal command")
}

/// Reduce a URL to its host name.
pub fn redact_url(url: Option<&str>) -> String {
    let host = url
        .and_then(|u| Url::parse(u).ok())
        .and_then(|u| u.host_str().map(str::to_string));

    match host {
        Some(host) => {
            let host = host.strip_prefix("www.").unwrap_or(&host);
            truncate_chars(host, MAX_HOST_CHARS)
        }
        None => "web page".to_string(),
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_keeps_base_name_only() {
        assert_eq!(redact_path(Some("/home/me/app/src/lib.rs")), "lib.rs");
        assert_eq!(redact_path(Some("C:\\work\\main.py")), "main.py");
    }

    #[test]
    fn test_sensitive_paths_are_hidden() {
        assert_eq!(redact_path(Some("/proj/.env.local")), "config file");
        assert_eq!(redact_path(Some("/home/me/.ssh/id_rsa")), "config file");
        assert_eq!(redact_path(Some("/srv/tls/server.PEM")), "config file");
        assert_eq!(redact_path(Some("/app/API_TOKEN.txt")), "config file");
    }

    #[test]
    fn test_missing_path() {
        assert_eq!(redact_path(None), "file");
        assert_eq!(redact_path(Some("")), "file");
    }

    #[test]
    fn test_command_categories() {
        assert_eq!(categorize_command(Some("git push origin main")), "git operation");
        assert_eq!(categorize_command(Some("gh pr create")), "git operation");
        assert_eq!(categorize_command(Some("npm test")), "running tests");
        assert_eq!(categorize_command(Some("cargo build --release")), "building");
        assert_eq!(categorize_command(Some("pnpm add lodash")), "installing packages");
        assert_eq!(categorize_command(Some("npm run dev")), "package manager");
        assert_eq!(categorize_command(Some("ls -la /etc")), "terminal command");
        assert_eq!(categorize_command(None), "terminal command");
    }

    #[test]
    fn test_command_category_priority() {
        // Tests outrank the package manager running them
        assert_eq!(categorize_command(Some("cargo test --all")), "running tests");
        // Version control prefix outranks everything
        assert_eq!(categorize_command(Some("git commit -m 'fix build'")), "git operation");
    }

    #[test]
    fn test_url_host_only() {
        assert_eq!(
            redact_url(Some("https://www.example.com/private/path?token=abc")),
            "example.com"
        );
        assert_eq!(redact_url(Some("http://docs.rs/tokio")), "docs.rs");
    }

    #[test]
    fn test_url_truncated_and_unparsable() {
        let host = redact_url(Some("https://a-very-long-subdomain.of-some-long-domain.example.org/"));
        assert_eq!(host.chars().count(), 30);
        assert_eq!(redact_url(Some("not a url")), "web page");
        assert_eq!(redact_url(None), "web page");
    }
}
