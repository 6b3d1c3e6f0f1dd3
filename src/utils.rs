/// Read an environment variable, trimmed; empty values count as missing
pub fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a boolean environment variable ("true" case-insensitive), with default
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        Some(v) => v.eq_ignore_ascii_case("true"),
        None => default,
    }
}

/// Join a base URL and a relative endpoint with exactly one slash
pub fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Mask a secret for logging (keeps the first 10 characters)
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(10).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://be/api/", "/user/profile"), "http://be/api/user/profile");
        assert_eq!(join_url("http://be/api", "user/profile"), "http://be/api/user/profile");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-or-v1-abcdefgh"), "sk-or-v1-a...");
        assert_eq!(mask_secret("abc"), "abc...");
    }
}
