//! InPost Buy environment endpoints
//!
//! Hardcoded URLs for the production and sandbox (stage) environments. The
//! authorize endpoint is the browser redirect target for the PKCE flow; the
//! token endpoint serves all three grant types.

/// Production InPost Buy API base
pub const BASE_URL_PRODUCTION: &str = "https://api.inpost-group.com/inpsa";

/// Sandbox InPost Buy API base
pub const BASE_URL_SANDBOX: &str = "https://stage-api.inpost-group.com/inpsa";

/// Production token endpoint
pub const TOKEN_URL_PRODUCTION: &str = "https://api.inpost-group.com/oauth2/token";

/// Sandbox token endpoint
pub const TOKEN_URL_SANDBOX: &str = "https://stage-api.inpost-group.com/oauth2/token";

/// Production authorize endpoint
pub const AUTHORIZE_URL_PRODUCTION: &str = "https://account.inpost-group.com/oauth2/authorize";

/// Sandbox authorize endpoint
pub const AUTHORIZE_URL_SANDBOX: &str = "https://stage-account.inpost-group.com/oauth2/authorize";

/// Scopes requested when the caller does not supply its own list.
pub const DEFAULT_SCOPES: &[&str] = &[
    "api:categories:read",
    "api:offers:read",
    "api:offers:write",
    "api:orders:read",
    "api:orders:write",
    "api:points:read",
    "api:shipments:write",
    "api:shipments:read",
    "api:tracking:read",
];

/// Target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    pub fn from_sandbox(sandbox: bool) -> Self {
        if sandbox {
            Environment::Sandbox
        } else {
            Environment::Production
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Production => BASE_URL_PRODUCTION,
            Environment::Sandbox => BASE_URL_SANDBOX,
        }
    }

    pub fn token_url(self) -> &'static str {
        match self {
            Environment::Production => TOKEN_URL_PRODUCTION,
            Environment::Sandbox => TOKEN_URL_SANDBOX,
        }
    }

    pub fn authorize_url(self) -> &'static str {
        match self {
            Environment::Production => AUTHORIZE_URL_PRODUCTION,
            Environment::Sandbox => AUTHORIZE_URL_SANDBOX,
        }
    }
}

/// API base URL for the environment.
pub fn base_url(sandbox: bool) -> &'static str {
    Environment::from_sandbox(sandbox).base_url()
}

/// Token endpoint for the environment.
pub fn token_url(sandbox: bool) -> &'static str {
    Environment::from_sandbox(sandbox).token_url()
}

/// Authorize endpoint: the override when given, else the environment default.
pub fn authorize_url(sandbox: bool, override_url: Option<&str>) -> String {
    match override_url {
        Some(url) => url.to_string(),
        None => Environment::from_sandbox(sandbox).authorize_url().to_string(),
    }
}

/// Default scopes joined with a single space.
pub fn default_scope_string() -> String {
    DEFAULT_SCOPES.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_per_environment() {
        assert_eq!(base_url(false), "https://api.inpost-group.com/inpsa");
        assert_eq!(base_url(true), "https://stage-api.inpost-group.com/inpsa");
    }

    #[test]
    fn token_urls_per_environment() {
        assert_eq!(token_url(false), "https://api.inpost-group.com/oauth2/token");
        assert_eq!(
            token_url(true),
            "https://stage-api.inpost-group.com/oauth2/token"
        );
    }

    #[test]
    fn authorize_urls_per_environment() {
        assert_eq!(
            authorize_url(false, None),
            "https://account.inpost-group.com/oauth2/authorize"
        );
        assert_eq!(
            authorize_url(true, None),
            "https://stage-account.inpost-group.com/oauth2/authorize"
        );
    }

    #[test]
    fn authorize_override_wins_in_both_environments() {
        let custom = "https://custom.example.com/oauth2/authorize";
        assert_eq!(authorize_url(false, Some(custom)), custom);
        assert_eq!(authorize_url(true, Some(custom)), custom);
    }

    #[test]
    fn default_scopes_are_space_joined() {
        let scopes = default_scope_string();
        assert!(scopes.starts_with("api:categories:read api:offers:read"));
        assert!(scopes.ends_with("api:tracking:read"));
        assert_eq!(scopes.split(' ').count(), DEFAULT_SCOPES.len());
        assert!(DEFAULT_SCOPES.contains(&"api:orders:write"));
    }
}
