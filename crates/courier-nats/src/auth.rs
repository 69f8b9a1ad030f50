use courier_std::env::ReadEnv;
use std::fmt;
use std::path::PathBuf;

const ENV_NATS_URL: &str = "NATS_URL";
const ENV_NATS_CREDS: &str = "NATS_CREDS";
const ENV_NATS_NKEY: &str = "NATS_NKEY";
const ENV_NATS_USER: &str = "NATS_USER";
const ENV_NATS_PASSWORD: &str = "NATS_PASSWORD";
const ENV_NATS_TOKEN: &str = "NATS_TOKEN";

const DEFAULT_NATS_URL: &str = "localhost:4222";

/// How the broker connection authenticates.
///
/// Resolved from the environment in this order: credentials file, NKey seed,
/// user + password, token, anonymous.
#[derive(Clone)]
pub enum NatsAuth {
    Credentials(PathBuf),
    NKey(String),
    UserPassword { user: String, password: String },
    Token(String),
    None,
}

impl NatsAuth {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials file",
            Self::NKey(_) => "NKey",
            Self::UserPassword { .. } => "user/password",
            Self::Token(_) => "token",
            Self::None => "none",
        }
    }
}

// Secrets never reach the logs through `?config`.
impl fmt::Debug for NatsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials(path) => f.debug_tuple("Credentials").field(path).finish(),
            Self::NKey(_) => f.write_str("NKey(<redacted>)"),
            Self::UserPassword { user, .. } => f
                .debug_struct("UserPassword")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::None => f.write_str("None"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub auth: NatsAuth,
}

impl NatsConfig {
    pub fn new(servers: Vec<String>, auth: NatsAuth) -> Self {
        Self { servers, auth }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(vec![url.into()], NatsAuth::None)
    }

    /// `NATS_URL` is a comma-separated server list (default `localhost:4222`).
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self::new(servers_from_env(env), auth_from_env(env))
    }
}

fn servers_from_env<E: ReadEnv>(env: &E) -> Vec<String> {
    let servers: Vec<String> = env
        .var_or(ENV_NATS_URL, DEFAULT_NATS_URL)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if servers.is_empty() {
        vec![DEFAULT_NATS_URL.to_string()]
    } else {
        servers
    }
}

fn non_empty<E: ReadEnv>(env: &E, key: &str) -> Option<String> {
    env.var(key).ok().filter(|v| !v.trim().is_empty())
}

fn auth_from_env<E: ReadEnv>(env: &E) -> NatsAuth {
    if let Some(path) = non_empty(env, ENV_NATS_CREDS) {
        return NatsAuth::Credentials(PathBuf::from(path));
    }
    if let Some(seed) = non_empty(env, ENV_NATS_NKEY) {
        return NatsAuth::NKey(seed);
    }
    if let (Some(user), Some(password)) = (
        non_empty(env, ENV_NATS_USER),
        non_empty(env, ENV_NATS_PASSWORD),
    ) {
        return NatsAuth::UserPassword { user, password };
    }
    if let Some(token) = non_empty(env, ENV_NATS_TOKEN) {
        return NatsAuth::Token(token);
    }
    NatsAuth::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_std::env::InMemoryEnv;

    #[test]
    fn defaults_to_localhost_without_auth() {
        let config = NatsConfig::from_env(&InMemoryEnv::new());

        assert_eq!(config.servers, vec!["localhost:4222"]);
        assert!(matches!(config.auth, NatsAuth::None));
    }

    #[test]
    fn splits_and_trims_server_list() {
        let env = InMemoryEnv::new().with("NATS_URL", " a:4222 ,, b:4222 ");

        assert_eq!(NatsConfig::from_env(&env).servers, vec!["a:4222", "b:4222"]);
    }

    #[test]
    fn blank_server_list_falls_back_to_default() {
        let env = InMemoryEnv::new().with("NATS_URL", " , ");

        assert_eq!(NatsConfig::from_env(&env).servers, vec!["localhost:4222"]);
    }

    #[test]
    fn credentials_win_over_everything() {
        let env = InMemoryEnv::new()
            .with("NATS_CREDS", "/etc/courier/nats.creds")
            .with("NATS_NKEY", "SU...")
            .with("NATS_TOKEN", "tok");

        assert!(matches!(
            NatsConfig::from_env(&env).auth,
            NatsAuth::Credentials(p) if p == std::path::Path::new("/etc/courier/nats.creds")
        ));
    }

    #[test]
    fn user_password_needs_both_halves() {
        let env = InMemoryEnv::new()
            .with("NATS_USER", "worker")
            .with("NATS_TOKEN", "tok");

        assert!(matches!(NatsConfig::from_env(&env).auth, NatsAuth::Token(t) if t == "tok"));

        env.set("NATS_PASSWORD", "hunter2");
        assert!(matches!(
            NatsConfig::from_env(&env).auth,
            NatsAuth::UserPassword { user, password } if user == "worker" && password == "hunter2"
        ));
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = InMemoryEnv::new()
            .with("NATS_CREDS", "")
            .with("NATS_NKEY", "  ");

        assert!(matches!(NatsConfig::from_env(&env).auth, NatsAuth::None));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let auth = NatsAuth::UserPassword {
            user: "worker".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{auth:?}");

        assert!(rendered.contains("worker"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", NatsAuth::Token("s3cret".into())).contains("s3cret"));
        assert!(!format!("{:?}", NatsAuth::NKey("SUAB".into())).contains("SUAB"));
    }

    #[test]
    fn description_names_the_method() {
        assert_eq!(NatsAuth::Credentials("/a".into()).description(), "credentials file");
        assert_eq!(NatsAuth::NKey("k".into()).description(), "NKey");
        assert_eq!(NatsAuth::Token("t".into()).description(), "token");
        assert_eq!(NatsAuth::None.description(), "none");
    }
}
