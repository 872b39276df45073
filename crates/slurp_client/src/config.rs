use crate::SlurpError;
use crate::cascade::DEFAULT_DELETE_BATCH_SIZE;
use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_DATABASE: &str = "(default)";

#[derive(Clone, Debug)]
pub struct Config {
    pub project_id: String,
    pub database: String,
    pub token: SecretString,
    pub base_url: String,
    pub delete_batch_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, SlurpError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, SlurpError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let project_id = get("SLURP_FIRESTORE_PROJECT_ID")
            .ok_or_else(|| SlurpError::Config("SLURP_FIRESTORE_PROJECT_ID missing".into()))?;
        let token = get("SLURP_FIRESTORE_TOKEN")
            .ok_or_else(|| SlurpError::Config("SLURP_FIRESTORE_TOKEN missing".into()))?;
        let base_url = get("SLURP_FIRESTORE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let database = get("SLURP_FIRESTORE_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.into());
        let delete_batch_size = match get("SLURP_DELETE_BATCH_SIZE") {
            None => DEFAULT_DELETE_BATCH_SIZE,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(SlurpError::Config(format!(
                        "SLURP_DELETE_BATCH_SIZE must be a positive integer, got {raw:?}"
                    )));
                }
            },
        };
        Ok(Self {
            project_id,
            database,
            token: SecretString::new(token.into()),
            base_url,
            delete_batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_missing_token() {
        let get = |k: &str| match k {
            "SLURP_FIRESTORE_PROJECT_ID" => Some("slurp-dev".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(matches!(res, Err(SlurpError::Config(_))));
    }

    #[test]
    fn from_env_applies_defaults() {
        let get = |k: &str| match k {
            "SLURP_FIRESTORE_PROJECT_ID" => Some("slurp-dev".into()),
            "SLURP_FIRESTORE_TOKEN" => Some("sekrit".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.project_id, "slurp-dev");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.database, "(default)");
        assert_eq!(cfg.delete_batch_size, 5);
    }

    #[test]
    fn from_env_reads_values() {
        let get = |k: &str| match k {
            "SLURP_FIRESTORE_PROJECT_ID" => Some("slurp-dev".into()),
            "SLURP_FIRESTORE_TOKEN" => Some("sekrit".into()),
            "SLURP_FIRESTORE_BASE_URL" => Some("http://localhost:8080".into()),
            "SLURP_FIRESTORE_DATABASE" => Some("staging".into()),
            "SLURP_DELETE_BATCH_SIZE" => Some("20".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.base_url, "http://localhost:8080");
        assert_eq!(cfg.database, "staging");
        assert_eq!(cfg.delete_batch_size, 20);
    }

    #[test]
    fn from_env_rejects_zero_batch_size() {
        let get = |k: &str| match k {
            "SLURP_FIRESTORE_PROJECT_ID" => Some("slurp-dev".into()),
            "SLURP_FIRESTORE_TOKEN" => Some("sekrit".into()),
            "SLURP_DELETE_BATCH_SIZE" => Some("0".into()),
            _ => None,
        };
        assert!(Config::from_env_with(get).is_err());
    }
}
