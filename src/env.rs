use std::collections::BTreeMap;
use std::path::Path;

/// Variables from an optional dotenv file, falling back to the process
/// environment.
#[derive(Clone, Default)]
pub struct Env {
    pub dotenv: BTreeMap<String, String>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.dotenv.keys().map(|key| key.as_str()).collect();
        f.debug_struct("Env").field("dotenv_keys", &keys).finish()
    }
}

impl Env {
    pub fn parse_dotenv(contents: &str) -> Self {
        Self {
            dotenv: parse_dotenv(contents),
        }
    }

    pub fn load_dotenv(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse_dotenv(&contents))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.dotenv.get(key) {
            return Some(value.clone());
        }
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    /// Reads a `;`-separated list, trimming entries and dropping blanks.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| split_list(&raw))
            .unwrap_or_default()
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::<String, String>::new();

    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        if key.is_empty() {
            continue;
        }

        let raw_value = raw_value.trim();
        let value = raw_value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| {
                raw_value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
            })
            .unwrap_or(raw_value);

        if value.trim().is_empty() {
            continue;
        }

        out.insert(key.to_string(), value.to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quotes_exports_and_comments() {
        let env = Env::parse_dotenv(
            "# upstream keys\nexport GEMINI_API_KEY=\"k1; k2\"\nCLIENT_KEY_VALIDATION_SECRET='s3cret'\nEMPTY=\nnot a pair\n",
        );
        assert_eq!(env.get("GEMINI_API_KEY").as_deref(), Some("k1; k2"));
        assert_eq!(
            env.get("CLIENT_KEY_VALIDATION_SECRET").as_deref(),
            Some("s3cret")
        );
        assert!(!env.dotenv.contains_key("EMPTY"));
    }

    #[test]
    fn list_values_are_trimmed_and_blanks_dropped() {
        let env = Env::parse_dotenv("GEMINI_RELAY_TEST_LIST= a ;; b ;  ;c\n");
        assert_eq!(env.get_list("GEMINI_RELAY_TEST_LIST"), vec!["a", "b", "c"]);
        assert!(env.get_list("GEMINI_RELAY_TEST_UNSET_LIST").is_empty());
    }

    #[test]
    fn debug_lists_keys_only() {
        let env = Env::parse_dotenv("GEMINI_API_KEY=AIzaSECRET\n");
        let rendered = format!("{env:?}");
        assert!(rendered.contains("GEMINI_API_KEY"));
        assert!(!rendered.contains("AIzaSECRET"));
    }
}
