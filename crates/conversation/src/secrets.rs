//! Secrets registry: named values (static or dynamically resolved) that
//! get scanned for and injected into tool commands, masked on output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cipher::Cipher;

const MASK_TOKEN: &str = "<secret-hidden>";

/// A named secret's source of truth. `get_value` is async because a
/// [`LookupSecret`] resolves over HTTP.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_value(&self) -> crate::error::Result<String>;

    /// Plaintext value for serialization when `expose_secrets` is set;
    /// `None` means this source can't be synchronously exposed (e.g. a
    /// lookup secret, which would need a network round trip).
    fn static_value(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StaticSecret {
    pub value: String,
}

#[async_trait]
impl SecretSource for StaticSecret {
    async fn get_value(&self) -> crate::error::Result<String> {
        Ok(self.value.clone())
    }

    fn static_value(&self) -> Option<&str> {
        Some(&self.value)
    }
}

#[derive(Debug, Clone)]
pub struct LookupSecret {
    pub url: String,
    pub headers: HashMap<String, String>,
}

#[async_trait]
impl SecretSource for LookupSecret {
    async fn get_value(&self) -> crate::error::Result<String> {
        // Concrete LLM/network transport is out of scope for the core;
        // embedding programs register a `LookupSecret` equivalent that
        // wraps their own HTTP client. This default implementation
        // exists so the type is constructible and testable without
        // pulling a network stack into the core crate.
        Err(crate::error::ConversationError::Other(format!(
            "LookupSecret has no transport configured (url={})",
            self.url
        )))
    }
}

/// Serialization mode for dumping a [`SecretsRegistry`]: masked for
/// display, plaintext for a trusted caller, and `Cipher` for a caller
/// that wants the value recoverable later (e.g. stashed in a context a
/// different process will read back) without ever handling it in the
/// clear in between.
#[derive(Debug, Clone)]
pub enum SecretSerializationMode {
    Masked,
    Plaintext,
    Cipher(Arc<Cipher>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedSecret {
    pub name: String,
    pub value: String,
    pub masked: bool,
}

/// Maps secret name -> source, scans command text for references, and
/// resolves only the ones that are actually referenced.
#[derive(Default)]
pub struct SecretsRegistry {
    secrets: HashMap<String, Box<dyn SecretSource>>,
}

impl SecretsRegistry {
    pub fn update(&mut self, name: impl Into<String>, source: Box<dyn SecretSource>) {
        self.secrets.insert(name.into(), source);
    }

    pub fn update_static(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.update(name, Box::new(StaticSecret { value: value.into() }));
    }

    /// Case-insensitive substring match of every registered name
    /// against `text`.
    pub fn find_referenced(&self, text: &str) -> std::collections::HashSet<String> {
        let lower = text.to_lowercase();
        self.secrets
            .keys()
            .filter(|name| lower.contains(&name.to_lowercase()))
            .cloned()
            .collect()
    }

    /// Resolve every secret referenced in `command` to its plaintext
    /// value. A provider failure is logged and that secret is skipped;
    /// the rest are still returned.
    pub async fn env_for(&self, command: &str) -> HashMap<String, String> {
        let referenced = self.find_referenced(command);
        let mut env = HashMap::new();
        for name in referenced {
            let source = &self.secrets[&name];
            match source.get_value().await {
                Ok(value) => {
                    env.insert(name, value);
                }
                Err(e) => {
                    tracing::error!(secret = %name, error = %e, "failed to resolve secret");
                }
            }
        }
        env
    }

    /// Replace every occurrence of any currently-resolvable static
    /// secret value in `output` with a fixed mask token.
    pub fn mask(&self, output: &str) -> String {
        let mut masked = output.to_string();
        for source in self.secrets.values() {
            if let Some(value) = source.static_value() {
                if !value.is_empty() {
                    masked = masked.replace(value, MASK_TOKEN);
                }
            }
        }
        masked
    }

    pub fn names(&self) -> Vec<String> {
        self.secrets.keys().cloned().collect()
    }

    /// Default dump: masks every value that can be statically read.
    /// Dynamic (lookup) secrets serialize as an opaque descriptor since
    /// there is no synchronous value to mask. Under `Cipher`, a
    /// statically readable value is encrypted rather than masked — the
    /// caller holding the same cipher can recover it with
    /// [`Cipher::decrypt`].
    pub fn serialize(&self, mode: &SecretSerializationMode) -> Vec<SerializedSecret> {
        self.secrets
            .iter()
            .map(|(name, source)| match (mode, source.static_value()) {
                (SecretSerializationMode::Plaintext, Some(v)) => {
                    SerializedSecret { name: name.clone(), value: v.to_string(), masked: false }
                }
                (SecretSerializationMode::Cipher(cipher), Some(v)) => {
                    SerializedSecret { name: name.clone(), value: cipher.encrypt(v), masked: false }
                }
                (_, Some(_)) => SerializedSecret { name: name.clone(), value: MASK_TOKEN.to_string(), masked: true },
                (_, None) => SerializedSecret { name: name.clone(), value: "<dynamic>".to_string(), masked: true },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_referenced_is_case_insensitive() {
        let mut reg = SecretsRegistry::default();
        reg.update_static("API_KEY", "s3cret");
        let found = reg.find_referenced("curl -H x=$api_key");
        assert!(found.contains("API_KEY"));
    }

    #[tokio::test]
    async fn env_for_returns_only_referenced() {
        let mut reg = SecretsRegistry::default();
        reg.update_static("API_KEY", "s3cret");
        reg.update_static("OTHER", "unused-value");
        let env = reg.env_for("curl -H x=$API_KEY").await;
        assert_eq!(env.get("API_KEY").map(String::as_str), Some("s3cret"));
        assert!(!env.contains_key("OTHER"));
    }

    #[test]
    fn mask_replaces_all_occurrences() {
        let mut reg = SecretsRegistry::default();
        reg.update_static("API_KEY", "s3cret");
        let masked = reg.mask("token=s3cret and again s3cret");
        assert!(!masked.contains("s3cret"));
        assert_eq!(masked.matches("<secret-hidden>").count(), 2);
    }

    #[test]
    fn serialize_masks_by_default() {
        let mut reg = SecretsRegistry::default();
        reg.update_static("API_KEY", "s3cret");
        let dump = reg.serialize(&SecretSerializationMode::Masked);
        assert_eq!(dump[0].value, "<secret-hidden>");
        let plain = reg.serialize(&SecretSerializationMode::Plaintext);
        assert_eq!(plain[0].value, "s3cret");
    }

    #[test]
    fn serialize_with_cipher_round_trips_to_the_original_value() {
        let mut reg = SecretsRegistry::default();
        reg.update_static("API_KEY", "s3cret");
        let cipher = Arc::new(Cipher::new("some secret key"));

        let dump = reg.serialize(&SecretSerializationMode::Cipher(cipher.clone()));
        assert_ne!(dump[0].value, "s3cret");
        assert!(!dump[0].masked);
        assert_eq!(cipher.decrypt(&dump[0].value).unwrap(), "s3cret");
    }
}
