use std::fmt;

/// SASL credentials handed to the Kafka client.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub mechanism: String,
    pub username: String,
    password: String,
}

impl SaslCredentials {
    pub fn new(
        mechanism: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: mechanism.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of broker credentials, passed explicitly to the client builder so
/// nothing below `main` reads process environment.
pub trait CredentialProvider: Send + Sync {
    fn sasl_credentials(&self) -> Option<SaslCredentials>;
}

/// Plaintext or TLS-only brokers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn sasl_credentials(&self) -> Option<SaslCredentials> {
        None
    }
}

/// Credentials resolved once up front.
#[derive(Debug, Clone)]
pub struct StaticCredentials(SaslCredentials);

impl StaticCredentials {
    pub fn new(credentials: SaslCredentials) -> Self {
        Self(credentials)
    }
}

impl CredentialProvider for StaticCredentials {
    fn sasl_credentials(&self) -> Option<SaslCredentials> {
        Some(self.0.clone())
    }
}
