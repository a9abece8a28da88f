use std::{fmt, path::Path};

use anyhow::Context;
use serde::Deserialize;

/// Connection details for a Cromwell server, read from a JSON key file
/// holding `url`, `username` and `password`.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[tracing::instrument(level = "debug")]
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| {
                format!("Could not read key file: {}", path.display())
            })?;
        Self::parse(&contents).with_context(|| {
            format!("Invalid key file: {}", path.display())
        })
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[test]
fn parse_credentials_test() -> anyhow::Result<()> {
    let creds = Credentials::parse(
        r#"{
            "url": "https://cromwell.example.org/",
            "username": "operator",
            "password": "hunter2",
            "comment": "ignored"
        }"#,
    )?;
    assert_eq!(creds.url, "https://cromwell.example.org/");
    assert_eq!(creds.username, "operator");
    assert_eq!(creds.password, "hunter2");
    assert!(!format!("{creds:?}").contains("hunter2"));

    assert!(Credentials::parse(r#"{"url": "https://x"}"#).is_err());
    Ok(())
}

#[tokio::test]
async fn load_missing_file_names_the_path() {
    let path = std::env::temp_dir()
        .join(format!("cromlog-missing-{}.json", uuid::Uuid::new_v4()));
    let err = Credentials::load(&path).await.unwrap_err();
    assert!(err.to_string().contains(&*path.to_string_lossy()));
}
