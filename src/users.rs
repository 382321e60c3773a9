//! Display names for user ids.
use crate::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::path::Path;

/// A row of the user directory CSV
#[derive(Debug, Clone, Deserialize)]
struct UserRow {
    user: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    affiliation: String,
    #[serde(default)]
    title: String,
}

impl UserRow {
    fn label(&self) -> String {
        let affiliation: String = self
            .affiliation
            .split('-')
            .next()
            .unwrap_or_default()
            .chars()
            .take(2)
            .collect();
        format!("{} ({} {}, {})", self.name, affiliation, self.title, self.user)
    }
}

#[derive(Clone, Debug, Default)]
pub struct UserDirectory {
    labels: HashMap<String, String>,
}

impl UserDirectory {
    /// Read a CSV with a `user,name,affiliation,title` header.  Rows without a name are skipped.
    pub fn from_reader(input: impl io::Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(input);
        let mut labels = HashMap::new();
        for row in reader.deserialize::<UserRow>() {
            let row = row.context("malformed user directory row")?;
            if !row.name.is_empty() {
                labels.insert(row.user.clone(), row.label());
            }
        }
        Ok(UserDirectory { labels })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .with_context(|| format!("failed to read user directory {:?}", path))?;
        UserDirectory::from_reader(io::BufReader::new(f))
    }

    /// Fill in names from the passwd GECOS field for users the directory does not know.
    pub fn with_passwd(mut self) -> Self {
        for p in pwd::Passwd::iter() {
            let full_name = p
                .gecos
                .as_deref()
                .and_then(|g| g.split(',').next())
                .map(str::trim)
                .unwrap_or_default();
            if !full_name.is_empty() && !self.labels.contains_key(&p.name) {
                let label = format!("{} ({})", full_name, p.name);
                self.labels.insert(p.name, label);
            }
        }
        self
    }

    /// The directory for `config`: its user file if readable, then passwd.  An unreadable file
    /// is logged and skipped.
    pub fn for_config(config: &Config) -> Self {
        let directory = match &config.user_file {
            Some(path) => UserDirectory::load(path).unwrap_or_else(|e| {
                tracing::warn!("{:#}", e);
                UserDirectory::default()
            }),
            None => UserDirectory::default(),
        }
        .with_passwd();
        tracing::debug!(users = directory.len(), "loaded user directory");
        directory
    }

    pub fn label<'a>(&'a self, user: &'a str) -> &'a str {
        self.labels.get(user).map(String::as_str).unwrap_or(user)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}
