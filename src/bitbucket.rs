use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::audit::RepositoryLister;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::models::RepositoryRef;

#[derive(Debug, Deserialize)]
struct RepositoryPage {
    #[serde(default)]
    values: Vec<RepositoryItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryItem {
    slug: Option<String>,
    #[serde(default)]
    links: RepositoryLinks,
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryLinks {
    #[serde(default)]
    clone: Vec<CloneLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloneLink {
    pub href: String,
    #[serde(default)]
    pub name: String,
}

/// Lists the repositories an account owns through the Bitbucket Cloud API.
pub struct BitbucketClient {
    client: Client,
    api_url: String,
    username: String,
    password: String,
    owner: String,
}

impl BitbucketClient {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            owner: config.owner.clone(),
        }
    }

    fn fetch_page(&self, url: &str) -> Result<RepositoryPage> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|e| AuditError::Listing(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuditError::Listing(format!("GET {} returned {}", url, status)));
        }

        response
            .json::<RepositoryPage>()
            .map_err(|e| AuditError::Listing(format!("invalid response from {}: {}", url, e)))
    }
}

impl RepositoryLister for BitbucketClient {
    fn list(&self) -> Result<Vec<RepositoryRef>> {
        let mut next = Some(format!(
            "{}/repositories/{}?role=owner&pagelen=100",
            self.api_url, self.owner
        ));
        let mut items = Vec::new();

        while let Some(url) = next {
            tracing::debug!("Fetching repository page {}", url);
            let page = self.fetch_page(&url)?;
            items.extend(page.values);
            next = page.next;
        }

        let repositories = collect_repositories(items);
        tracing::info!("Found {} repositories owned by {}", repositories.len(), self.owner);
        Ok(repositories)
    }
}

fn collect_repositories(items: Vec<RepositoryItem>) -> Vec<RepositoryRef> {
    let mut repositories = BTreeMap::new();
    for item in items {
        let Some(url) = select_https_url(&item.links.clone) else {
            tracing::warn!("Skipping repository {:?} without an HTTPS clone link", item.slug);
            continue;
        };
        let name = item
            .slug
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| name_from_url(&url));
        repositories.insert(name.clone(), RepositoryRef { name, clone_url: url });
    }
    repositories.into_values().collect()
}

/// Pick the HTTPS transport among the offered clone links.
pub fn select_https_url(links: &[CloneLink]) -> Option<String> {
    links
        .iter()
        .find(|link| link.name == "https")
        .or_else(|| links.iter().find(|link| link.href.starts_with("https://")))
        .map(|link| link.href.clone())
}

/// Last path segment of a clone URL without the `.git` suffix.
pub fn name_from_url(url: &str) -> String {
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}
