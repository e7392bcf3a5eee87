//! CRM contact directory client.
//!
//! The CRM is the first external directory consulted for an unknown sender.
//! It is the authoritative source for relationship metadata (company,
//! assigned owner), so its records win over Books when both exist.

use std::time::Duration;

use serde::Deserialize;

use crate::contact::{Directory, DirectoryContact};
use crate::error::{DirectoryError, Result};
use crate::token::TokenCache;

/// Default request timeout for directory lookups.
///
/// An external outage must never stall ingestion for longer than this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the CRM contact-search API.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenCache,
}

impl CrmClient {
    /// Creates a client against the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, tokens: TokenCache) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            tokens,
        })
    }
}

impl Directory for CrmClient {
    fn name(&self) -> &'static str {
        "crm"
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<DirectoryContact>> {
        let token = self
            .tokens
            .get()
            .ok_or_else(|| DirectoryError::Auth("no CRM access token cached".into()))?;

        let url = format!("{}/Contacts/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("email", email)])
            .header("Authorization", format!("Zoho-oauthtoken {token}"))
            .send()
            .await?;

        match response.status().as_u16() {
            // The search endpoint answers 204 when nothing matches.
            204 => Ok(None),
            200 => {
                let body: SearchResponse = response.json().await?;
                let contact = body
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(|record| record.normalize(email));
                Ok(contact)
            }
            401 => Err(DirectoryError::Auth("CRM rejected the access token".into())),
            status => Err(DirectoryError::UnexpectedStatus {
                directory: "crm",
                status,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<Vec<CrmContactRecord>>,
}

/// Raw CRM contact record.
///
/// Field presence is inconsistent upstream; everything except the id is
/// optional and normalized immediately.
#[derive(Debug, Deserialize)]
struct CrmContactRecord {
    id: String,
    #[serde(rename = "Full_Name")]
    full_name: Option<String>,
    #[serde(rename = "First_Name")]
    first_name: Option<String>,
    #[serde(rename = "Last_Name")]
    last_name: Option<String>,
    #[serde(rename = "Email")]
    email: Option<String>,
    #[serde(rename = "Phone")]
    phone: Option<String>,
    #[serde(rename = "Mobile")]
    mobile: Option<String>,
    #[serde(rename = "Account_Name")]
    account_name: Option<AccountRef>,
}

/// The associated account is sometimes a `{name, id}` object and sometimes a
/// bare string, depending on which API version produced the record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountRef {
    Object { name: Option<String> },
    Name(String),
}

impl AccountRef {
    fn into_name(self) -> Option<String> {
        match self {
            Self::Object { name } => name,
            Self::Name(name) => Some(name),
        }
    }
}

impl CrmContactRecord {
    /// Collapses the loose CRM shape into a [`DirectoryContact`].
    fn normalize(self, queried_email: &str) -> DirectoryContact {
        let name = self
            .full_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| match (self.first_name, self.last_name) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                (Some(single), None) | (None, Some(single)) => Some(single),
                (None, None) => None,
            })
            .unwrap_or_else(|| queried_email.to_string());

        DirectoryContact {
            external_id: self.id,
            name,
            email: self.email.unwrap_or_else(|| queried_email.to_string()),
            phone: self.phone.filter(|p| !p.is_empty()).or(self.mobile),
            company: self.account_name.and_then(AccountRef::into_name),
        }
    }
}
