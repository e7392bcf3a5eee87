//! Books (billing) contact directory client.
//!
//! Consulted after the CRM; billing records are keyed to invoicing and may
//! carry only a contact name and company, no split name fields.

use std::time::Duration;

use serde::Deserialize;

use crate::contact::{Directory, DirectoryContact};
use crate::error::{DirectoryError, Result};
use crate::token::TokenCache;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Books contact-search API.
#[derive(Debug, Clone)]
pub struct BooksClient {
    http: reqwest::Client,
    base_url: String,
    organization_id: String,
    tokens: TokenCache,
}

impl BooksClient {
    /// Creates a client against the given API base URL and organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        organization_id: impl Into<String>,
        tokens: TokenCache,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            organization_id: organization_id.into(),
            tokens,
        })
    }
}

impl Directory for BooksClient {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<DirectoryContact>> {
        let token = self
            .tokens
            .get()
            .ok_or_else(|| DirectoryError::Auth("no Books access token cached".into()))?;

        let url = format!("{}/contacts", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("email", email),
                ("organization_id", &self.organization_id),
            ])
            .header("Authorization", format!("Zoho-oauthtoken {token}"))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                let body: ContactListResponse = response.json().await?;
                Ok(body
                    .contacts
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .map(|record| record.normalize(email)))
            }
            401 => Err(DirectoryError::Auth(
                "Books rejected the access token".into(),
            )),
            status => Err(DirectoryError::UnexpectedStatus {
                directory: "books",
                status,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContactListResponse {
    contacts: Option<Vec<BooksContactRecord>>,
}

#[derive(Debug, Deserialize)]
struct BooksContactRecord {
    contact_id: String,
    contact_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    company_name: Option<String>,
}

impl BooksContactRecord {
    fn normalize(self, queried_email: &str) -> DirectoryContact {
        DirectoryContact {
            external_id: self.contact_id,
            name: self
                .contact_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| queried_email.to_string()),
            email: self.email.unwrap_or_else(|| queried_email.to_string()),
            phone: self.phone.filter(|p| !p.is_empty()),
            company: self.company_name.filter(|c| !c.is_empty()),
        }
    }
}
