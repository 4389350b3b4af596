//! Client for the JSON CRM API.
//!
//! All calls carry a bearer key resolved per object type by the credential
//! factory. Contacts are upserted through a search-then-write flow whose
//! lookup order is configurable; memberships land as property updates on
//! the matching contact; orders and events become deals associated to it.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    client::{body_snippet, ApiResponse, RequestOptions, ResilientClient},
    error::{Result, SyncError},
};

/// Connection settings for the CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Base URL of the CRM API.
    pub base_url: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self { base_url: "https://api.hubapi.com".to_string() }
    }
}

/// Lookup order for finding an existing contact before writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Search by email address only.
    #[default]
    EmailOnly,
    /// Search by source customer ID only.
    CustomerIdOnly,
    /// Search by email, fall back to customer ID.
    EmailThenCustomerId,
    /// Search by customer ID, fall back to email.
    CustomerIdThenEmail,
}

impl SearchStrategy {
    /// Canonical configuration name of the strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailOnly => "email_only",
            Self::CustomerIdOnly => "customer_id_only",
            Self::EmailThenCustomerId => "email_then_customer_id",
            Self::CustomerIdThenEmail => "customer_id_then_email",
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "email_only" => Ok(Self::EmailOnly),
            "customer_id_only" => Ok(Self::CustomerIdOnly),
            "email_then_customer_id" => Ok(Self::EmailThenCustomerId),
            "customer_id_then_email" => Ok(Self::CustomerIdThenEmail),
            other => Err(SyncError::configuration(format!("unknown search strategy '{other}'"))),
        }
    }
}

/// Contact properties in the CRM's flat property namespace.
///
/// `None` fields are omitted from the payload so existing CRM values
/// survive a partial update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactProperties {
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// First name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    /// Last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    /// Formatted phone number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Formatted street address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// City.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// State or region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    /// Employer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Job title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobtitle: Option<String>,
    /// Source customer ID, always written so later runs can find the
    /// contact without an email match.
    pub customer_id: String,
}

/// Membership fields written onto a contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipProperties {
    /// Membership status string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_status: Option<String>,
    /// Membership type, from the subgroup name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_type: Option<String>,
    /// Membership class code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_class: Option<String>,
    /// Join date as epoch milliseconds at UTC midnight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_join_date: Option<i64>,
    /// Expiration date as epoch milliseconds at UTC midnight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_expire_date: Option<i64>,
}

/// Deal properties for orders and event registrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealProperties {
    /// Deal display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealname: Option<String>,
    /// Deal amount as a decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Pipeline identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Stage within the pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealstage: Option<String>,
    /// Close date as epoch milliseconds at UTC midnight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closedate: Option<i64>,
    /// Source order serial, for order deals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Source event ID, for event deals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Source customer ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

/// Whether a push created a new object or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    /// A new object was created.
    Created,
    /// An existing object was updated.
    Updated,
}

impl std::fmt::Display for PushAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Result of a contact or membership push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// CRM object ID written to.
    pub id: String,
    /// What happened to it.
    pub action: PushAction,
}

/// Operations the CRM offers.
#[async_trait::async_trait]
pub trait DestinationApi: Send + Sync + std::fmt::Debug {
    /// Checks that the bearer key is accepted.
    ///
    /// Returns `Ok(false)` when the CRM explicitly rejects the key.
    async fn verify_credentials(&self) -> Result<bool>;

    /// Creates or updates a contact, locating any existing one by the
    /// given search strategy.
    async fn upsert_contact(
        &self,
        contact: &ContactProperties,
        strategy: SearchStrategy,
    ) -> Result<PushOutcome>;

    /// Writes membership fields onto the contact with this customer ID,
    /// creating a stub contact when none exists yet.
    async fn upsert_membership(
        &self,
        customer_id: &str,
        membership: &MembershipProperties,
    ) -> Result<PushOutcome>;

    /// Creates a deal, associating it to the contact with the given
    /// customer ID when one can be found.
    async fn create_deal(
        &self,
        deal: &DealProperties,
        associate_customer_id: Option<&str>,
    ) -> Result<String>;
}

/// HTTP implementation of [`DestinationApi`].
#[derive(Debug, Clone)]
pub struct CrmClient {
    config: DestinationConfig,
    api_key: String,
    http: ResilientClient,
}

impl CrmClient {
    /// Creates a client from connection settings, a resolved key, and a
    /// transport.
    pub fn new(config: DestinationConfig, api_key: impl Into<String>, http: ResilientClient) -> Self {
        Self { config, api_key: api_key.into(), http }
    }

    fn request(&self, method: Method, path: &str) -> RequestOptions {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        RequestOptions::new(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: RequestOptions) -> Result<ApiResponse> {
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(SyncError::destination_rejected(
                response.status_code,
                body_snippet(&response.body),
            ));
        }
        Ok(response)
    }

    /// Finds one contact whose property equals the given value.
    async fn search_contact(&self, property: &str, value: &str) -> Result<Option<String>> {
        let body = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": property,
                    "operator": "EQ",
                    "value": value,
                }]
            }],
            "limit": 1,
        });

        let request = self.request(Method::POST, "/crm/v3/objects/contacts/search").json(body);
        let response = self.send(request).await?;

        let results: serde_json::Value = response.json()?;
        Ok(results["results"]
            .as_array()
            .and_then(|contacts| contacts.first())
            .and_then(|contact| contact["id"].as_str())
            .map(str::to_owned))
    }

    async fn find_contact(
        &self,
        strategy: SearchStrategy,
        email: Option<&str>,
        customer_id: &str,
    ) -> Result<Option<String>> {
        match strategy {
            SearchStrategy::EmailOnly => match email {
                Some(email) => self.search_contact("email", email).await,
                None => Ok(None),
            },
            SearchStrategy::CustomerIdOnly => self.search_contact("customer_id", customer_id).await,
            SearchStrategy::EmailThenCustomerId => {
                if let Some(email) = email {
                    if let Some(id) = self.search_contact("email", email).await? {
                        return Ok(Some(id));
                    }
                }
                self.search_contact("customer_id", customer_id).await
            },
            SearchStrategy::CustomerIdThenEmail => {
                if let Some(id) = self.search_contact("customer_id", customer_id).await? {
                    return Ok(Some(id));
                }
                match email {
                    Some(email) => self.search_contact("email", email).await,
                    None => Ok(None),
                }
            },
        }
    }

    /// Pulls the object ID out of a create response.
    fn created_id(response: &ApiResponse) -> Result<String> {
        let value: serde_json::Value = response.json()?;
        value["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| SyncError::invalid_response("create response carried no object id"))
    }
}

/// Serializes a property struct into a JSON object map.
fn property_map<T: Serialize>(properties: &T) -> serde_json::Map<String, serde_json::Value> {
    serde_json::to_value(properties)
        .ok()
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl DestinationApi for CrmClient {
    async fn verify_credentials(&self) -> Result<bool> {
        let request = self.request(Method::GET, "/crm/v3/objects/contacts?limit=1");
        let response = self.http.execute(request).await?;

        match response.status_code {
            code if (200..300).contains(&code) => Ok(true),
            401 | 403 => Ok(false),
            code => Err(SyncError::destination_rejected(code, body_snippet(&response.body))),
        }
    }

    async fn upsert_contact(
        &self,
        contact: &ContactProperties,
        strategy: SearchStrategy,
    ) -> Result<PushOutcome> {
        let existing =
            self.find_contact(strategy, contact.email.as_deref(), &contact.customer_id).await?;
        let payload = json!({ "properties": property_map(contact) });

        match existing {
            Some(contact_id) => {
                let path = format!("/crm/v3/objects/contacts/{contact_id}");
                self.send(self.request(Method::PATCH, &path).json(payload)).await?;

                tracing::debug!(contact_id = %contact_id, strategy = %strategy, "contact updated");
                Ok(PushOutcome { id: contact_id, action: PushAction::Updated })
            },
            None => {
                let request = self.request(Method::POST, "/crm/v3/objects/contacts").json(payload);
                let response = self.send(request).await?;
                let contact_id = Self::created_id(&response)?;

                tracing::debug!(contact_id = %contact_id, strategy = %strategy, "contact created");
                Ok(PushOutcome { id: contact_id, action: PushAction::Created })
            },
        }
    }

    async fn upsert_membership(
        &self,
        customer_id: &str,
        membership: &MembershipProperties,
    ) -> Result<PushOutcome> {
        let mut properties = property_map(membership);
        properties
            .insert("customer_id".to_string(), serde_json::Value::String(customer_id.to_string()));
        let payload = json!({ "properties": properties });

        match self.search_contact("customer_id", customer_id).await? {
            Some(contact_id) => {
                let path = format!("/crm/v3/objects/contacts/{contact_id}");
                self.send(self.request(Method::PATCH, &path).json(payload)).await?;
                Ok(PushOutcome { id: contact_id, action: PushAction::Updated })
            },
            None => {
                // No contact yet for this customer; create a stub carrying
                // the membership fields so the data is not dropped.
                let request = self.request(Method::POST, "/crm/v3/objects/contacts").json(payload);
                let response = self.send(request).await?;
                let contact_id = Self::created_id(&response)?;
                Ok(PushOutcome { id: contact_id, action: PushAction::Created })
            },
        }
    }

    async fn create_deal(
        &self,
        deal: &DealProperties,
        associate_customer_id: Option<&str>,
    ) -> Result<String> {
        let mut properties = property_map(deal);
        properties.entry("dealstage").or_insert(json!("appointmentscheduled"));
        properties.entry("pipeline").or_insert(json!("default"));
        let payload = json!({ "properties": properties });
        let request = self.request(Method::POST, "/crm/v3/objects/deals").json(payload);
        let response = self.send(request).await?;
        let deal_id = Self::created_id(&response)?;

        if let Some(customer_id) = associate_customer_id {
            match self.search_contact("customer_id", customer_id).await {
                Ok(Some(contact_id)) => {
                    let path = format!(
                        "/crm/v3/objects/deals/{deal_id}/associations/contacts/{contact_id}/deal_to_contact"
                    );
                    match self.send(self.request(Method::PUT, &path)).await {
                        Ok(_) => {
                            tracing::debug!(deal_id = %deal_id, contact_id = %contact_id, "deal associated");
                        },
                        Err(e) => {
                            // The deal exists either way; a missing link is
                            // repairable on the next run.
                            tracing::warn!(deal_id = %deal_id, error = %e, "failed to associate deal");
                        },
                    }
                },
                Ok(None) => {
                    tracing::warn!(deal_id = %deal_id, customer_id, "no contact found to associate deal");
                },
                Err(e) => {
                    tracing::warn!(deal_id = %deal_id, error = %e, "contact lookup for association failed");
                },
            }
        }

        Ok(deal_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use koppel_core::TestClock;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::ClientConfig;

    fn test_crm(base_url: String) -> CrmClient {
        let http =
            ResilientClient::new(ClientConfig::default(), Arc::new(TestClock::new())).unwrap();
        CrmClient::new(DestinationConfig { base_url }, "test-key", http)
    }

    fn search_result(ids: &[&str]) -> serde_json::Value {
        json!({
            "results": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
            "total": ids.len(),
        })
    }

    #[test]
    fn search_strategies_parse_from_config_names() {
        assert_eq!(
            "email_then_customer_id".parse::<SearchStrategy>().unwrap(),
            SearchStrategy::EmailThenCustomerId
        );
        assert_eq!(SearchStrategy::CustomerIdOnly.to_string(), "customer_id_only");
        assert!("fuzzy".parse::<SearchStrategy>().is_err());
    }

    #[test]
    fn empty_optional_properties_are_omitted() {
        let contact = ContactProperties {
            email: Some("ada@example.org".to_string()),
            firstname: Some("Ada".to_string()),
            customer_id: "12345".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&contact).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["customer_id"], "12345");
        assert!(!object.contains_key("phone"));
    }

    #[tokio::test]
    async fn upsert_creates_when_search_finds_nothing() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .and(matchers::header("Authorization", "Bearer test-key"))
            .and(matchers::body_partial_json(json!({
                "filterGroups": [{"filters": [{"propertyName": "email", "operator": "EQ"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&[])))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts"))
            .and(matchers::body_partial_json(json!({
                "properties": {"email": "ada@example.org", "customer_id": "12345"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "431"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        let contact = ContactProperties {
            email: Some("ada@example.org".to_string()),
            customer_id: "12345".to_string(),
            ..Default::default()
        };

        let outcome = crm.upsert_contact(&contact, SearchStrategy::EmailOnly).await.unwrap();
        assert_eq!(outcome.id, "431");
        assert_eq!(outcome.action, PushAction::Created);
    }

    #[tokio::test]
    async fn upsert_updates_when_search_finds_a_contact() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&["431"])))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/crm/v3/objects/contacts/431"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "431"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        let contact = ContactProperties {
            email: Some("ada@example.org".to_string()),
            customer_id: "12345".to_string(),
            ..Default::default()
        };

        let outcome = crm.upsert_contact(&contact, SearchStrategy::EmailOnly).await.unwrap();
        assert_eq!(outcome.id, "431");
        assert_eq!(outcome.action, PushAction::Updated);
    }

    #[tokio::test]
    async fn fallback_strategy_tries_customer_id_after_email() {
        let mock_server = MockServer::start().await;

        // Email search misses, customer_id search hits.
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .and(matchers::body_partial_json(json!({
                "filterGroups": [{"filters": [{"propertyName": "email"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&[])))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .and(matchers::body_partial_json(json!({
                "filterGroups": [{"filters": [{"propertyName": "customer_id"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&["88"])))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/crm/v3/objects/contacts/88"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "88"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        let contact = ContactProperties {
            email: Some("ada@example.org".to_string()),
            customer_id: "12345".to_string(),
            ..Default::default()
        };

        let outcome =
            crm.upsert_contact(&contact, SearchStrategy::EmailThenCustomerId).await.unwrap();
        assert_eq!(outcome.id, "88");
        assert_eq!(outcome.action, PushAction::Updated);
    }

    #[tokio::test]
    async fn verify_credentials_distinguishes_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/crm/v3/objects/contacts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        assert!(!crm.verify_credentials().await.unwrap());
    }

    #[tokio::test]
    async fn deal_is_created_and_associated() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/deals"))
            .and(matchers::body_partial_json(json!({
                "properties": {
                    "dealname": "Proceedings",
                    "order_id": "900",
                    "dealstage": "appointmentscheduled",
                    "pipeline": "default",
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "901"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&["77"])))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("PUT"))
            .and(matchers::path(
                "/crm/v3/objects/deals/901/associations/contacts/77/deal_to_contact",
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        let deal = DealProperties {
            dealname: Some("Proceedings".to_string()),
            amount: Some("49.50".to_string()),
            order_id: Some("900".to_string()),
            customer_id: Some("12345".to_string()),
            ..Default::default()
        };

        let deal_id = crm.create_deal(&deal, Some("12345")).await.unwrap();
        assert_eq!(deal_id, "901");
    }

    #[tokio::test]
    async fn membership_update_lands_on_matched_contact() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .and(matchers::body_partial_json(json!({
                "filterGroups": [{"filters": [{"propertyName": "customer_id"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&["431"])))
            .mount(&mock_server)
            .await;

        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/crm/v3/objects/contacts/431"))
            .and(matchers::body_partial_json(json!({
                "properties": {"membership_status": "ACTIVE", "customer_id": "12345"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "431"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let crm = test_crm(mock_server.uri());
        let membership = MembershipProperties {
            membership_status: Some("ACTIVE".to_string()),
            membership_type: Some("Gold Tier".to_string()),
            ..Default::default()
        };

        let outcome = crm.upsert_membership("12345", &membership).await.unwrap();
        assert_eq!(outcome.action, PushAction::Updated);
        assert_eq!(outcome.id, "431");
    }
}
