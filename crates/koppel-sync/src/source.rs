//! Client for the XML membership platform.
//!
//! Every operation is a form POST of an XML document to a service path under
//! `{base_url}/{environment}/`, authenticated by vendor credentials embedded
//! in the XML itself. Responses come back as XML and are parsed into the
//! record types the mapper consumes. A 200 whose body fails XML parsing is
//! reported as [`SyncError::InvalidResponse`], not a transport error.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{
    client::{body_snippet, ApiResponse, RequestOptions, ResilientClient},
    error::{Result, SyncError},
};

/// Queue fetch service, returns customer IDs with pending changes.
pub const QUEUE_SERVICE: &str = "CENCUSTINTEGRATESYNCWEBSVCLIB.GET_QUEUE_CUSTS_W_REASONS_XML";
/// Queue purge service, removes processed customer IDs.
pub const PURGE_SERVICE: &str = "CENCUSTINTEGRATESYNCWEBSVCLIB.PURGE_QUEUE_XML";
/// Customer detail service.
pub const CUSTOMER_SERVICE: &str = "CENSSAWEBSVCLIB.GET_CUST_INFO_XML";
/// Membership list service.
pub const MEMBERSHIP_SERVICE: &str = "MEMSSAWEBSVCLIB.GET_MEMBERS_XML";
/// Purchased products service.
pub const ORDERS_SERVICE: &str = "ECSSAWEBSVCLIB.GET_PURCHASED_PRODUCTS_XML";
/// Event registration service.
pub const EVENTS_SERVICE: &str = "EVTSSAWEBSVCLIB.GET_EVENT_INFO_XML";

/// Deployment flavor of the membership platform.
///
/// Selects the path segment between the base URL and the service name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Staging environment.
    #[default]
    Test,
    /// Production environment.
    Production,
}

impl Environment {
    /// URL path segment for this environment.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Test => "cetdigitdev",
            Self::Production => "cetdigit",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" | "staging" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(SyncError::configuration(format!("unknown environment '{other}'"))),
        }
    }
}

/// Connection settings for the membership platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the platform, without the environment segment.
    pub base_url: String,
    /// Deployment flavor to address.
    pub environment: Environment,
    /// Vendor integrator username.
    pub username: String,
    /// Vendor integrator password.
    pub password: String,
}

/// One entry from the pending-changes queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Customer the change applies to.
    pub customer_id: String,
    /// Change action reported by the platform.
    pub action: Option<String>,
    /// Reason code for the change.
    pub reason: Option<String>,
}

/// One email address on a customer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRecord {
    /// The address itself.
    pub address: String,
    /// Platform email type code.
    pub email_type: Option<String>,
    /// Flagged as the customer's preferred email.
    pub preferred: bool,
    /// Flagged as a known-bad address.
    pub bad: bool,
}

/// One phone number on a customer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhoneRecord {
    /// The number as the platform stores it.
    pub number: String,
    /// Extension, when present.
    pub extension: Option<String>,
    /// Platform phone type code.
    pub phone_type: Option<String>,
    /// Flagged as the customer's preferred phone.
    pub preferred: bool,
}

/// One postal address on a customer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressRecord {
    /// First street line.
    pub street1: Option<String>,
    /// Second street line.
    pub street2: Option<String>,
    /// City name.
    pub city: Option<String>,
    /// State or region code.
    pub state: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Country name or code.
    pub country: Option<String>,
    /// Platform address type code.
    pub address_type: Option<String>,
    /// Flagged as the customer's preferred address.
    pub preferred: bool,
    /// Flagged as a known-bad address.
    pub bad: bool,
}

/// One employment entry on a customer record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRecord {
    /// Employer name.
    pub employer: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Flagged as the customer's primary job.
    pub preferred: bool,
}

/// A customer as returned by the customer detail service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Platform customer ID.
    pub customer_id: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Display name, when the platform provides one.
    pub display_name: Option<String>,
    /// All email addresses, in platform order.
    pub emails: Vec<EmailRecord>,
    /// All phone numbers, in platform order.
    pub phones: Vec<PhoneRecord>,
    /// All postal addresses, in platform order.
    pub addresses: Vec<AddressRecord>,
    /// All employment entries, in platform order.
    pub jobs: Vec<JobRecord>,
}

/// A membership as returned by the membership list service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Customer the membership belongs to.
    pub customer_id: String,
    /// Subgroup identifier.
    pub subgroup_id: Option<String>,
    /// Subgroup display name.
    pub subgroup_name: Option<String>,
    /// Membership class code.
    pub class_code: Option<String>,
    /// Membership subclass code.
    pub subclass_code: Option<String>,
    /// Status string, `ACTIVE` when current.
    pub status: Option<String>,
    /// Join date as the platform formats it.
    pub join_date: Option<String>,
    /// Expiration date as the platform formats it.
    pub expire_date: Option<String>,
    /// Termination date, when terminated.
    pub terminate_date: Option<String>,
}

/// A purchased product as returned by the orders service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Customer the order belongs to.
    pub customer_id: String,
    /// Order serial number.
    pub order_serno: Option<String>,
    /// Product identifier.
    pub product_id: Option<String>,
    /// Product display name.
    pub product_name: Option<String>,
    /// Product type code.
    pub product_type: Option<String>,
    /// Order date as the platform formats it.
    pub order_date: Option<String>,
    /// Order status string.
    pub order_status: Option<String>,
    /// Quantity ordered.
    pub quantity: Option<String>,
    /// Default unit cost.
    pub unit_cost: Option<String>,
    /// Outstanding invoice balance.
    pub invoice_balance: Option<String>,
}

/// An event registration as returned by the events service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRecord {
    /// Customer the registration belongs to.
    pub customer_id: String,
    /// Event identifier.
    pub event_id: Option<String>,
    /// Program the event belongs to.
    pub program_name: Option<String>,
    /// Event display name.
    pub name: Option<String>,
    /// Event type code.
    pub event_type: Option<String>,
    /// Event status string.
    pub status: Option<String>,
    /// Start date as the platform formats it.
    pub start_date: Option<String>,
    /// End date as the platform formats it.
    pub end_date: Option<String>,
    /// Venue name.
    pub location_name: Option<String>,
    /// Venue city.
    pub location_city: Option<String>,
    /// Venue state.
    pub location_state: Option<String>,
    /// Registration URL.
    pub register_url: Option<String>,
    /// Registration status string.
    pub registration_status: Option<String>,
}

/// Operations the membership platform offers.
///
/// Sync tasks hold this as a trait object so tests can substitute stub
/// implementations without a server.
#[async_trait::async_trait]
pub trait SourceApi: Send + Sync + std::fmt::Debug {
    /// Fetches customer IDs with pending changes from the queue.
    async fn fetch_queued_customers(&self) -> Result<Vec<QueueEntry>>;

    /// Fetches full detail for one customer.
    async fn fetch_customer(&self, customer_id: &str) -> Result<CustomerRecord>;

    /// Fetches all memberships for one customer.
    async fn fetch_memberships(&self, customer_id: &str) -> Result<Vec<MembershipRecord>>;

    /// Fetches all purchased products for one customer.
    async fn fetch_orders(&self, customer_id: &str) -> Result<Vec<OrderRecord>>;

    /// Fetches all event registrations for one customer.
    async fn fetch_events(&self, customer_id: &str) -> Result<Vec<EventRecord>>;

    /// Removes processed customer IDs from the queue.
    async fn purge_queue(&self, customer_ids: &[String]) -> Result<()>;
}

/// HTTP implementation of [`SourceApi`].
#[derive(Debug, Clone)]
pub struct SourceClient {
    config: SourceConfig,
    http: ResilientClient,
}

impl SourceClient {
    /// Creates a client from connection settings and a transport.
    pub fn new(config: SourceConfig, http: ResilientClient) -> Self {
        Self { config, http }
    }

    fn service_url(&self, service: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.environment.path_segment(),
            service
        )
    }

    /// Posts an XML document to a service and checks for a 2xx response.
    async fn post_service(&self, service: &str, xml: String) -> Result<ApiResponse> {
        let request = RequestOptions::new(Method::POST, self.service_url(service))
            .form(vec![("p_input_xml_doc".to_string(), xml)]);

        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(SyncError::source_rejected(
                response.status_code,
                body_snippet(&response.body),
            ));
        }
        Ok(response)
    }

    fn queue_request_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<custRequest>
    <vendorId>{vendor}</vendorId>
    <vendorPassword>{password}</vendorPassword>
</custRequest>"#,
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
        )
    }

    fn customer_request_xml(&self, customer_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<custInfoRequest>
    <custId>{id}</custId>
    <integratorUsername>{vendor}</integratorUsername>
    <integratorPassword>{password}</integratorPassword>
    <directoryId></directoryId>
    <bulkRequest>false</bulkRequest>
    <details includeCodeValues="true">
        <addresses include="true" includeBad="true" />
        <phones include="true" />
        <emails include="true" includeBad="true" />
        <jobs include="true" includeInactive="true" />
    </details>
</custInfoRequest>"#,
            id = xml_escape(customer_id),
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
        )
    }

    fn membership_request_xml(&self, customer_id: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<member-request>
    <vendor-id>{vendor}</vendor-id>
    <vendor-password>{password}</vendor-password>
    <cust-id>{id}</cust-id>
</member-request>"#,
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
            id = xml_escape(customer_id),
        )
    }

    fn orders_request_xml(&self, customer_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>
<ecord-request>
    <vendorId>{vendor}</vendorId>
    <vendorPassword>{password}</vendorPassword>
    <custId>{id}</custId>
    <orderSerno></orderSerno>
    <productType></productType>
</ecord-request>"#,
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
            id = xml_escape(customer_id),
        )
    }

    fn events_request_xml(&self, customer_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" ?>
<event-request>
    <vendor-id>{vendor}</vendor-id>
    <vendor-password>{password}</vendor-password>
    <cust-id>{id}</cust-id>
</event-request>"#,
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
            id = xml_escape(customer_id),
        )
    }

    fn purge_request_xml(&self, customer_ids: &[String]) -> String {
        let customers = customer_ids
            .iter()
            .map(|id| format!("        <customer>{}</customer>", xml_escape(id)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<purgeRequest>
    <vendorId>{vendor}</vendorId>
    <vendorPassword>{password}</vendorPassword>
    <customers>
{customers}
    </customers>
</purgeRequest>"#,
            vendor = xml_escape(&self.config.username),
            password = xml_escape(&self.config.password),
        )
    }
}

#[async_trait::async_trait]
impl SourceApi for SourceClient {
    async fn fetch_queued_customers(&self) -> Result<Vec<QueueEntry>> {
        let response = self.post_service(QUEUE_SERVICE, self.queue_request_xml()).await?;
        let doc = parse_xml(&response.body)?;
        Ok(parse_queue_entries(doc.root()))
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<CustomerRecord> {
        let response =
            self.post_service(CUSTOMER_SERVICE, self.customer_request_xml(customer_id)).await?;
        let doc = parse_xml(&response.body)?;
        Ok(parse_customer(doc.root(), customer_id))
    }

    async fn fetch_memberships(&self, customer_id: &str) -> Result<Vec<MembershipRecord>> {
        let response =
            self.post_service(MEMBERSHIP_SERVICE, self.membership_request_xml(customer_id)).await?;
        let doc = parse_xml(&response.body)?;
        Ok(doc
            .root()
            .descendants()
            .filter(|n| n.has_tag_name("membership"))
            .map(|n| parse_membership(n, customer_id))
            .collect())
    }

    async fn fetch_orders(&self, customer_id: &str) -> Result<Vec<OrderRecord>> {
        let response =
            self.post_service(ORDERS_SERVICE, self.orders_request_xml(customer_id)).await?;
        let doc = parse_xml(&response.body)?;
        Ok(doc
            .root()
            .descendants()
            .filter(|n| n.has_tag_name("order"))
            .map(|n| parse_order(n, customer_id))
            .collect())
    }

    async fn fetch_events(&self, customer_id: &str) -> Result<Vec<EventRecord>> {
        let response =
            self.post_service(EVENTS_SERVICE, self.events_request_xml(customer_id)).await?;
        let doc = parse_xml(&response.body)?;
        Ok(doc
            .root()
            .descendants()
            .filter(|n| n.has_tag_name("event"))
            .map(|n| parse_event(n, customer_id))
            .collect())
    }

    async fn purge_queue(&self, customer_ids: &[String]) -> Result<()> {
        if customer_ids.is_empty() {
            return Ok(());
        }

        self.post_service(PURGE_SERVICE, self.purge_request_xml(customer_ids)).await?;
        tracing::info!(count = customer_ids.len(), "purged processed customers from queue");
        Ok(())
    }
}

/// Escapes the five XML metacharacters in a text value.
fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn parse_xml(body: &str) -> Result<roxmltree::Document<'_>> {
    roxmltree::Document::parse(body)
        .map_err(|e| SyncError::invalid_response(format!("failed to parse XML response: {e}")))
}

/// Text of the first direct child with the given tag, trimmed, empty dropped.
fn child_text(node: roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(name))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

fn child_bool(node: roxmltree::Node<'_, '_>, name: &str) -> bool {
    child_text(node, name).is_some_and(|value| value == "true")
}

/// Items of the first container element with the given tag, parsed one by one.
fn collect_children<'a, 'input, T>(
    root: roxmltree::Node<'a, 'input>,
    container: &str,
    item: &str,
    parse: impl Fn(roxmltree::Node<'a, 'input>) -> T,
) -> Vec<T> {
    root.descendants()
        .find(|n| n.has_tag_name(container))
        .map(|c| c.children().filter(|n| n.has_tag_name(item)).map(|n| parse(n)).collect())
        .unwrap_or_default()
}

fn parse_queue_entries(root: roxmltree::Node<'_, '_>) -> Vec<QueueEntry> {
    root.descendants()
        .filter(|n| n.has_tag_name("customer"))
        .filter_map(|n| {
            Some(QueueEntry {
                customer_id: child_text(n, "custId")?,
                action: child_text(n, "action"),
                reason: child_text(n, "reason"),
            })
        })
        .collect()
}

fn parse_customer(root: roxmltree::Node<'_, '_>, customer_id: &str) -> CustomerRecord {
    let name = root.descendants().find(|n| n.has_tag_name("name"));

    CustomerRecord {
        customer_id: customer_id.to_string(),
        first_name: name.and_then(|n| child_text(n, "firstName")),
        last_name: name.and_then(|n| child_text(n, "lastName")),
        display_name: name.and_then(|n| child_text(n, "displayName")),
        emails: collect_children(root, "emails", "email", parse_email),
        phones: collect_children(root, "phones", "phone", parse_phone),
        addresses: collect_children(root, "addresses", "address", parse_address),
        jobs: collect_children(root, "jobs", "job", parse_job),
    }
}

fn parse_email(node: roxmltree::Node<'_, '_>) -> EmailRecord {
    EmailRecord {
        address: child_text(node, "address").unwrap_or_default(),
        email_type: child_text(node, "emailType"),
        preferred: child_bool(node, "preferred"),
        bad: child_bool(node, "badAddress"),
    }
}

fn parse_phone(node: roxmltree::Node<'_, '_>) -> PhoneRecord {
    PhoneRecord {
        number: child_text(node, "number").unwrap_or_default(),
        extension: child_text(node, "ext"),
        phone_type: child_text(node, "phoneType"),
        preferred: child_bool(node, "preferred"),
    }
}

fn parse_address(node: roxmltree::Node<'_, '_>) -> AddressRecord {
    AddressRecord {
        street1: child_text(node, "street1"),
        street2: child_text(node, "street2"),
        city: child_text(node, "city"),
        state: child_text(node, "state"),
        postal_code: child_text(node, "postalCode"),
        country: child_text(node, "countryDescr").or_else(|| child_text(node, "countryCode")),
        address_type: child_text(node, "addressType"),
        preferred: child_bool(node, "preferred"),
        bad: child_bool(node, "badAddress"),
    }
}

fn parse_job(node: roxmltree::Node<'_, '_>) -> JobRecord {
    JobRecord {
        employer: child_text(node, "employerName"),
        title: child_text(node, "titleName"),
        preferred: child_bool(node, "preferred"),
    }
}

fn parse_membership(node: roxmltree::Node<'_, '_>, fallback_id: &str) -> MembershipRecord {
    MembershipRecord {
        customer_id: child_text(node, "customer-id").unwrap_or_else(|| fallback_id.to_string()),
        subgroup_id: child_text(node, "subgroup-id"),
        subgroup_name: child_text(node, "subgroup-name"),
        class_code: child_text(node, "class-cd"),
        subclass_code: child_text(node, "subclass-cd"),
        status: child_text(node, "status"),
        join_date: child_text(node, "join-date"),
        expire_date: child_text(node, "expire-date"),
        terminate_date: child_text(node, "terminate-date"),
    }
}

fn parse_order(node: roxmltree::Node<'_, '_>, customer_id: &str) -> OrderRecord {
    OrderRecord {
        customer_id: customer_id.to_string(),
        order_serno: child_text(node, "orderSerno"),
        product_id: child_text(node, "productId"),
        product_name: child_text(node, "productName"),
        product_type: child_text(node, "productType"),
        order_date: child_text(node, "orderDate"),
        order_status: child_text(node, "orderStatus"),
        quantity: child_text(node, "quantity"),
        unit_cost: child_text(node, "defaultUnitCost"),
        invoice_balance: child_text(node, "invoiceBalance"),
    }
}

fn parse_event(node: roxmltree::Node<'_, '_>, customer_id: &str) -> EventRecord {
    EventRecord {
        customer_id: customer_id.to_string(),
        event_id: child_text(node, "id"),
        program_name: child_text(node, "program-name"),
        name: child_text(node, "name"),
        event_type: child_text(node, "type"),
        status: child_text(node, "status"),
        start_date: child_text(node, "start-dt"),
        end_date: child_text(node, "end-dt"),
        location_name: child_text(node, "location-nm"),
        location_city: child_text(node, "location-city"),
        location_state: child_text(node, "location-state"),
        register_url: child_text(node, "register-url"),
        registration_status: child_text(node, "registration-status"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use koppel_core::TestClock;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::ClientConfig;

    fn test_source(base_url: String) -> SourceClient {
        let config = SourceConfig {
            base_url,
            environment: Environment::Test,
            username: "vendor".to_string(),
            password: "secret".to_string(),
        };
        let http =
            ResilientClient::new(ClientConfig::default(), Arc::new(TestClock::new())).unwrap();
        SourceClient::new(config, http)
    }

    #[test]
    fn environment_selects_path_segment() {
        assert_eq!(Environment::Test.path_segment(), "cetdigitdev");
        assert_eq!(Environment::Production.path_segment(), "cetdigit");

        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Test".parse::<Environment>().unwrap(), Environment::Test);
        assert!("moon".parse::<Environment>().is_err());
    }

    #[test]
    fn xml_escaping_covers_metacharacters() {
        assert_eq!(xml_escape("a&b<c>\"d'"), "a&amp;b&lt;c&gt;&quot;d&apos;");
        assert_eq!(xml_escape("12345"), "12345");
    }

    #[test]
    fn customer_xml_parses_contact_points() {
        let body = r#"<?xml version="1.0"?>
<custInfoResponse>
    <custId>12345</custId>
    <name>
        <firstName>Ada</firstName>
        <lastName>Lovelace</lastName>
        <displayName>Ada Lovelace</displayName>
    </name>
    <emails>
        <email>
            <address>old@example.org</address>
            <emailType>HOME</emailType>
            <preferred>false</preferred>
            <badAddress>true</badAddress>
        </email>
        <email>
            <address>ada@example.org</address>
            <emailType>WORK</emailType>
            <preferred>true</preferred>
            <badAddress>false</badAddress>
        </email>
    </emails>
    <phones>
        <phone>
            <number>555-0100</number>
            <ext>42</ext>
            <phoneType>WORK</phoneType>
            <preferred>true</preferred>
        </phone>
    </phones>
    <addresses>
        <address>
            <street1>1 Analytical Way</street1>
            <city>London</city>
            <state>LN</state>
            <postalCode>12345</postalCode>
            <preferred>true</preferred>
            <badAddress>false</badAddress>
        </address>
    </addresses>
    <jobs>
        <job>
            <employerName>Analytical Engines Ltd</employerName>
            <titleName>Programmer</titleName>
            <preferred>true</preferred>
        </job>
    </jobs>
</custInfoResponse>"#;

        let doc = parse_xml(body).unwrap();
        let customer = parse_customer(doc.root(), "12345");

        assert_eq!(customer.customer_id, "12345");
        assert_eq!(customer.first_name.as_deref(), Some("Ada"));
        assert_eq!(customer.last_name.as_deref(), Some("Lovelace"));

        assert_eq!(customer.emails.len(), 2);
        assert!(customer.emails[0].bad);
        assert!(customer.emails[1].preferred);
        assert_eq!(customer.emails[1].address, "ada@example.org");

        assert_eq!(customer.phones.len(), 1);
        assert_eq!(customer.phones[0].extension.as_deref(), Some("42"));

        assert_eq!(customer.addresses.len(), 1);
        assert_eq!(customer.addresses[0].city.as_deref(), Some("London"));

        assert_eq!(customer.jobs.len(), 1);
        assert_eq!(customer.jobs[0].title.as_deref(), Some("Programmer"));
    }

    #[test]
    fn membership_xml_uses_hyphenated_tags() {
        let body = r#"<?xml version="1.0"?>
<member-response>
    <membership>
        <customer-id>12345</customer-id>
        <subgroup-id>SG-1</subgroup-id>
        <subgroup-name>Gold Tier</subgroup-name>
        <class-cd>IND</class-cd>
        <status>ACTIVE</status>
        <join-date>01/15/2020</join-date>
        <expire-date>2026-12-31</expire-date>
    </membership>
    <membership>
        <customer-id>12345</customer-id>
        <status>TERMINATED</status>
        <terminate-date>02/01/2023</terminate-date>
    </membership>
</member-response>"#;

        let doc = parse_xml(body).unwrap();
        let memberships: Vec<_> = doc
            .root()
            .descendants()
            .filter(|n| n.has_tag_name("membership"))
            .map(|n| parse_membership(n, "12345"))
            .collect();

        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].subgroup_name.as_deref(), Some("Gold Tier"));
        assert_eq!(memberships[0].status.as_deref(), Some("ACTIVE"));
        assert_eq!(memberships[0].join_date.as_deref(), Some("01/15/2020"));
        assert_eq!(memberships[1].terminate_date.as_deref(), Some("02/01/2023"));
    }

    #[test]
    fn order_and_event_xml_parse() {
        let orders = r#"<ecord-response>
    <order>
        <orderSerno>900</orderSerno>
        <productId>BOOK-1</productId>
        <productName>Proceedings</productName>
        <orderDate>03/10/2024</orderDate>
        <orderStatus>SHIPPED</orderStatus>
        <quantity>2</quantity>
        <defaultUnitCost>49.50</defaultUnitCost>
        <invoiceBalance>0</invoiceBalance>
    </order>
</ecord-response>"#;

        let doc = parse_xml(orders).unwrap();
        let order = doc
            .root()
            .descendants()
            .find(|n| n.has_tag_name("order"))
            .map(|n| parse_order(n, "12345"))
            .unwrap();
        assert_eq!(order.product_name.as_deref(), Some("Proceedings"));
        assert_eq!(order.unit_cost.as_deref(), Some("49.50"));
        assert_eq!(order.customer_id, "12345");

        let events = r#"<event-response>
    <event>
        <id>EV-7</id>
        <name>Annual Summit</name>
        <start-dt>2025-06-01</start-dt>
        <location-nm>Main Hall</location-nm>
        <registration-status>REGISTERED</registration-status>
    </event>
</event-response>"#;

        let doc = parse_xml(events).unwrap();
        let event = doc
            .root()
            .descendants()
            .find(|n| n.has_tag_name("event"))
            .map(|n| parse_event(n, "12345"))
            .unwrap();
        assert_eq!(event.event_id.as_deref(), Some("EV-7"));
        assert_eq!(event.start_date.as_deref(), Some("2025-06-01"));
        assert_eq!(event.registration_status.as_deref(), Some("REGISTERED"));
    }

    #[test]
    fn queue_entries_without_ids_are_skipped() {
        let body = r#"<custResponse>
    <customers>
        <customer><custId>111</custId><action>UPDATE</action><reason>ADDR</reason></customer>
        <customer><action>UPDATE</action></customer>
        <customer><custId>222</custId></customer>
    </customers>
</custResponse>"#;

        let doc = parse_xml(body).unwrap();
        let entries = parse_queue_entries(doc.root());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].customer_id, "111");
        assert_eq!(entries[0].action.as_deref(), Some("UPDATE"));
        assert_eq!(entries[1].customer_id, "222");
    }

    #[test]
    fn purge_request_lists_every_customer() {
        let client = test_source("http://localhost".to_string());
        let xml =
            client.purge_request_xml(&["111".to_string(), "222".to_string(), "3&3".to_string()]);

        assert!(xml.contains("<customer>111</customer>"));
        assert!(xml.contains("<customer>222</customer>"));
        assert!(xml.contains("<customer>3&amp;3</customer>"));
        assert!(xml.contains("<vendorId>vendor</vendorId>"));
    }

    #[tokio::test]
    async fn fetch_customer_posts_to_environment_path() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/cetdigitdev/CENSSAWEBSVCLIB.GET_CUST_INFO_XML"))
            .and(matchers::body_string_contains("custInfoRequest"))
            .and(matchers::body_string_contains("12345"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<custInfoResponse><custId>12345</custId><name><firstName>Ada</firstName></name></custInfoResponse>"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_source(mock_server.uri());
        let customer = client.fetch_customer("12345").await.unwrap();

        assert_eq!(customer.first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn non_success_becomes_source_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&mock_server)
            .await;

        let client = test_source(mock_server.uri());
        let err = client.fetch_memberships("12345").await.unwrap_err();

        assert!(matches!(err, SyncError::SourceRejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn garbage_xml_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<unclosed"))
            .mount(&mock_server)
            .await;

        let client = test_source(mock_server.uri());
        let err = client.fetch_events("12345").await.unwrap_err();

        assert!(matches!(err, SyncError::InvalidResponse { .. }));
    }
}
