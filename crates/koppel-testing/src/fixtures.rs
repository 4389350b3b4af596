//! Response bodies in the shapes the two upstreams produce.
//!
//! XML fixtures mirror the membership platform's tag vocabulary (camelCase
//! for customer detail and orders, hyphenated for memberships and events);
//! JSON fixtures mirror the CRM's object envelopes.

use serde_json::{json, Value};

fn esc(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Queue response with one `(customer_id, action)` entry per customer.
pub fn queue_response(entries: &[(&str, &str)]) -> String {
    let customers = entries
        .iter()
        .map(|(customer_id, action)| {
            format!(
                "    <customer>\n        <custId>{}</custId>\n        <action>{}</action>\n    </customer>",
                esc(customer_id),
                esc(action)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<?xml version=\"1.0\"?>\n<custResponse>\n{customers}\n</custResponse>"
    )
}

/// Acknowledgment body for a purge request.
pub fn purge_response() -> String {
    "<?xml version=\"1.0\"?>\n<purgeResponse>\n    <status>success</status>\n</purgeResponse>"
        .to_string()
}

/// Builder for a customer detail response document.
#[derive(Debug, Default)]
pub struct CustomerXml {
    customer_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    emails: Vec<String>,
    phones: Vec<String>,
    addresses: Vec<String>,
    jobs: Vec<String>,
}

impl CustomerXml {
    /// Starts a document for one customer ID.
    pub fn new(customer_id: &str) -> Self {
        Self { customer_id: customer_id.to_string(), ..Default::default() }
    }

    /// Sets first and last name.
    #[must_use]
    pub fn name(mut self, first: &str, last: &str) -> Self {
        self.first_name = Some(first.to_string());
        self.last_name = Some(last.to_string());
        self
    }

    /// Adds one email entry.
    #[must_use]
    pub fn email(mut self, address: &str, preferred: bool, bad: bool) -> Self {
        self.emails.push(format!(
            "        <email>\n            <address>{}</address>\n            <preferred>{preferred}</preferred>\n            <badAddress>{bad}</badAddress>\n        </email>",
            esc(address)
        ));
        self
    }

    /// Adds one phone entry.
    #[must_use]
    pub fn phone(mut self, number: &str, ext: Option<&str>) -> Self {
        let ext_line = ext
            .map(|ext| format!("\n            <ext>{}</ext>", esc(ext)))
            .unwrap_or_default();
        self.phones.push(format!(
            "        <phone>\n            <number>{}</number>{ext_line}\n            <preferred>true</preferred>\n        </phone>",
            esc(number)
        ));
        self
    }

    /// Adds one postal address entry.
    #[must_use]
    pub fn address(mut self, street1: &str, city: &str, state: &str, zip: &str) -> Self {
        self.addresses.push(format!(
            "        <address>\n            <street1>{}</street1>\n            <city>{}</city>\n            <state>{}</state>\n            <postalCode>{}</postalCode>\n            <preferred>false</preferred>\n            <badAddress>false</badAddress>\n        </address>",
            esc(street1),
            esc(city),
            esc(state),
            esc(zip)
        ));
        self
    }

    /// Adds one employment entry.
    #[must_use]
    pub fn job(mut self, employer: &str, title: &str) -> Self {
        self.jobs.push(format!(
            "        <job>\n            <employerName>{}</employerName>\n            <titleName>{}</titleName>\n        </job>",
            esc(employer),
            esc(title)
        ));
        self
    }

    /// Renders the full response document.
    pub fn build(self) -> String {
        let mut body = String::new();
        body.push_str("<?xml version=\"1.0\"?>\n<custInfoResponse>\n");
        body.push_str(&format!("    <custId>{}</custId>\n", esc(&self.customer_id)));

        if self.first_name.is_some() || self.last_name.is_some() {
            body.push_str("    <name>\n");
            if let Some(first) = &self.first_name {
                body.push_str(&format!("        <firstName>{}</firstName>\n", esc(first)));
            }
            if let Some(last) = &self.last_name {
                body.push_str(&format!("        <lastName>{}</lastName>\n", esc(last)));
            }
            body.push_str("    </name>\n");
        }

        for (container, entries) in [
            ("emails", &self.emails),
            ("phones", &self.phones),
            ("addresses", &self.addresses),
            ("jobs", &self.jobs),
        ] {
            if !entries.is_empty() {
                body.push_str(&format!("    <{container}>\n"));
                body.push_str(&entries.join("\n"));
                body.push_str(&format!("\n    </{container}>\n"));
            }
        }

        body.push_str("</custInfoResponse>");
        body
    }
}

/// One membership element for [`memberships_response`].
pub fn membership_xml(
    customer_id: &str,
    subgroup_name: &str,
    status: &str,
    join_date: Option<&str>,
    expire_date: Option<&str>,
) -> String {
    let mut fields = vec![
        format!("        <customer-id>{}</customer-id>", esc(customer_id)),
        format!("        <subgroup-name>{}</subgroup-name>", esc(subgroup_name)),
        format!("        <status>{}</status>", esc(status)),
    ];
    if let Some(join_date) = join_date {
        fields.push(format!("        <join-date>{}</join-date>", esc(join_date)));
    }
    if let Some(expire_date) = expire_date {
        fields.push(format!("        <expire-date>{}</expire-date>", esc(expire_date)));
    }
    format!("    <membership>\n{}\n    </membership>", fields.join("\n"))
}

/// Membership list response wrapping pre-built membership elements.
pub fn memberships_response(memberships: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<member-response>\n{}\n</member-response>",
        memberships.join("\n")
    )
}

/// One order element for [`orders_response`].
pub fn order_xml(
    serno: &str,
    product_name: &str,
    status: &str,
    order_date: &str,
    invoice_balance: &str,
) -> String {
    format!(
        "    <order>\n        <orderSerno>{}</orderSerno>\n        <productName>{}</productName>\n        <orderStatus>{}</orderStatus>\n        <orderDate>{}</orderDate>\n        <invoiceBalance>{}</invoiceBalance>\n    </order>",
        esc(serno),
        esc(product_name),
        esc(status),
        esc(order_date),
        esc(invoice_balance)
    )
}

/// Purchased products response wrapping pre-built order elements.
pub fn orders_response(orders: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<ecord-response>\n{}\n</ecord-response>",
        orders.join("\n")
    )
}

/// One event element for [`events_response`].
pub fn event_xml(id: &str, name: &str, start_date: &str, registration_status: &str) -> String {
    format!(
        "    <event>\n        <id>{}</id>\n        <name>{}</name>\n        <start-dt>{}</start-dt>\n        <registration-status>{}</registration-status>\n    </event>",
        esc(id),
        esc(name),
        esc(start_date),
        esc(registration_status)
    )
}

/// Event registration response wrapping pre-built event elements.
pub fn events_response(events: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<event-response>\n{}\n</event-response>",
        events.join("\n")
    )
}

/// CRM contact search response carrying the given object IDs.
pub fn search_results(ids: &[&str]) -> Value {
    json!({
        "results": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
        "total": ids.len(),
    })
}

/// CRM create/update response for one object ID.
pub fn created_object(id: &str) -> Value {
    json!({"id": id, "properties": {}})
}
