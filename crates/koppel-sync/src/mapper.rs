//! Maps source platform records into CRM property shapes.
//!
//! Customers carry lists of emails, phones, and addresses; the CRM wants
//! one of each. Selection prefers the `preferred`-flagged entry, then the
//! first entry not flagged bad, then the first entry. Source dates arrive
//! as `mm/dd/yyyy` or `yyyy-mm-dd` strings and leave as epoch milliseconds
//! at UTC midnight.

use chrono::NaiveDate;

use crate::{
    destination::{ContactProperties, DealProperties, MembershipProperties},
    source::{AddressRecord, CustomerRecord, EventRecord, MembershipRecord, OrderRecord, PhoneRecord},
};

/// Builds the contact payload for one customer.
pub fn contact_properties(customer: &CustomerRecord) -> ContactProperties {
    let email = select_best(&customer.emails, |e| e.preferred, |e| e.bad);
    let phone = select_best(&customer.phones, |p| p.preferred, |_| false);
    let address = select_best(&customer.addresses, |a| a.preferred, |a| a.bad);
    let job = select_best(&customer.jobs, |j| j.preferred, |_| false);

    ContactProperties {
        email: email.map(|e| e.address.clone()),
        firstname: customer.first_name.clone(),
        lastname: customer.last_name.clone(),
        phone: phone.map(format_phone),
        address: address.map(format_address).filter(|formatted| !formatted.is_empty()),
        city: address.and_then(|a| a.city.clone()),
        state: address.and_then(|a| a.state.clone()),
        zip: address.and_then(|a| a.postal_code.clone()),
        company: job.and_then(|j| j.employer.clone()),
        jobtitle: job.and_then(|j| j.title.clone()),
        customer_id: customer.customer_id.clone(),
    }
}

/// Builds the membership property payload for one membership.
pub fn membership_properties(membership: &MembershipRecord) -> MembershipProperties {
    MembershipProperties {
        membership_status: membership.status.clone(),
        membership_type: membership.subgroup_name.clone(),
        membership_class: membership.class_code.clone(),
        membership_join_date: membership.join_date.as_deref().and_then(parse_source_date),
        membership_expire_date: membership.expire_date.as_deref().and_then(parse_source_date),
    }
}

/// Builds the deal payload for one purchased product.
pub fn order_deal(order: &OrderRecord) -> DealProperties {
    // Invoice balance reflects what is actually owed; unit cost is the
    // fallback when the platform omits it.
    let amount =
        order.invoice_balance.clone().filter(|v| !v.is_empty()).or_else(|| order.unit_cost.clone());

    DealProperties {
        dealname: order.product_name.clone(),
        amount,
        dealstage: order.order_status.as_deref().and_then(order_deal_stage),
        closedate: order.order_date.as_deref().and_then(parse_source_date),
        order_id: order.order_serno.clone(),
        customer_id: Some(order.customer_id.clone()),
        ..Default::default()
    }
}

/// Builds the deal payload for one event registration.
pub fn event_deal(event: &EventRecord) -> DealProperties {
    DealProperties {
        dealname: event.name.clone(),
        dealstage: event.registration_status.as_deref().and_then(registration_deal_stage),
        closedate: event.start_date.as_deref().and_then(parse_source_date),
        event_id: event.event_id.clone(),
        customer_id: Some(event.customer_id.clone()),
        ..Default::default()
    }
}

/// Picks one entry out of a list: preferred flag, then not bad, then first.
fn select_best<T>(
    items: &[T],
    preferred: impl Fn(&T) -> bool,
    bad: impl Fn(&T) -> bool,
) -> Option<&T> {
    items
        .iter()
        .find(|item| preferred(item))
        .or_else(|| items.iter().find(|item| !bad(item)))
        .or_else(|| items.first())
}

/// Formats a phone number, appending the extension when present.
fn format_phone(phone: &PhoneRecord) -> String {
    match phone.extension.as_deref().filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{} ext {ext}", phone.number),
        None => phone.number.clone(),
    }
}

/// Formats an address into one comma-separated line.
fn format_address(address: &AddressRecord) -> String {
    let parts = [
        address.street1.as_deref(),
        address.street2.as_deref(),
        address.city.as_deref(),
        address.state.as_deref(),
        address.postal_code.as_deref(),
        address.country.as_deref(),
    ];
    parts.into_iter().flatten().filter(|part| !part.is_empty()).collect::<Vec<_>>().join(", ")
}

/// Parses a source date string into epoch milliseconds at UTC midnight.
///
/// Returns `None` with a warning for anything unparseable; a bad date on
/// one record never fails the record.
pub fn parse_source_date(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"));

    match parsed {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis()),
        Err(_) => {
            tracing::warn!(value = trimmed, "could not parse source date, skipping field");
            None
        },
    }
}

fn order_deal_stage(status: &str) -> Option<String> {
    match status.trim().to_ascii_uppercase().as_str() {
        "SHIPPED" | "COMPLETED" | "PAID" | "CLOSED" => Some("closedwon".to_string()),
        "CANCELLED" | "CANCELED" | "RETURNED" => Some("closedlost".to_string()),
        _ => None,
    }
}

fn registration_deal_stage(status: &str) -> Option<String> {
    match status.trim().to_ascii_uppercase().as_str() {
        "REGISTERED" | "ATTENDED" | "CONFIRMED" => Some("closedwon".to_string()),
        "CANCELLED" | "CANCELED" | "NO-SHOW" => Some("closedlost".to_string()),
        _ => None,
    }
}
