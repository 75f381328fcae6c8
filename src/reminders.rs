use chrono::NaiveDate;
use url::Url;
use uuid::Uuid;

use crate::models::{AlertChannel, ContractStatus, MaintenanceContract};
use crate::schedule;

/// Channels whose flag is on and whose offset list contains exactly `days_until`.
pub fn eligible_channels(contract: &MaintenanceContract, days_until: i64) -> Vec<AlertChannel> {
    let on_offset = contract
        .alert_days_before
        .iter()
        .any(|offset| i64::from(*offset) == days_until);
    if !on_offset {
        return Vec::new();
    }

    let mut channels = Vec::new();
    if contract.send_email_alert {
        channels.push(AlertChannel::Email);
    }
    if contract.send_whatsapp_alert {
        channels.push(AlertChannel::Whatsapp);
    }
    channels
}

#[derive(Debug, Clone)]
pub struct DueReminder {
    pub contract_id: Uuid,
    pub channel: AlertChannel,
    pub days_until: i64,
    pub link: Option<String>,
}

pub fn due_reminders(contracts: &[MaintenanceContract], today: NaiveDate) -> Vec<DueReminder> {
    let mut reminders = Vec::new();

    for contract in contracts
        .iter()
        .filter(|contract| contract.status == ContractStatus::Active)
    {
        let days = schedule::days_until(contract.next_maintenance_date, today);
        for channel in eligible_channels(contract, days) {
            let message = reminder_message(contract, days);
            let link = match channel {
                AlertChannel::Email => email_link(contract, &message),
                AlertChannel::Whatsapp => whatsapp_link(contract, &message),
            };
            reminders.push(DueReminder {
                contract_id: contract.id,
                channel,
                days_until: days,
                link,
            });
        }
    }

    reminders
}

pub fn reminder_message(contract: &MaintenanceContract, days_until: i64) -> String {
    format!(
        "Hello {}, your scheduled maintenance \"{}\" is due on {} ({} days from today).",
        contract.client_name, contract.title, contract.next_maintenance_date, days_until
    )
}

pub fn email_link(contract: &MaintenanceContract, body: &str) -> Option<String> {
    let address = contract.client_email.as_deref()?.trim();
    if address.is_empty() {
        return None;
    }
    let mut link = Url::parse(&format!("mailto:{address}")).ok()?;
    link.query_pairs_mut()
        .append_pair("subject", &format!("Maintenance reminder: {}", contract.title))
        .append_pair("body", body);
    Some(link.into())
}

pub fn whatsapp_link(contract: &MaintenanceContract, body: &str) -> Option<String> {
    let digits: String = contract
        .client_phone
        .as_deref()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let mut link = Url::parse("https://wa.me/").ok()?;
    link.set_path(&digits);
    link.query_pairs_mut().append_pair("text", body);
    Some(link.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::{Duration, Utc};

    fn contract(email: bool, whatsapp: bool) -> MaintenanceContract {
        MaintenanceContract {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Northwind Bakery".to_string(),
            client_email: Some("owner@northwind.test".to_string()),
            client_phone: Some("+1 (555) 010-2030".to_string()),
            title: "Oven service".to_string(),
            description: String::new(),
            frequency: Frequency::Quarterly,
            last_maintenance_date: None,
            next_maintenance_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            planned_next_date: None,
            status: ContractStatus::Active,
            alert_days_before: vec![30, 15, 7],
            send_email_alert: email,
            send_whatsapp_alert: whatsapp,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn email_only_on_exact_offset() {
        let c = contract(true, false);
        assert_eq!(eligible_channels(&c, 15), vec![AlertChannel::Email]);
        assert!(eligible_channels(&c, 16).is_empty());
        assert!(!eligible_channels(&c, 15).contains(&AlertChannel::Whatsapp));
    }

    #[test]
    fn both_channels_when_both_flags_set() {
        let c = contract(true, true);
        assert_eq!(
            eligible_channels(&c, 7),
            vec![AlertChannel::Email, AlertChannel::Whatsapp]
        );
        assert!(eligible_channels(&c, 0).is_empty());
    }

    #[test]
    fn due_reminders_skip_inactive_contracts() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let mut active = contract(true, true);
        active.next_maintenance_date = today + Duration::days(30);
        let mut inactive = active.clone();
        inactive.id = Uuid::new_v4();
        inactive.status = ContractStatus::Inactive;

        let due = due_reminders(&[active.clone(), inactive], today);
        assert_eq!(due.len(), 2);
        assert!(due.iter().all(|r| r.contract_id == active.id && r.days_until == 30));
    }

    #[test]
    fn links_are_encoded() {
        let c = contract(true, true);
        let email = email_link(&c, "due soon").unwrap();
        assert_eq!(
            email,
            "mailto:owner@northwind.test?subject=Maintenance+reminder%3A+Oven+service&body=due+soon"
        );
        let whatsapp = whatsapp_link(&c, "due soon").unwrap();
        assert_eq!(whatsapp, "https://wa.me/15550102030?text=due+soon");

        let message = whatsapp_link(&c, "Oil & filter, 100% done?").unwrap();
        assert_eq!(
            message,
            "https://wa.me/15550102030?text=Oil+%26+filter%2C+100%25+done%3F"
        );
    }

    #[test]
    fn missing_contact_details_yield_no_link() {
        let mut c = contract(true, true);
        c.client_email = Some("  ".to_string());
        c.client_phone = None;
        assert!(email_link(&c, "x").is_none());
        assert!(whatsapp_link(&c, "x").is_none());
    }
}
