use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeskError, Result};

pub const DEFAULT_ALERT_DAYS: [i32; 3] = [30, 15, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl Frequency {
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Bimonthly => 2,
            Self::Quarterly => 3,
            Self::Semiannual => 6,
            Self::Annual => 12,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Bimonthly => "bimonthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Annual => "annual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(Self::Monthly),
            "bimonthly" => Some(Self::Bimonthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannual" => Some(Self::Semiannual),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Inactive,
}

impl ContractStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceContract {
    pub id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub title: String,
    pub description: String,
    pub frequency: Frequency,
    pub last_maintenance_date: Option<NaiveDate>,
    pub next_maintenance_date: NaiveDate,
    pub planned_next_date: Option<NaiveDate>,
    pub status: ContractStatus,
    pub alert_days_before: Vec<i32>,
    pub send_email_alert: bool,
    pub send_whatsapp_alert: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub completed_date: NaiveDate,
    pub next_date_assigned: NaiveDate,
    pub note: String,
    pub completed_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyStatus {
    Overdue,
    Urgent,
    Upcoming,
    Future,
}

impl UrgencyStatus {
    pub const ALL: [UrgencyStatus; 4] = [
        Self::Overdue,
        Self::Urgent,
        Self::Upcoming,
        Self::Future,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Urgent => "urgent",
            Self::Upcoming => "upcoming",
            Self::Future => "future",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Urgency {
    pub status: UrgencyStatus,
    /// Negative when overdue.
    pub days_until: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Email,
    Whatsapp,
}

impl AlertChannel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedVisit {
    pub entry: HistoryEntry,
    pub contract_title: String,
    pub client_name: String,
}

#[derive(Debug, Clone)]
pub struct NewContract {
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub frequency: Frequency,
    pub next_maintenance_date: NaiveDate,
    pub planned_next_date: Option<NaiveDate>,
    pub alert_days_before: Vec<i32>,
    pub send_email_alert: bool,
    pub send_whatsapp_alert: bool,
}

impl NewContract {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DeskError::validation("title is required"));
        }
        check_planned(self.next_maintenance_date, self.planned_next_date)?;
        normalize_alert_days(&self.alert_days_before).map(|_| ())
    }
}

/// Field-level edit. `None` leaves a field as it is; `planned_next_date`
/// uses `Some(None)` to clear the override.
#[derive(Debug, Clone, Default)]
pub struct ContractEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<Frequency>,
    pub next_maintenance_date: Option<NaiveDate>,
    pub planned_next_date: Option<Option<NaiveDate>>,
    pub status: Option<ContractStatus>,
    pub alert_days_before: Option<Vec<i32>>,
    pub send_email_alert: Option<bool>,
    pub send_whatsapp_alert: Option<bool>,
}

impl ContractEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.frequency.is_none()
            && self.next_maintenance_date.is_none()
            && self.planned_next_date.is_none()
            && self.status.is_none()
            && self.alert_days_before.is_none()
            && self.send_email_alert.is_none()
            && self.send_whatsapp_alert.is_none()
    }

    /// Applies the edit to a copy, validating the result as a whole.
    pub fn apply(&self, contract: &MaintenanceContract) -> Result<MaintenanceContract> {
        let mut updated = contract.clone();

        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(DeskError::validation("title is required"));
            }
            updated.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(frequency) = self.frequency {
            updated.frequency = frequency;
        }
        if let Some(next) = self.next_maintenance_date {
            updated.next_maintenance_date = next;
        }
        if let Some(planned) = self.planned_next_date {
            updated.planned_next_date = planned;
        }
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(days) = &self.alert_days_before {
            updated.alert_days_before = normalize_alert_days(days)?;
        }
        if let Some(flag) = self.send_email_alert {
            updated.send_email_alert = flag;
        }
        if let Some(flag) = self.send_whatsapp_alert {
            updated.send_whatsapp_alert = flag;
        }

        check_planned(updated.next_maintenance_date, updated.planned_next_date)?;
        Ok(updated)
    }
}

fn check_planned(next: NaiveDate, planned: Option<NaiveDate>) -> Result<()> {
    match planned {
        Some(planned) if planned <= next => Err(DeskError::validation(format!(
            "planned next date {planned} must fall after the due date {next}"
        ))),
        _ => Ok(()),
    }
}

/// Rejects negative offsets, drops duplicates and sorts for display
/// (furthest reminder first). An empty input falls back to the defaults.
pub fn normalize_alert_days(days: &[i32]) -> Result<Vec<i32>> {
    if days.is_empty() {
        return Ok(DEFAULT_ALERT_DAYS.to_vec());
    }
    if let Some(bad) = days.iter().find(|day| **day < 0) {
        return Err(DeskError::validation(format!(
            "alert offsets must be non-negative, got {bad}"
        )));
    }

    let mut values = days.to_vec();
    values.sort_unstable_by(|a, b| b.cmp(a));
    values.dedup();
    Ok(values)
}

/// Parses a comma separated offset list such as `30,15,7`.
pub fn parse_alert_days(raw: &str) -> Result<Vec<i32>> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let day = part
            .parse::<i32>()
            .map_err(|_| DeskError::validation(format!("invalid alert offset `{part}`")))?;
        days.push(day);
    }
    normalize_alert_days(&days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_contract() -> MaintenanceContract {
        MaintenanceContract {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Lakeside Hotel".to_string(),
            client_email: None,
            client_phone: None,
            title: "Boiler check".to_string(),
            description: String::new(),
            frequency: Frequency::Annual,
            last_maintenance_date: None,
            next_maintenance_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            planned_next_date: None,
            status: ContractStatus::Active,
            alert_days_before: DEFAULT_ALERT_DAYS.to_vec(),
            send_email_alert: true,
            send_whatsapp_alert: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn edit_applies_only_given_fields() {
        let original = sample_contract();
        let edit = ContractEdit {
            next_maintenance_date: NaiveDate::from_ymd_opt(2025, 5, 20),
            alert_days_before: Some(vec![3, 10, 3]),
            ..ContractEdit::default()
        };
        let updated = edit.apply(&original).unwrap();
        assert_eq!(updated.title, original.title);
        assert_eq!(updated.next_maintenance_date, NaiveDate::from_ymd_opt(2025, 5, 20).unwrap());
        assert_eq!(updated.alert_days_before, vec![10, 3]);
        assert!(ContractEdit::default().is_empty());
        assert!(!edit.is_empty());
    }

    #[test]
    fn edit_rejects_planned_date_before_due_date() {
        let original = sample_contract();
        let edit = ContractEdit {
            planned_next_date: Some(NaiveDate::from_ymd_opt(2025, 4, 1)),
            ..ContractEdit::default()
        };
        assert!(matches!(edit.apply(&original), Err(DeskError::Validation(_))));

        let clear = ContractEdit {
            planned_next_date: Some(None),
            title: Some("  ".to_string()),
            ..ContractEdit::default()
        };
        assert!(clear.apply(&original).is_err());
    }

    #[test]
    fn new_contract_requires_title() {
        let contract = NewContract {
            client_id: Uuid::new_v4(),
            title: " ".to_string(),
            description: String::new(),
            frequency: Frequency::Monthly,
            next_maintenance_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            planned_next_date: None,
            alert_days_before: vec![],
            send_email_alert: true,
            send_whatsapp_alert: false,
        };
        assert!(matches!(contract.validate(), Err(DeskError::Validation(_))));
    }

    #[test]
    fn frequencies_map_to_month_counts() {
        let months: Vec<u32> = [
            Frequency::Monthly,
            Frequency::Bimonthly,
            Frequency::Quarterly,
            Frequency::Semiannual,
            Frequency::Annual,
        ]
        .into_iter()
        .map(Frequency::months)
        .collect();
        assert_eq!(months, vec![1, 2, 3, 6, 12]);
    }

    #[test]
    fn frequency_parse_matches_storage_names() {
        assert_eq!(Frequency::parse("semiannual"), Some(Frequency::Semiannual));
        assert_eq!(Frequency::parse(Frequency::Annual.as_str()), Some(Frequency::Annual));
        assert_eq!(Frequency::parse("weekly"), None);
    }

    #[test]
    fn alert_days_are_deduplicated_and_sorted() {
        assert_eq!(normalize_alert_days(&[7, 30, 15, 7]).unwrap(), vec![30, 15, 7]);
        assert_eq!(normalize_alert_days(&[]).unwrap(), DEFAULT_ALERT_DAYS.to_vec());
        assert_eq!(normalize_alert_days(&[0]).unwrap(), vec![0]);
    }

    #[test]
    fn negative_alert_days_are_rejected() {
        assert!(matches!(
            normalize_alert_days(&[15, -1]),
            Err(DeskError::Validation(_))
        ));
    }

    #[test]
    fn alert_day_lists_parse_from_text() {
        assert_eq!(parse_alert_days(" 7, 15 ,30").unwrap(), vec![30, 15, 7]);
        assert!(parse_alert_days("7,soon").is_err());
    }
}
